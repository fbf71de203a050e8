//! # Result Store
//!
//! Durable record of every processing attempt.
//!
//! ## Overview
//!
//! The store is the sole writer of attempt records. Each record is created in
//! `processing` and receives exactly one terminal update; the update statements
//! are conditional on the current status so a second terminal write is rejected
//! by the database rather than silently overwriting the first.

use crate::attempt::{
    AttemptId, AttemptQuery, AttemptRecord, AttemptStats, AttemptStatus, NewAttempt, SourceType,
};
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::path::{Path, PathBuf};

// ============================================================================
// Repository Trait
// ============================================================================

/// Persistence seam for attempt records
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create a record in `processing` and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn create_attempt(&self, attempt: &NewAttempt) -> Result<AttemptId>;

    /// Move a record to `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AttemptNotFound`] for an unknown id and
    /// [`SyncError::InvalidStateTransition`] if the record is already terminal.
    async fn mark_completed(&self, id: AttemptId, file_path: &Path, file_size: u64) -> Result<()>;

    /// Move a record to `failed`.
    ///
    /// # Errors
    ///
    /// Same as [`ResultStore::mark_completed`].
    async fn mark_failed(&self, id: AttemptId, error: &str) -> Result<()>;

    /// Find a record by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_id(&self, id: AttemptId) -> Result<Option<AttemptRecord>>;

    /// Records matching the query, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn list(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>>;

    /// Number of records, optionally filtered
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn count(&self, status: Option<AttemptStatus>, source: Option<SourceType>)
        -> Result<u64>;

    /// Aggregate figures over all records
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn stats(&self) -> Result<AttemptStats>;

    /// Substring search over filename, artist, track name and search query
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn search(&self, term: &str, limit: u32) -> Result<Vec<AttemptRecord>>;

    /// Overwrite the descriptive fields of a record
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AttemptNotFound`] for an unknown id
    async fn update_descriptive(
        &self,
        id: AttemptId,
        artist: Option<&str>,
        track_name: Option<&str>,
    ) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`ResultStore`] over the `downloads` table
#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Create a new SQLite result store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Explain why a conditional terminal update touched no row.
    async fn transition_error(&self, id: AttemptId, to: AttemptStatus) -> SyncError {
        match self.find_by_id(id).await {
            Ok(Some(record)) => match record.status.validate_transition(to) {
                Err(e) => e,
                Ok(()) => SyncError::Database(format!(
                    "attempt {} changed concurrently while moving to {}",
                    id, to
                )),
            },
            Ok(None) => SyncError::AttemptNotFound { id: id.value() },
            Err(e) => e,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, filename, original_url, source_type, file_size, file_path,
           artist, track_name, search_query, source_entry_id,
           download_status, error_message, created_at, completed_at
    FROM downloads
"#;

/// Database row representation of an attempt
#[derive(Debug, FromRow)]
struct AttemptRow {
    id: i64,
    filename: String,
    original_url: Option<String>,
    source_type: String,
    file_size: Option<i64>,
    file_path: Option<String>,
    artist: Option<String>,
    track_name: Option<String>,
    search_query: Option<String>,
    source_entry_id: Option<String>,
    download_status: String,
    error_message: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<AttemptRow> for AttemptRecord {
    type Error = SyncError;

    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(AttemptRecord {
            id: AttemptId::new(row.id),
            filename: row.filename,
            original_url: row.original_url,
            source_type: row.source_type.parse()?,
            file_size: row.file_size.map(|size| size.max(0) as u64),
            file_path: row.file_path.map(PathBuf::from),
            artist: row.artist,
            track_name: row.track_name,
            search_query: row.search_query,
            source_entry_id: row.source_entry_id,
            status: row.download_status.parse()?,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    status: Option<AttemptStatus>,
    source: Option<SourceType>,
) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND download_status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(source) = source {
        builder.push(" AND source_type = ");
        builder.push_bind(source.as_str());
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn create_attempt(&self, attempt: &NewAttempt) -> Result<AttemptId> {
        let result = sqlx::query(
            r#"
            INSERT INTO downloads (
                filename, original_url, source_type, artist, track_name,
                search_query, source_entry_id, download_status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'processing', ?)
            "#,
        )
        .bind(&attempt.filename)
        .bind(&attempt.original_url)
        .bind(attempt.source_type.as_str())
        .bind(&attempt.artist)
        .bind(&attempt.track_name)
        .bind(&attempt.search_query)
        .bind(&attempt.source_entry_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(AttemptId::new(result.last_insert_rowid()))
    }

    async fn mark_completed(&self, id: AttemptId, file_path: &Path, file_size: u64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET download_status = 'completed',
                file_path = ?,
                file_size = ?,
                error_message = NULL,
                completed_at = ?
            WHERE id = ? AND download_status = 'processing'
            "#,
        )
        .bind(file_path.to_string_lossy().into_owned())
        .bind(file_size as i64)
        .bind(Utc::now().timestamp())
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, AttemptStatus::Completed).await);
        }

        Ok(())
    }

    async fn mark_failed(&self, id: AttemptId, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET download_status = 'failed',
                error_message = ?,
                completed_at = ?
            WHERE id = ? AND download_status = 'processing'
            "#,
        )
        .bind(error)
        .bind(Utc::now().timestamp())
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, AttemptStatus::Failed).await);
        }

        Ok(())
    }

    async fn find_by_id(&self, id: AttemptId) -> Result<Option<AttemptRecord>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(AttemptRecord::try_from).transpose()
    }

    async fn list(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_filters(&mut builder, query.status, query.source);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(i64::from(query.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset));

        let rows = builder
            .build_query_as::<AttemptRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(AttemptRecord::try_from).collect()
    }

    async fn count(
        &self,
        status: Option<AttemptStatus>,
        source: Option<SourceType>,
    ) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM downloads");
        push_filters(&mut builder, status, source);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }

    async fn stats(&self) -> Result<AttemptStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN download_status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN download_status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN download_status = 'processing' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN source_type = 'playlist' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN source_type = 'manual' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN download_status = 'completed' THEN file_size ELSE 0 END), 0)
            FROM downloads
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        let (total, completed, failed, processing, playlist, manual, total_file_size) = row;
        let total = total.max(0) as u64;
        let completed = completed.max(0) as u64;

        Ok(AttemptStats {
            total,
            completed,
            failed: failed.max(0) as u64,
            processing: processing.max(0) as u64,
            playlist: playlist.max(0) as u64,
            manual: manual.max(0) as u64,
            total_file_size: total_file_size.max(0) as u64,
            success_rate: AttemptStats::compute_success_rate(completed, total),
        })
    }

    async fn search(&self, term: &str, limit: u32) -> Result<Vec<AttemptRecord>> {
        let pattern = format!("%{}%", term.trim());
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"{}
            WHERE filename LIKE ?
               OR artist LIKE ?
               OR track_name LIKE ?
               OR search_query LIKE ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
            SELECT_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(AttemptRecord::try_from).collect()
    }

    async fn update_descriptive(
        &self,
        id: AttemptId,
        artist: Option<&str>,
        track_name: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET artist = COALESCE(?, artist),
                track_name = COALESCE(?, track_name)
            WHERE id = ?
            "#,
        )
        .bind(artist)
        .bind(track_name)
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AttemptNotFound { id: id.value() });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn create_store() -> SqliteResultStore {
        SqliteResultStore::new(create_test_pool().await.unwrap())
    }

    fn playlist_attempt(name: &str) -> NewAttempt {
        NewAttempt {
            filename: name.to_string(),
            original_url: Some(format!("spotify:track:{}", name)),
            source_type: SourceType::Playlist,
            artist: Some("Artist".to_string()),
            track_name: Some(name.to_string()),
            search_query: format!("Artist - {}", name),
            source_entry_id: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_by_id() {
        let store = create_store().await;
        let id = store.create_attempt(&playlist_attempt("Song")).await.unwrap();

        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.status, AttemptStatus::Processing);
        assert_eq!(record.source_type, SourceType::Playlist);
        assert_eq!(record.search_query.as_deref(), Some("Artist - Song"));
        assert!(record.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = create_store().await;
        assert!(store.find_by_id(AttemptId::new(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_completed() {
        let store = create_store().await;
        let id = store.create_attempt(&playlist_attempt("Song")).await.unwrap();

        store
            .mark_completed(id, Path::new("/music/Artist - Song.mp3"), 4_096)
            .await
            .unwrap();

        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, AttemptStatus::Completed);
        assert_eq!(record.file_size, Some(4_096));
        assert_eq!(
            record.file_path,
            Some(PathBuf::from("/music/Artist - Song.mp3"))
        );
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_record_is_immutable() {
        let store = create_store().await;
        let id = store.create_attempt(&playlist_attempt("Song")).await.unwrap();
        store.mark_failed(id, "no results").await.unwrap();

        let err = store
            .mark_completed(id, Path::new("/music/x.mp3"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));

        let err = store.mark_failed(id, "again").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));

        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, AttemptStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("no results"));
    }

    #[tokio::test]
    async fn test_mark_unknown_attempt() {
        let store = create_store().await;
        let err = store.mark_failed(AttemptId::new(7), "x").await.unwrap_err();
        assert!(matches!(err, SyncError::AttemptNotFound { id: 7 }));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = create_store().await;
        let first = store.create_attempt(&playlist_attempt("One")).await.unwrap();
        let second = store.create_attempt(&playlist_attempt("Two")).await.unwrap();
        let manual = store
            .create_attempt(&NewAttempt::manual("Someone - Thing", "Someone - Thing"))
            .await
            .unwrap();
        store.mark_failed(first, "boom").await.unwrap();

        let all = store.list(&AttemptQuery::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![manual, second, first]);

        let failed = store
            .list(&AttemptQuery::default().with_status(AttemptStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, first);

        let manual_only = store
            .list(&AttemptQuery::default().with_source(SourceType::Manual))
            .await
            .unwrap();
        assert_eq!(manual_only.len(), 1);
        assert_eq!(manual_only[0].source_type, SourceType::Manual);

        let paged = store
            .list(&AttemptQuery::default().page(1, 1))
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, second);
    }

    #[tokio::test]
    async fn test_count_and_stats() {
        let store = create_store().await;
        let a = store.create_attempt(&playlist_attempt("A")).await.unwrap();
        let b = store.create_attempt(&playlist_attempt("B")).await.unwrap();
        store
            .create_attempt(&NewAttempt::manual("C", "C"))
            .await
            .unwrap();
        store.mark_completed(a, Path::new("/m/A.mp3"), 1_000).await.unwrap();
        store.mark_failed(b, "no match").await.unwrap();

        assert_eq!(store.count(None, None).await.unwrap(), 3);
        assert_eq!(
            store
                .count(Some(AttemptStatus::Completed), None)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .count(Some(AttemptStatus::Processing), Some(SourceType::Manual))
                .await
                .unwrap(),
            1
        );

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.playlist, 2);
        assert_eq!(stats.manual, 1);
        assert_eq!(stats.total_file_size, 1_000);
        assert_eq!(stats.success_rate, 33.3);
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let store = create_store().await;
        assert_eq!(store.stats().await.unwrap(), AttemptStats::default());
    }

    #[tokio::test]
    async fn test_search() {
        let store = create_store().await;
        store.create_attempt(&playlist_attempt("Sunrise")).await.unwrap();
        store.create_attempt(&playlist_attempt("Midnight")).await.unwrap();

        let hits = store.search("sunr", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "Sunrise");

        assert_eq!(store.search("Artist", 10).await.unwrap().len(), 2);
        assert_eq!(store.search("Artist", 1).await.unwrap().len(), 1);
        assert!(store.search("nothing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_descriptive() {
        let store = create_store().await;
        let id = store
            .create_attempt(&NewAttempt::manual("raw query", "raw query"))
            .await
            .unwrap();

        store
            .update_descriptive(id, Some("Fixed Artist"), None)
            .await
            .unwrap();
        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.artist.as_deref(), Some("Fixed Artist"));
        assert!(record.track_name.is_none());

        let err = store
            .update_descriptive(AttemptId::new(999), None, Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AttemptNotFound { id: 999 }));
    }
}
