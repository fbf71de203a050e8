//! # Synchronization Engine
//!
//! Keeps a remote curated list mirrored onto local storage.
//!
//! ## Overview
//!
//! The engine polls the list, downloads media for every entry it has not seen
//! before, tags the file, records the attempt and retires the entry from the
//! list. Handled entries are remembered in a crash-safe ledger so nothing is
//! processed twice, even across restarts.
//!
//! ## Components
//!
//! - **Dedup Ledger** (`ledger`): Persisted set of handled entry ids with atomic snapshots
//! - **Poll Scheduler** (`scheduler`): Activity-adaptive interval with backoff and reset
//! - **Track Processor** (`processor`): Per-entry state machine from record to commit
//! - **Result Store** (`repository`, `db`): SQLite record of every attempt
//! - **Sync Engine** (`engine`): Lifecycle, passes, status, preview and ledger reset

pub mod attempt;
pub mod db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod processor;
pub mod repository;
pub mod scheduler;

pub use attempt::{
    AttemptId, AttemptQuery, AttemptRecord, AttemptStats, AttemptStatus, NewAttempt, PassId,
    SourceType,
};
pub use db::{create_pool, DatabaseConfig};
pub use engine::{
    EngineConfig, EngineState, EngineStatus, PassReport, PassTrigger, PreviewEntry,
    PreviewReport, SyncEngine,
};
pub use error::{Result, SyncError};
pub use ledger::{DedupLedger, LedgerCounters, LedgerState};
pub use processor::{
    EntryOutcome, ProcessingState, ProcessorConfig, RemovalLog, TrackProcessor,
};
pub use repository::{ResultStore, SqliteResultStore};
pub use scheduler::{PollScheduler, SchedulerSnapshot};
