//! Acquisition Provider backed by the `yt-dlp` executable
//!
//! Each fetch runs one `yt-dlp` child process that searches for the entry's
//! search key, downloads the best audio stream and converts it with ffmpeg.
//! `--newline` progress lines are turned into [`AcquisitionProgress`]
//! updates and `--print after_move:filepath` reports the final file.
//!
//! The child is spawned with `kill_on_drop`, so dropping the fetch future
//! (for example when the caller's timeout fires) terminates the download.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use bridge_traits::{
    acquisition::{
        AcquisitionOutcome, AcquisitionPhase, AcquisitionProgress, AcquisitionProvider,
        AcquisitionRequest, ProgressReporter,
    },
    error::{BridgeError, Result},
};
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, trace, warn};

/// `[download]  42.0% of ~  3.45MiB at  1.23MiB/s ETA 00:13`
static DOWNLOAD_PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<size>\d+(?:\.\d+)?)(?P<unit>[KMGT]?i?B))?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\d+(?::\d+)*))?",
    )
    .expect("download progress regex should compile")
});

/// Downloader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpConfig {
    pub executable: PathBuf,
    /// Target codec for `--audio-format`, e.g. "mp3"
    pub audio_format: String,
    /// `--audio-quality` value, e.g. "192"
    pub audio_quality: String,
    /// Appended after the built-in arguments
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("yt-dlp"),
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// `yt-dlp` child-process implementation of `AcquisitionProvider`.
///
/// # Example
///
/// ```ignore
/// use bridge_desktop::{YtDlpAcquisitionProvider, YtDlpConfig};
///
/// let provider = YtDlpAcquisitionProvider::new(YtDlpConfig::default());
/// let outcome = provider.fetch(request, ProgressReporter::noop()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct YtDlpAcquisitionProvider {
    config: YtDlpConfig,
}

impl YtDlpAcquisitionProvider {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Command-line arguments for one request.
    pub fn build_args(&self, request: &AcquisitionRequest) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.output_name));

        let target = if request.is_direct_url() {
            request.search_key.trim().to_string()
        } else {
            format!("ytsearch1:{}", request.search_key)
        };

        let mut args = vec![
            target,
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            self.config.audio_format.clone(),
            "--audio-quality".to_string(),
            self.config.audio_quality.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            // --print implies --quiet; keep the progress lines
            "--progress".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Where the file lands when yt-dlp did not print a path.
    fn expected_path(&self, request: &AcquisitionRequest) -> PathBuf {
        request.output_dir.join(format!(
            "{}.{}",
            request.output_name, self.config.audio_format
        ))
    }
}

/// Parse one line of yt-dlp output into a progress update.
pub fn parse_progress_line(line: &str) -> Option<AcquisitionProgress> {
    let line = line.trim();

    if line.starts_with("[ExtractAudio]") {
        return Some(AcquisitionProgress::phase(AcquisitionPhase::Converting));
    }

    let caps = DOWNLOAD_PROGRESS.captures(line)?;
    let percent = caps.name("pct")?.as_str().parse::<f32>().ok()?;

    let total_bytes = match (caps.name("size"), caps.name("unit")) {
        (Some(size), Some(unit)) => parse_size(size.as_str(), unit.as_str()),
        _ => None,
    };

    Some(AcquisitionProgress {
        phase: AcquisitionPhase::Downloading,
        percent: Some(percent.clamp(0.0, 100.0)),
        total_bytes,
        speed: caps.name("speed").map(|s| s.as_str().to_string()),
        eta_secs: caps.name("eta").and_then(|eta| parse_eta(eta.as_str())),
    })
}

/// "13", "00:13" or "1:02:03" to seconds.
fn parse_eta(value: &str) -> Option<u64> {
    value
        .split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|n| acc * 60 + n))
}

fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let number = value.parse::<f64>().ok()?;
    let multiplier = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((number * multiplier).round() as u64)
}

/// A stdout line that is the `after_move:filepath` print rather than progress.
fn printed_path(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('[') {
        return None;
    }
    Some(PathBuf::from(line))
}

/// Next line with invalid UTF-8 replaced, `None` at end of stream.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

/// Drain stderr, forwarding progress lines and keeping the last other line.
async fn drain_stderr<R>(stderr: R, progress: ProgressReporter) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut last_error = None;
    loop {
        match next_lossy_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                if let Some(update) = parse_progress_line(&line) {
                    progress.report(update);
                } else if !line.trim().is_empty() {
                    trace!("yt-dlp stderr: {}", line.trim());
                    last_error = Some(line.trim().to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Stopped reading yt-dlp stderr");
                break;
            }
        }
    }
    last_error
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl AcquisitionProvider for YtDlpAcquisitionProvider {
    #[instrument(skip(self, progress), fields(search_key = %request.search_key))]
    async fn fetch(
        &self,
        request: AcquisitionRequest,
        progress: ProgressReporter,
    ) -> Result<AcquisitionOutcome> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        progress.report(AcquisitionProgress::phase(AcquisitionPhase::Searching));

        let args = self.build_args(&request);
        debug!(executable = %self.config.executable.display(), ?args, "Starting yt-dlp");

        let mut child = Command::new(&self.config.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::NotAvailable(format!(
                    "Failed to start {}: {}",
                    self.config.executable.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("yt-dlp stderr not captured".to_string()))?;

        // stderr carries errors and, in some versions, the progress lines
        let stderr_task = tokio::spawn(drain_stderr(stderr, progress.clone()));

        let mut printed: Option<PathBuf> = None;
        let mut stdout = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut stdout, &mut buf).await? {
            if let Some(update) = parse_progress_line(&line) {
                progress.report(update);
            } else if let Some(path) = printed_path(&line) {
                printed = Some(path);
            }
        }

        let status = child.wait().await?;
        let last_error = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let error = last_error.unwrap_or_else(|| match status.code() {
                Some(code) => format!("yt-dlp exited with status {}", code),
                None => "yt-dlp terminated by signal".to_string(),
            });
            warn!(error = %error, "yt-dlp failed");
            progress.report(AcquisitionProgress::phase(AcquisitionPhase::Finished));
            return Ok(AcquisitionOutcome::Failed { error });
        }

        let candidate = printed.unwrap_or_else(|| self.expected_path(&request));
        progress.report(AcquisitionProgress::phase(AcquisitionPhase::Finished));

        if file_exists(&candidate).await {
            info!(file = %candidate.display(), "yt-dlp download finished");
            Ok(AcquisitionOutcome::Completed {
                file_path: candidate,
            })
        } else {
            warn!(file = %candidate.display(), "yt-dlp reported success but the file is missing");
            Ok(AcquisitionOutcome::Failed {
                error: format!("No file produced at {}", candidate.display()),
            })
        }
    }
}
