//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retry and exponential backoff
//! - `AcquisitionProvider` running the `yt-dlp` executable as a child process
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, YtDlpAcquisitionProvider, YtDlpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let downloader = YtDlpAcquisitionProvider::new(YtDlpConfig::default());
//!
//!     // Hand both to the engine via core-service
//!     Ok(())
//! }
//! ```

mod http;
mod ytdlp;

pub use http::ReqwestHttpClient;
pub use ytdlp::{parse_progress_line, YtDlpAcquisitionProvider, YtDlpConfig};
