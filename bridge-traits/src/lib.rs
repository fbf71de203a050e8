//! # Bridge Traits
//!
//! Seams between the synchronization engine and the outside world.
//!
//! ## Overview
//!
//! The engine never talks to a remote service, an external tool or the
//! filesystem's tag formats directly. Each of those is a trait here, with
//! desktop implementations in `bridge-desktop`, `provider-spotify` and
//! `core-metadata`, and in-memory doubles in tests.
//!
//! ## Traits
//!
//! - [`EntrySource`](source::EntrySource) - Remote curated list: list and remove entries
//! - [`AcquisitionProvider`](acquisition::AcquisitionProvider) - Search-and-download of media
//! - [`Tagger`](tagging::Tagger) - Best-effort metadata writing
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry, used by remote sources
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All traits return [`BridgeError`](error::BridgeError). Implementations
//! convert their own error types into it and keep the remote's message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; the engine shares implementations
//! across tasks behind `Arc<dyn Trait>`.

pub mod acquisition;
pub mod error;
pub mod http;
pub mod source;
pub mod tagging;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use acquisition::{
    AcquisitionOutcome, AcquisitionPhase, AcquisitionProgress, AcquisitionProvider,
    AcquisitionRequest, ProgressReporter, is_media_url,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use source::{Entry, EntrySource, SourceInfo};
pub use tagging::{TagFields, Tagger};
pub use time::{Clock, ManualClock, SystemClock};
