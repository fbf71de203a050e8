//! # Core Runtime Module
//!
//! Runtime infrastructure shared by every MixSync crate:
//! - Configuration loading and validation ([`config`])
//! - Logging and tracing setup ([`logging`])
//! - Engine event bus ([`events`])

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::AppConfig;
pub use error::{Error, Result};
