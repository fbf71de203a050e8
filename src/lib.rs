//! MixSync workspace crate.
//!
//! Re-exports the engine and runtime crates so a host binary can depend on
//! `mixsync-workspace` alone. The `desktop-shims` feature (default) also pulls
//! in `core-service`, which wires the Spotify source, the `yt-dlp` acquisition
//! provider and the lofty tagger into a ready-to-run engine.

pub use core_runtime as runtime;
pub use core_sync as sync;

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
