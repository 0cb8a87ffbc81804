//! # cerberus - page-to-file video downloader
//!
//! Turns web page URLs into video files on disk. Pages on known hosts go
//! straight to metadata extraction; other pages are rendered in a browser
//! and their network traffic is searched for media responses, with direct
//! extraction as the fallback.
//!
//! ## Features
//!
//! - Browser discovery of media resources with a DOM `<video>` fallback
//! - Playlist-aware extraction with entry and media de-duplication
//! - Collision-safe, per-page numbered filenames
//! - Atomic streaming downloads with retry and an ffmpeg stream-copy fallback
//! - Optional filing into artist, platform or genre subfolders
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cerberus::config::Settings;
//! use cerberus::core::{Orchestrator, OrchestratorOptions};
//! use cerberus::download::{Fetcher, FfmpegTranscoder};
//! use cerberus::platform::{ExtractorOptions, HttpClientConfig, WebDriverBrowser, YtDlpExtractor};
//!
//! #[tokio::main]
//! async fn main() -> cerberus::Result<()> {
//!     let settings = Settings::default();
//!     let client = HttpClientConfig::from_settings(&settings).build()?;
//!     let orchestrator = Orchestrator::new(
//!         OrchestratorOptions::from_settings(&settings, "./downloads".into()),
//!         Fetcher::new(client.clone(), Arc::new(FfmpegTranscoder::new())),
//!         Arc::new(YtDlpExtractor::new(ExtractorOptions::from_settings(&settings))),
//!         Arc::new(WebDriverBrowser::new()),
//!         client,
//!     );
//!
//!     if let Some(path) = orchestrator.run_page("VIDEO_PAGE_URL", None).await {
//!         println!("Saved {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use core::{Orchestrator, OrchestratorOptions, QualityPreference, SessionRegistry};
pub use error::CerberusError;

/// Result type alias for cerberus operations
pub type Result<T> = std::result::Result<T, CerberusError>;
