//! Media transfer: streaming fetcher, retry policy and transcoder fallback

pub mod fetcher;
pub mod retry;
pub mod transcode;

pub use fetcher::{Fetcher, FetcherConfig, MediaHeaders};
pub use retry::{RetryConfig, RetryExecutor};
pub use transcode::{FfmpegTranscoder, Transcoder};
