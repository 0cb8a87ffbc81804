//! Stream-copy fallback through an external transcoder

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::download::fetcher::MediaHeaders;
use crate::error::CerberusError;
use crate::platform::process::{run_with_timeout, stderr_excerpt, OutputMode};
use crate::Result;

/// Wall-clock limit for one transcoder run
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(900);

/// Copies a remote stream into a local container without re-encoding
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write `source` to `target`, replaying `headers` on the request
    async fn stream_copy(&self, source: &str, headers: &MediaHeaders, target: &Path) -> Result<()>;
}

/// `ffmpeg -c copy` transcoder
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout: TRANSCODE_TIMEOUT,
        }
    }

    /// Use a different executable or time limit
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn args(source: &str, headers: &MediaHeaders, target: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-headers".to_string(),
            header_block(headers),
            "-i".to_string(),
            source.to_string(),
            "-c".to_string(),
            "copy".to_string(),
            target.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn stream_copy(&self, source: &str, headers: &MediaHeaders, target: &Path) -> Result<()> {
        info!("Starting ffmpeg fallback for {}", target.display());
        let output = run_with_timeout(
            &self.program,
            &Self::args(source, headers, target),
            self.timeout,
            OutputMode::Capture,
        )
        .await?;

        if output.status.success() {
            return Ok(());
        }

        error!(
            "ffmpeg failed ({}) for {}. stderr: {}",
            output.status,
            source,
            stderr_excerpt(&output, 1000)
        );
        Err(CerberusError::ExternalTool(format!(
            "ffmpeg exited with {}",
            output.status
        )))
    }
}

/// CRLF-terminated header lines in the form ffmpeg's `-headers` expects
fn header_block(headers: &MediaHeaders) -> String {
    let mut block = format!("User-Agent: {}\r\n", headers.user_agent);
    if let Some(referer) = &headers.referer {
        block.push_str(&format!("Referer: {}\r\n", referer));
    }
    if let Some(cookie) = &headers.cookie {
        block.push_str(&format!("Cookie: {}\r\n", cookie));
    }
    block
}
