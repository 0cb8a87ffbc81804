//! Streaming media fetcher with transcoder fallback

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_USER_AGENT;
use crate::core::progress::{Progress, ProgressSink};
use crate::download::retry::{RetryConfig, RetryExecutor};
use crate::download::transcode::Transcoder;
use crate::error::{CerberusError, FailureKind};
use crate::Result;

/// Headers replayed on every media request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeaders {
    pub user_agent: String,
    /// Page the media was found on; many hosts reject hotlinks without it
    pub referer: Option<String>,
    /// Pre-obtained session cookies
    pub cookie: Option<String>,
}

impl MediaHeaders {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            referer: None,
            cookie: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        let referer = referer.into();
        self.referer = Some(referer).filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.trim().is_empty());
        self
    }
}

impl Default for MediaHeaders {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Fetcher configuration
#[derive(Clone)]
pub struct FetcherConfig {
    /// Streaming attempts and their linear backoff
    pub retry: RetryConfig,
    /// Longest wait for the response head or a single body chunk
    pub read_timeout: Duration,
    /// Pause before the second and last rename attempt
    pub rename_retry_delay: Duration,
    /// Receives transfer progress
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            read_timeout: Duration::from_secs(60),
            rename_retry_delay: Duration::from_secs(2),
            progress: None,
        }
    }
}

enum FetchState {
    Streaming,
    ExternalTool,
    Done(Result<()>),
}

/// Downloads one resource to one target path
pub struct Fetcher {
    client: Client,
    transcoder: Arc<dyn Transcoder>,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(client: Client, transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_config(client, transcoder, FetcherConfig::default())
    }

    pub fn with_config(client: Client, transcoder: Arc<dyn Transcoder>, config: FetcherConfig) -> Self {
        Self {
            client,
            transcoder,
            config,
        }
    }

    /// Download `url` to `target`.
    ///
    /// Streams to a `.part` sibling and renames it into place. Server errors
    /// and network failures are retried; 401/403 and exhausted retries hand
    /// the URL to the transcoder once. Success always means `target` exists
    /// and is non-empty.
    pub async fn fetch(&self, url: &str, target: &Path, headers: &MediaHeaders) -> Result<PathBuf> {
        if url.trim().is_empty() {
            return Err(CerberusError::Extraction("Empty media URL".to_string()));
        }

        let mut state = FetchState::Streaming;
        loop {
            state = match state {
                FetchState::Streaming => {
                    let executor = RetryExecutor::with_config(self.config.retry.clone());
                    match executor
                        .execute(|attempt| self.stream_once(url, target, headers, attempt))
                        .await
                    {
                        Ok(()) => FetchState::Done(Ok(())),
                        Err(e) if e.kind() == FailureKind::Io => FetchState::Done(Err(e)),
                        Err(e) if e.kind() == FailureKind::Auth => {
                            info!("{} for {}, trying the transcoder", e, url);
                            FetchState::ExternalTool
                        }
                        Err(e) => {
                            warn!("Streaming failed for {}: {}", url, e);
                            FetchState::ExternalTool
                        }
                    }
                }
                FetchState::ExternalTool => {
                    FetchState::Done(self.transcoder.stream_copy(url, headers, target).await)
                }
                FetchState::Done(result) => {
                    return match result.and(verify_target(target).await) {
                        Ok(()) => Ok(target.to_path_buf()),
                        Err(e) => {
                            remove_if_empty(target).await;
                            Err(e)
                        }
                    };
                }
            };
        }
    }

    async fn stream_once(&self, url: &str, target: &Path, headers: &MediaHeaders, attempt: u32) -> Result<()> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, &headers.user_agent);
        if let Some(referer) = &headers.referer {
            request = request.header(REFERER, referer);
        }
        if let Some(cookie) = &headers.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = timeout(self.config.read_timeout, request.send())
            .await
            .map_err(|_| CerberusError::Network(format!("No response from {}", url)))??;

        match response.status() {
            StatusCode::OK => {}
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(CerberusError::Auth {
                    status: status.as_u16(),
                })
            }
            status => {
                info!("HTTP {} for {} (attempt {})", status.as_u16(), url, attempt);
                return Err(CerberusError::Network(format!("HTTP {}", status.as_u16())));
            }
        }

        let part = part_path(target);
        let total = response.content_length();
        if let Err(e) = self.write_body(response, &part, target, total).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        self.commit(&part, target).await?;

        let size = tokio::fs::metadata(target).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            error!("Downloaded file zero-sized or missing: {}", target.display());
            let _ = tokio::fs::remove_file(target).await;
            return Err(CerberusError::Network("Empty response body".to_string()));
        }
        Ok(())
    }

    async fn write_body(
        &self,
        response: reqwest::Response,
        part: &Path,
        target: &Path,
        total: Option<u64>,
    ) -> Result<()> {
        let mut file = File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut progress = Progress::new(total);
        let sink = self.config.progress.as_deref();

        if let Some(sink) = sink {
            sink.started(target, progress.total);
        }

        loop {
            let chunk = match timeout(self.config.read_timeout, stream.next()).await {
                Err(_) => {
                    return Err(CerberusError::Network(format!(
                        "Read timed out after {}s",
                        self.config.read_timeout.as_secs()
                    )))
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk?,
            };
            file.write_all(&chunk).await?;
            progress.advance(chunk.len() as u64);
            if let Some(sink) = sink {
                sink.advanced(&progress);
            }
        }

        file.flush().await?;
        if let Some(sink) = sink {
            sink.finished(&progress);
        }
        debug!("Streamed {} to {}", progress.summary(), part.display());
        Ok(())
    }

    /// Rename the temporary file into place, once more after a pause
    async fn commit(&self, part: &Path, target: &Path) -> Result<()> {
        if let Err(first) = tokio::fs::rename(part, target).await {
            warn!(
                "Atomic replace failed: {}. Retrying in {:?}",
                first, self.config.rename_retry_delay
            );
            tokio::time::sleep(self.config.rename_retry_delay).await;
            if let Err(second) = tokio::fs::rename(part, target).await {
                error!("Second attempt to replace temp file failed: {}", second);
                let _ = tokio::fs::remove_file(part).await;
                return Err(CerberusError::Io(second));
            }
        }
        Ok(())
    }
}

/// `<target>.part`
pub fn part_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

async fn verify_target(target: &Path) -> Result<()> {
    match tokio::fs::metadata(target).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(CerberusError::Io(std::io::Error::other(format!(
            "{} is missing or empty",
            target.display()
        )))),
    }
}

async fn remove_if_empty(target: &Path) {
    if let Ok(meta) = tokio::fs::metadata(target).await {
        if meta.is_file() && meta.len() == 0 {
            let _ = tokio::fs::remove_file(target).await;
        }
    }
}
