//! Per-page download strategy and batch sequencing
//!
//! Each page goes through one of two routes. Known hosts (or a forced run)
//! go straight to direct extraction. Everything else gets two browser
//! attempts that harvest media responses from the network log, then a final
//! direct extraction. Pages run strictly one after another; cancellation is
//! observed between pages and between entries, never inside a transfer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Settings, SortBy};
use crate::core::dedupe::{dedupe_entries, dedupe_urls};
use crate::core::entry::{ExtractedInfo, QualityPreference, RawEntry};
use crate::core::resolver::SessionRegistry;
use crate::core::selector::select_candidate;
use crate::core::sorter::sort_downloaded;
use crate::download::fetcher::{Fetcher, MediaHeaders};
use crate::error::CerberusError;
use crate::platform::browser::{BrowserCookie, BrowserDriver, BrowserOptions};
use crate::platform::extractor::MetadataExtractor;
use crate::platform::login::{cookie_header, newgrounds_login, NEWGROUNDS_LOGIN_URL};
use crate::utils::filename::{clean_page_title, strip_mp4_suffix, PLACEHOLDER_NAME};
use crate::utils::mime::{is_media_response, is_playable_src};
use crate::utils::url::{is_newgrounds_view, matches_known_host};
use crate::Result;

/// Browser attempts before the direct-extraction fallback
pub const BROWSER_ATTEMPTS: u32 = 2;

const DEFAULT_EXTENSION: &str = "mp4";

/// Receives user-facing status lines
pub trait StatusReporter: Send + Sync {
    /// Progress of the strategy itself
    fn status(&self, message: &str);
    /// Expected skips and recoverable failures
    fn notice(&self, message: &str);
}

/// Reporter that only logs
#[derive(Debug, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn status(&self, message: &str) {
        info!("{}", message);
    }

    fn notice(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Orchestration options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub save_folder: PathBuf,
    pub quality: QualityPreference,
    pub overwrite: bool,
    /// Skip browser discovery for every page
    pub force_direct: bool,
    pub known_hosts: Vec<String>,
    pub sort_by: SortBy,
    pub browser: BrowserOptions,
    pub user_agent: String,
    pub newgrounds_credentials: Option<(String, String)>,
}

impl OrchestratorOptions {
    /// Options for `save_folder` with everything else taken from settings
    pub fn from_settings(settings: &Settings, save_folder: PathBuf) -> Self {
        Self {
            save_folder,
            quality: QualityPreference::parse(settings.default_quality()),
            overwrite: settings.overwrite_existing(),
            force_direct: false,
            known_hosts: settings.known_hosts(),
            sort_by: settings.sort_by(),
            browser: BrowserOptions {
                browser_path: settings.browser_path(),
                headless: settings.minimized(),
                ..BrowserOptions::default()
            },
            user_agent: settings.user_agent().to_string(),
            newgrounds_credentials: settings.newgrounds_credentials(),
        }
    }
}

/// Outcome for one page of a batch
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: String,
    /// Last file produced for the page
    pub saved: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub pages: Vec<PageResult>,
    /// Set when the batch stopped early on cancellation
    pub cancelled: bool,
}

/// Per-page context shared by every step
struct PageContext<'a> {
    /// Filename numbering scope
    session: &'a str,
    cookie: Option<String>,
}

/// Runs pages through discovery, selection, naming and transfer
pub struct Orchestrator {
    options: OrchestratorOptions,
    fetcher: Fetcher,
    extractor: Arc<dyn MetadataExtractor>,
    browser: Arc<dyn BrowserDriver>,
    client: Client,
    sessions: SessionRegistry,
    reporter: Arc<dyn StatusReporter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        options: OrchestratorOptions,
        fetcher: Fetcher,
        extractor: Arc<dyn MetadataExtractor>,
        browser: Arc<dyn BrowserDriver>,
        client: Client,
    ) -> Self {
        Self {
            options,
            fetcher,
            extractor,
            browser,
            client,
            sessions: SessionRegistry::new(),
            reporter: Arc::new(LogReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Route status lines to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Observe `token` between pages and entries
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process `urls` in order, calling `on_page` as each one finishes.
    ///
    /// `custom_name` only applies when the batch holds a single URL.
    pub async fn run_batch<F>(&self, urls: &[String], custom_name: Option<&str>, mut on_page: F) -> BatchReport
    where
        F: FnMut(&PageResult),
    {
        let mut report = BatchReport::default();
        let name = if urls.len() == 1 { custom_name } else { None };

        for (index, url) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Cancelled before {}", url);
                report.cancelled = true;
                break;
            }
            if urls.len() > 1 {
                self.reporter
                    .status(&format!("[{}/{}] Starting download for: {}", index + 1, urls.len(), url));
            }

            let started = Instant::now();
            let saved = self.run_page(url, name).await;
            let result = PageResult {
                url: url.clone(),
                saved,
                elapsed: started.elapsed(),
            };
            on_page(&result);
            report.pages.push(result);
        }

        report.cancelled |= self.cancel.is_cancelled();
        report
    }

    /// Download everything one page refers to; the last saved path wins
    pub async fn run_page(&self, url: &str, custom_name: Option<&str>) -> Option<PathBuf> {
        let cookies = self.site_cookies(url).await;
        let page = PageContext {
            session: url,
            cookie: cookie_header(&cookies),
        };

        if self.options.force_direct || matches_known_host(url, &self.options.known_hosts) {
            return self.direct_extraction(url, custom_name, &page, None).await;
        }

        for attempt in 1..=BROWSER_ATTEMPTS {
            self.reporter
                .status(&format!("Browser attempt {} of {}...", attempt, BROWSER_ATTEMPTS));
            match self.browser_attempt(url, custom_name, &cookies, &page).await {
                Ok(Some(path)) => return Some(path),
                Ok(None) => self.reporter.notice("No downloadable video links found. Retrying..."),
                Err(CerberusError::Cancelled) => {
                    info!("Cancelled before browsing {}", url);
                    return None;
                }
                Err(e) => {
                    error!("Browser error on {}: {}", url, e);
                    self.reporter.notice(&format!("Browser error: {}. Retrying...", e));
                }
            }
            if self.cancel.is_cancelled() {
                return None;
            }
        }

        self.reporter
            .status("Browser attempts failed - falling back to direct extraction...");
        self.direct_extraction(url, custom_name, &page, None).await
    }

    async fn site_cookies(&self, url: &str) -> Vec<BrowserCookie> {
        if !is_newgrounds_view(url) {
            return Vec::new();
        }
        let Some((user, pass)) = &self.options.newgrounds_credentials else {
            return Vec::new();
        };
        match newgrounds_login(NEWGROUNDS_LOGIN_URL, user, pass, &self.options.user_agent).await {
            Ok(cookies) => cookies,
            Err(e) => {
                error!("Error performing Newgrounds login: {}", e);
                Vec::new()
            }
        }
    }

    async fn browser_attempt(
        &self,
        url: &str,
        custom_name: Option<&str>,
        cookies: &[BrowserCookie],
        page: &PageContext<'_>,
    ) -> Result<Option<PathBuf>> {
        if self.cancel.is_cancelled() {
            return Err(CerberusError::Cancelled);
        }
        let options = BrowserOptions {
            cookies: cookies.to_vec(),
            ..self.options.browser.clone()
        };
        let capture = self.browser.capture(url, &options).await?;

        let mut links = dedupe_urls(
            capture
                .responses
                .into_iter()
                .filter(|r| is_media_response(&r.mime_type, &r.url))
                .map(|r| r.url),
        );
        if links.is_empty() {
            if let Some(src) = capture.video_src.filter(|s| is_playable_src(s)) {
                links.push(src);
            }
        }
        if links.is_empty() {
            return Ok(None);
        }

        let base = match custom_name {
            Some(name) => strip_mp4_suffix(name).to_string(),
            None => capture
                .title
                .as_deref()
                .map(clean_page_title)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_NAME.to_string()),
        };

        let mut last = None;
        for link in links {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(target) = self.reserve(&base, DEFAULT_EXTENSION, page) else {
                continue;
            };
            match self.fetcher.fetch(&link, &target, &self.headers(url, page)).await {
                Ok(path) => last = Some(self.finish(path, url).await),
                Err(e) => {
                    warn!("Direct fetch of {} failed: {}", link, e);
                    if let Some(path) = self.direct_extraction(&link, Some(&base), page, Some(target)).await {
                        last = Some(path);
                    }
                }
            }
        }
        Ok(last)
    }

    /// Query the extractor for `url` and download whatever it describes.
    ///
    /// `reserved` is a target already resolved for this resource; the first
    /// file written uses it instead of resolving a new name.
    async fn direct_extraction(
        &self,
        url: &str,
        custom_name: Option<&str>,
        page: &PageContext<'_>,
        reserved: Option<PathBuf>,
    ) -> Option<PathBuf> {
        let info = match self.extractor.extract(url, &self.options.quality).await {
            Ok(info) => Some(info),
            Err(e) => {
                error!("Metadata extraction failed for {}: {}", url, e);
                None
            }
        };

        let base = custom_name
            .map(|n| strip_mp4_suffix(n).to_string())
            .or_else(|| info.as_ref().and_then(|i| i.base_title()).map(str::to_string))
            .unwrap_or_else(|| PLACEHOLDER_NAME.to_string());

        match info {
            Some(ExtractedInfo::Playlist { entries, .. }) if !entries.is_empty() => {
                self.download_entries(url, entries, &base, page, reserved).await
            }
            Some(ExtractedInfo::Single(entry)) => {
                self.download_single(url, &entry, &base, page, reserved).await
            }
            _ => {
                let target = self.claim(reserved, &base, DEFAULT_EXTENSION, page)?;
                self.delegate(url, target).await
            }
        }
    }

    async fn download_single(
        &self,
        url: &str,
        entry: &RawEntry,
        base: &str,
        page: &PageContext<'_>,
        reserved: Option<PathBuf>,
    ) -> Option<PathBuf> {
        let fallback = entry.page_url_or(url).to_string();
        let candidate = select_candidate(entry, &fallback, &self.options.quality, self.extractor.as_ref()).await;

        let ext = candidate
            .as_ref()
            .and_then(|c| c.ext.as_deref())
            .unwrap_or(DEFAULT_EXTENSION);
        let target = self.claim(reserved, base, ext, page)?;

        let Some(candidate) = candidate else {
            return self.delegate(url, target).await;
        };
        match self.fetcher.fetch(&candidate.url, &target, &self.headers(url, page)).await {
            Ok(path) => Some(self.finish(path, url).await),
            Err(e) => {
                warn!("Direct fetch of {} failed: {}", candidate.url, e);
                self.delegate(url, target).await
            }
        }
    }

    async fn download_entries(
        &self,
        url: &str,
        entries: Vec<RawEntry>,
        base: &str,
        page: &PageContext<'_>,
        mut reserved: Option<PathBuf>,
    ) -> Option<PathBuf> {
        let entries = dedupe_entries(entries);
        let mut media_seen = HashSet::new();
        let mut last = None;

        for entry in entries {
            if self.cancel.is_cancelled() {
                info!("Cancelled during {}", url);
                break;
            }

            let entry_url = entry.page_url_or(url).to_string();
            let candidate =
                select_candidate(&entry, &entry_url, &self.options.quality, self.extractor.as_ref()).await;

            let media_key = candidate
                .as_ref()
                .map(|c| c.url.clone())
                .unwrap_or_else(|| entry.identity_key());
            if !media_seen.insert(media_key) {
                continue;
            }

            let title = entry
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(base)
                .to_string();
            let ext = candidate
                .as_ref()
                .and_then(|c| c.ext.as_deref())
                .unwrap_or(DEFAULT_EXTENSION);
            let Some(target) = self.claim(reserved.take(), &title, ext, page) else {
                continue;
            };

            let saved = match candidate {
                Some(candidate) => {
                    match self
                        .fetcher
                        .fetch(&candidate.url, &target, &self.headers(&entry_url, page))
                        .await
                    {
                        Ok(path) => Some(self.finish(path, &entry_url).await),
                        Err(e) => {
                            self.reporter
                                .notice(&format!("Failed to download media URL for entry: {} ({})", candidate.url, e));
                            self.delegate(&entry_url, target).await
                        }
                    }
                }
                None => self.delegate(&entry_url, target).await,
            };

            if saved.is_some() {
                last = saved;
            }
        }
        last
    }

    /// Hand `url` to the extractor's own download routine, writing `target`
    async fn delegate(&self, url: &str, target: PathBuf) -> Option<PathBuf> {
        let outcome = match self.extractor.download(url, &target, &self.options.quality).await {
            Ok(()) => locate_output(&target).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(saved) => Some(self.finish(saved, url).await),
            Err(e) => {
                error!("Extractor download failed for {}: {}", url, e);
                self.reporter
                    .notice(&format!("Error downloading video with the extractor: {}", e));
                None
            }
        }
    }

    /// Use the reserved target if there is one, otherwise resolve a new name
    fn claim(&self, reserved: Option<PathBuf>, base: &str, ext: &str, page: &PageContext<'_>) -> Option<PathBuf> {
        match reserved {
            Some(target) => Some(target),
            None => self.reserve(base, ext, page),
        }
    }

    fn reserve(&self, base: &str, ext: &str, page: &PageContext<'_>) -> Option<PathBuf> {
        let target = self.sessions.resolve(
            &self.options.save_folder,
            base,
            ext,
            self.options.overwrite,
            Some(page.session),
        );
        if target.is_none() {
            self.reporter.notice(&format!(
                "Skipping existing file: {}",
                self.options.save_folder.join(base).display()
            ));
        }
        target
    }

    fn headers(&self, referer: &str, page: &PageContext<'_>) -> MediaHeaders {
        MediaHeaders::new(self.options.user_agent.clone())
            .with_referer(referer)
            .with_cookie(page.cookie.clone())
    }

    async fn finish(&self, path: PathBuf, page_url: &str) -> PathBuf {
        sort_downloaded(
            &self.client,
            &path,
            page_url,
            self.options.sort_by,
            &self.options.save_folder,
        )
        .await
    }
}

/// File the extractor actually produced for `target`.
///
/// Recoding to mp4 renames a non-mp4 target, so the `.mp4` sibling counts too.
async fn locate_output(target: &Path) -> Result<PathBuf> {
    let recoded = target.with_extension(DEFAULT_EXTENSION);
    for candidate in [target, recoded.as_path()] {
        if let Ok(meta) = tokio::fs::metadata(candidate).await {
            if meta.is_file() && meta.len() > 0 {
                return Ok(candidate.to_path_buf());
            }
        }
    }
    Err(CerberusError::Io(std::io::Error::other(format!(
        "{} was not produced",
        target.display()
    ))))
}
