//! Metadata extraction through yt-dlp

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::{Settings, DEFAULT_USER_AGENT};
use crate::core::entry::{ExtractedInfo, QualityPreference};
use crate::error::CerberusError;
use crate::platform::process::{run_with_timeout, stderr_excerpt, OutputMode};
use crate::Result;

/// Wall-clock limit for a metadata query
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(180);
/// Wall-clock limit for the tool's own download routine
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(900);

/// Yields entry metadata for a page and can download a single item itself
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Query metadata for `url` without downloading
    async fn extract(&self, url: &str, quality: &QualityPreference) -> Result<ExtractedInfo>;

    /// Download the single item at `url` to exactly `target`
    async fn download(&self, url: &str, target: &Path, quality: &QualityPreference) -> Result<()>;
}

/// Options shared by every yt-dlp invocation
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub program: String,
    pub user_agent: String,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub cookies_file: Option<PathBuf>,
    /// Read cookies from the local Chrome profile
    pub browser_cookies: bool,
    pub proxy: Option<String>,
    pub ignore_errors: bool,
    /// Show the tool's own console output during downloads
    pub verbose: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            socket_timeout: Duration::from_secs(60),
            retries: 10,
            cookies_file: None,
            browser_cookies: false,
            proxy: None,
            ignore_errors: false,
            verbose: false,
        }
    }
}

impl ExtractorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            user_agent: settings.user_agent().to_string(),
            socket_timeout: settings.socket_timeout(),
            retries: settings.retries(),
            cookies_file: settings.cookies_file(),
            browser_cookies: settings.use_browser_cookies(),
            proxy: settings.proxy().map(str::to_string),
            ignore_errors: settings.ignore_errors(),
            verbose: settings.yt_verbose(),
            ..Self::default()
        }
    }
}

/// `yt-dlp` command-line extractor
#[derive(Debug, Clone, Default)]
pub struct YtDlpExtractor {
    options: ExtractorOptions,
}

impl YtDlpExtractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    fn shared_args(&self, args: &mut Vec<String>) {
        if let Some(path) = &self.options.cookies_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        } else if self.options.browser_cookies {
            args.push("--cookies-from-browser".to_string());
            args.push("chrome".to_string());
        }

        if let Some(proxy) = &self.options.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push("--socket-timeout".to_string());
        args.push(self.options.socket_timeout.as_secs().to_string());
    }

    fn extract_args(&self, url: &str, quality: &QualityPreference) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            quality.extractor_selector(),
        ];
        self.shared_args(&mut args);
        args.push(url.to_string());
        args
    }

    fn download_args(&self, url: &str, target: &Path, quality: &QualityPreference) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            target.to_string_lossy().into_owned(),
            "-f".to_string(),
            quality.extractor_selector(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--recode-video".to_string(),
            "mp4".to_string(),
            "--user-agent".to_string(),
            self.options.user_agent.clone(),
            "--retries".to_string(),
            self.options.retries.to_string(),
        ];
        if !self.options.verbose {
            args.push("--quiet".to_string());
        }
        if self.options.ignore_errors {
            args.push("--ignore-errors".to_string());
        }
        self.shared_args(&mut args);
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MetadataExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str, quality: &QualityPreference) -> Result<ExtractedInfo> {
        debug!("Extracting metadata for {}", url);
        let output = run_with_timeout(
            &self.options.program,
            &self.extract_args(url, quality),
            EXTRACT_TIMEOUT,
            OutputMode::Capture,
        )
        .await?;

        if !output.status.success() {
            return Err(CerberusError::Extraction(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr_excerpt(&output, 1000)
            )));
        }

        parse_info(&output.stdout)
    }

    async fn download(&self, url: &str, target: &Path, quality: &QualityPreference) -> Result<()> {
        info!("Downloading {} with yt-dlp to {}", url, target.display());
        let mode = if self.options.verbose {
            OutputMode::Inherit
        } else {
            OutputMode::Capture
        };
        let output = run_with_timeout(
            &self.options.program,
            &self.download_args(url, target, quality),
            DOWNLOAD_TIMEOUT,
            mode,
        )
        .await?;

        if output.status.success() {
            Ok(())
        } else {
            error!(
                "yt-dlp download failed ({}) for {}: {}",
                output.status,
                url,
                stderr_excerpt(&output, 1000)
            );
            Err(CerberusError::ExternalTool(format!(
                "yt-dlp exited with {}",
                output.status
            )))
        }
    }
}

/// Parse a `--dump-single-json` document
pub fn parse_info(stdout: &[u8]) -> Result<ExtractedInfo> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Err(CerberusError::Extraction("Extractor returned no metadata".to_string()));
    }
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CerberusError::Extraction("Unexpected metadata shape".to_string()));
    }
    Ok(ExtractedInfo::from_json(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::MediaSource;

    #[test]
    fn test_parse_single_entry() {
        let info = parse_info(
            br#"{"id":"abc","title":"Clip","formats":[{"url":"https://cdn/1.mp4","height":720,"tbr":900.5,"ext":"mp4"}]}"#,
        )
        .unwrap();

        match info {
            ExtractedInfo::Single(entry) => {
                assert_eq!(entry.id.as_deref(), Some("abc"));
                match entry.source {
                    MediaSource::FormatList(formats) => {
                        assert_eq!(formats[0].height, Some(720));
                        assert_eq!(formats[0].tbr, Some(900.5));
                    }
                    other => panic!("unexpected source {:?}", other),
                }
            }
            other => panic!("expected single entry, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_playlist() {
        let info = parse_info(
            br#"{"_type":"playlist","title":"Set","entries":[{"id":"1","url":"https://cdn/1.mp4"},{"id":"2"}]}"#,
        )
        .unwrap();
        match info {
            ExtractedInfo::Playlist { title, entries, .. } => {
                assert_eq!(title.as_deref(), Some("Set"));
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].source, MediaSource::Opaque);
            }
            other => panic!("expected playlist, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(matches!(parse_info(b""), Err(CerberusError::Extraction(_))));
        assert!(matches!(parse_info(b"null"), Err(CerberusError::Extraction(_))));
        assert!(matches!(parse_info(b"not json"), Err(CerberusError::Json(_))));
        assert!(matches!(parse_info(b"[1,2]"), Err(CerberusError::Extraction(_))));
    }

    #[test]
    fn test_extract_args() {
        let extractor = YtDlpExtractor::new(ExtractorOptions {
            browser_cookies: true,
            proxy: Some("socks5://127.0.0.1:1080".into()),
            socket_timeout: Duration::from_secs(30),
            ..ExtractorOptions::default()
        });
        let args = extractor.extract_args("https://site/v/1", &QualityPreference::MaxHeight(720));
        assert_eq!(
            args,
            vec![
                "--dump-single-json",
                "--skip-download",
                "--no-warnings",
                "-f",
                "best[height<=720]/best",
                "--cookies-from-browser",
                "chrome",
                "--proxy",
                "socks5://127.0.0.1:1080",
                "--socket-timeout",
                "30",
                "https://site/v/1",
            ]
        );
    }

    #[test]
    fn test_download_args_prefer_cookie_file() {
        let extractor = YtDlpExtractor::new(ExtractorOptions {
            cookies_file: Some(PathBuf::from("/tmp/cookies.txt")),
            browser_cookies: true,
            ignore_errors: true,
            ..ExtractorOptions::default()
        });
        let args = extractor.download_args(
            "https://site/v/1",
            Path::new("/out/clip.mp4"),
            &QualityPreference::Best,
        );
        let joined = args.join(" ");
        assert!(joined.starts_with("-o /out/clip.mp4 -f best --no-playlist"));
        assert!(joined.contains("--recode-video mp4"));
        assert!(joined.contains("--quiet"));
        assert!(joined.contains("--ignore-errors"));
        assert!(joined.contains("--cookies /tmp/cookies.txt"));
        assert!(!joined.contains("--cookies-from-browser"));
        assert!(joined.ends_with("https://site/v/1"));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings::default()
            .with("retries", "4")
            .with("yt_verbose", "true")
            .with("use_browser_cookies", "TRUE");
        let options = ExtractorOptions::from_settings(&settings);
        assert_eq!(options.retries, 4);
        assert!(options.verbose);
        assert!(options.browser_cookies);
        assert_eq!(options.program, "yt-dlp");
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let extractor = YtDlpExtractor::new(ExtractorOptions {
            program: "cerberus-no-such-yt-dlp".into(),
            ..ExtractorOptions::default()
        });
        let err = extractor
            .extract("https://site/v/1", &QualityPreference::Best)
            .await
            .unwrap_err();
        assert!(matches!(err, CerberusError::MissingDependency(_)));
    }
}
