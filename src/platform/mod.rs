//! External collaborators: HTTP client, subprocesses, yt-dlp, WebDriver and site logins

pub mod browser;
pub mod client;
pub mod extractor;
pub mod login;
pub mod process;

pub use browser::{BrowserDriver, BrowserOptions, PageCapture, WebDriverBrowser};
pub use client::HttpClientConfig;
pub use extractor::{ExtractorOptions, MetadataExtractor, YtDlpExtractor};
