//! HTTP client construction from settings

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::{debug, warn};

use crate::config::{Settings, DEFAULT_USER_AGENT};
use crate::error::CerberusError;
use crate::Result;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Longest wait for a single body chunk while streaming
    pub read_timeout: Duration,
    /// User agent string, also replayed to external tools
    pub user_agent: String,
    /// Proxy URL
    pub proxy_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_url: None,
        }
    }
}

impl HttpClientConfig {
    /// Derive the client configuration from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            read_timeout: settings.socket_timeout(),
            user_agent: settings.user_agent().to_string(),
            proxy_url: settings.proxy().map(str::to_string),
            ..Self::default()
        }
    }

    /// Build the shared client.
    ///
    /// No total request timeout is set so long media transfers are not cut
    /// off; callers bound individual requests or chunks instead.
    pub fn build(&self) -> Result<Client> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .cookie_store(true)
            .gzip(true);

        if let Some(proxy_url) = &self.proxy_url {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => {
                    debug!("Using proxy {}", proxy_url);
                    builder = builder.proxy(proxy);
                }
                Err(e) => warn!("Ignoring invalid proxy {}: {}", proxy_url, e),
            }
        }

        builder
            .build()
            .map_err(|e| CerberusError::Network(format!("Failed to build HTTP client: {}", e)))
    }
}

/// Fetch a page body as text, bounded by `limit`
pub async fn fetch_text(client: &Client, url: &str, limit: Duration) -> Result<String> {
    let response = client.get(url).timeout(limit).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CerberusError::Network(format!("HTTP {} for {}", status.as_u16(), url)));
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::default()
            .with("user_agent", "TestAgent/1.0")
            .with("proxy", "http://127.0.0.1:8080")
            .with("socket_timeout", "15");
        let config = HttpClientConfig::from_settings(&settings);

        assert_eq!(config.user_agent, "TestAgent/1.0");
        assert_eq!(config.proxy_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.build().is_ok());
    }

    #[test]
    fn test_default_config_builds() {
        let config = HttpClientConfig::default();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.build().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("<html>hi</html>")
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClientConfig::default().build().unwrap();
        let body = fetch_text(&client, &format!("{}/page", server.url()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, "<html>hi</html>");

        let err = fetch_text(&client, &format!("{}/gone", server.url()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        ok.assert_async().await;
        missing.assert_async().await;
    }
}
