//! Browser-driven page inspection over the WebDriver protocol
//!
//! A `chromedriver` child is started per capture and spoken to with plain
//! JSON over HTTP. The performance log supplies every network response the
//! page produced; the DOM supplies the title and the first `<video>` source.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::CerberusError;
use crate::Result;

/// W3C key under which element references are returned
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4abf7f3d7e4b";

/// Cookie injected into the browser before the page loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// How the browser is launched
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Browser executable
    pub browser_path: Option<PathBuf>,
    /// Run without a visible window
    pub headless: bool,
    pub cookies: Vec<BrowserCookie>,
    /// Wait after navigation for dynamic content
    pub settle: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            browser_path: None,
            headless: false,
            cookies: Vec::new(),
            settle: Duration::from_secs(5),
        }
    }
}

/// One entry from the browser's network log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub url: String,
    pub mime_type: String,
}

/// What a page load revealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCapture {
    pub title: Option<String>,
    /// `src` of the first `<video>` element
    pub video_src: Option<String>,
    pub responses: Vec<NetworkResponse>,
}

/// Loads a page in a real browser and reports what it saw
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn capture(&self, url: &str, options: &BrowserOptions) -> Result<PageCapture>;
}

/// Chrome controlled through a spawned `chromedriver`
pub struct WebDriverBrowser {
    driver_program: String,
    client: Client,
    startup_timeout: Duration,
}

impl WebDriverBrowser {
    pub fn new() -> Self {
        Self::with_driver("chromedriver")
    }

    pub fn with_driver(program: impl Into<String>) -> Self {
        Self {
            driver_program: program.into(),
            client: Client::new(),
            startup_timeout: Duration::from_secs(15),
        }
    }

    async fn spawn_driver(&self) -> Result<(Child, String)> {
        let port = free_port()?;
        let child = Command::new(&self.driver_program)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CerberusError::MissingDependency(format!(
                    "{} not found on PATH",
                    self.driver_program
                )),
                _ => CerberusError::Automation(format!("Failed to start {}: {}", self.driver_program, e)),
            })?;

        let base = format!("http://127.0.0.1:{}", port);
        self.wait_ready(&base).await?;
        Ok((child, base))
    }

    async fn wait_ready(&self, base: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        while tokio::time::Instant::now() < deadline {
            if let Ok(response) = self.client.get(format!("{}/status", base)).send().await {
                if let Ok(body) = response.json::<Value>().await {
                    if body["value"]["ready"].as_bool().unwrap_or(false) {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(CerberusError::Automation("WebDriver did not become ready".to_string()))
    }
}

impl Default for WebDriverBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn capture(&self, url: &str, options: &BrowserOptions) -> Result<PageCapture> {
        let (mut child, base) = self.spawn_driver().await?;
        let result = capture_with_endpoint(&self.client, &base, url, options).await;
        if let Err(e) = child.kill().await {
            warn!("WebDriver could not be closed properly: {}", e);
        }
        result
    }
}

/// Run one capture against a WebDriver endpoint that is already listening.
///
/// The session is deleted whether or not the capture succeeded.
pub async fn capture_with_endpoint(
    client: &Client,
    base: &str,
    url: &str,
    options: &BrowserOptions,
) -> Result<PageCapture> {
    let session = Session::start(client, base, options).await?;
    let result = session.inspect(url, options).await;
    session.close().await;
    result
}

struct Session<'a> {
    client: &'a Client,
    root: String,
}

impl<'a> Session<'a> {
    async fn start(client: &'a Client, base: &str, options: &BrowserOptions) -> Result<Session<'a>> {
        let value = command(client, reqwest::Method::POST, &format!("{}/session", base), Some(capabilities(options))).await?;
        let id = value["sessionId"]
            .as_str()
            .ok_or_else(|| CerberusError::Automation("WebDriver returned no session id".to_string()))?;
        debug!("WebDriver session {}", id);
        Ok(Session {
            client,
            root: format!("{}/session/{}", base, id),
        })
    }

    async fn inspect(&self, url: &str, options: &BrowserOptions) -> Result<PageCapture> {
        self.post("url", json!({ "url": "about:blank" })).await?;
        for cookie in &options.cookies {
            let body = json!({ "cookie": { "name": cookie.name, "value": cookie.value, "domain": cookie.domain } });
            if let Err(e) = self.post("cookie", body).await {
                debug!("Cookie {} rejected: {}", cookie.name, e);
            }
        }

        self.post("url", json!({ "url": url })).await?;
        tokio::time::sleep(options.settle).await;

        let title = self
            .get("title")
            .await?
            .as_str()
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty());

        let video_src = match self.video_src().await {
            Ok(src) => src,
            Err(e) => {
                debug!("No <video> source: {}", e);
                None
            }
        };

        let log = self.post("se/log", json!({ "type": "performance" })).await?;
        Ok(PageCapture {
            title,
            video_src,
            responses: parse_performance_log(&log),
        })
    }

    async fn video_src(&self) -> Result<Option<String>> {
        let element = self
            .post("element", json!({ "using": "css selector", "value": "video" }))
            .await?;
        let Some(id) = element[ELEMENT_KEY].as_str() else {
            return Ok(None);
        };
        let src = self.get(&format!("element/{}/attribute/src", id)).await?;
        Ok(src.as_str().map(str::to_string).filter(|s| !s.is_empty()))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        command(self.client, reqwest::Method::POST, &format!("{}/{}", self.root, path), Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        command(self.client, reqwest::Method::GET, &format!("{}/{}", self.root, path), None).await
    }

    async fn close(&self) {
        if let Err(e) = command(self.client, reqwest::Method::DELETE, &self.root, None).await {
            warn!("WebDriver session could not be closed: {}", e);
        }
    }
}

/// Send one WebDriver command and unwrap its `value`
async fn command(client: &Client, method: reqwest::Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| CerberusError::Automation(format!("WebDriver request failed: {}", e)))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| CerberusError::Automation(format!("Malformed WebDriver response: {}", e)))?;

    if !status.is_success() {
        let message = payload["value"]["message"]
            .as_str()
            .or_else(|| payload["value"]["error"].as_str())
            .unwrap_or("unknown error");
        return Err(CerberusError::Automation(format!("WebDriver {}: {}", status.as_u16(), message)));
    }

    Ok(payload["value"].clone())
}

fn capabilities(options: &BrowserOptions) -> Value {
    let mut args = vec!["--incognito".to_string()];
    if options.headless {
        args.push("--window-position=0,3000".to_string());
        args.push("--headless=new".to_string());
    }

    let mut chrome = json!({ "args": args });
    if let Some(path) = &options.browser_path {
        chrome["binary"] = json!(path.to_string_lossy());
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": chrome,
                "goog:loggingPrefs": { "performance": "ALL" }
            }
        }
    })
}

/// One `/se/log` performance entry; `message` is itself JSON text
#[derive(Debug, Deserialize)]
struct LogEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DevToolsEvent {
    message: DevToolsMessage,
}

#[derive(Debug, Deserialize)]
struct DevToolsMessage {
    method: String,
    #[serde(default)]
    params: Option<ResponseParams>,
}

#[derive(Debug, Deserialize)]
struct ResponseParams {
    response: ResponseInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInfo {
    url: String,
    #[serde(default)]
    mime_type: String,
}

/// Extract `Network.responseReceived` events from a performance log
pub fn parse_performance_log(log: &Value) -> Vec<NetworkResponse> {
    let Some(entries) = log.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| LogEntry::deserialize(entry).ok())
        .filter_map(|entry| serde_json::from_str::<DevToolsEvent>(&entry.message).ok())
        .filter(|event| event.message.method == "Network.responseReceived")
        .filter_map(|event| event.message.params)
        .map(|params| NetworkResponse {
            url: params.response.url,
            mime_type: params.response.mime_type,
        })
        .collect()
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn log_entry(method: &str, url: &str, mime: &str) -> Value {
        let inner = json!({
            "message": {
                "method": method,
                "params": { "response": { "url": url, "mimeType": mime } }
            }
        });
        json!({ "level": "INFO", "message": inner.to_string(), "timestamp": 1 })
    }

    #[test]
    fn test_parse_performance_log() {
        let log = json!([
            log_entry("Network.responseReceived", "https://cdn/a.mp4", "video/mp4"),
            log_entry("Network.requestWillBeSent", "https://cdn/b.mp4", "video/mp4"),
            log_entry("Network.responseReceived", "https://site/page", "text/html"),
            { "message": "not json" },
            { "message": json!({ "message": { "method": "Network.responseReceived" } }).to_string() },
            {
                "message": json!({
                    "message": {
                        "method": "Network.responseReceived",
                        "params": { "response": { "url": "https://cdn/c.ts" } }
                    }
                })
                .to_string()
            }
        ]);
        let responses = parse_performance_log(&log);
        assert_eq!(
            responses,
            vec![
                NetworkResponse {
                    url: "https://cdn/a.mp4".into(),
                    mime_type: "video/mp4".into()
                },
                NetworkResponse {
                    url: "https://site/page".into(),
                    mime_type: "text/html".into()
                },
                NetworkResponse {
                    url: "https://cdn/c.ts".into(),
                    mime_type: String::new()
                },
            ]
        );
        assert!(parse_performance_log(&json!({})).is_empty());
    }

    #[test]
    fn test_capabilities_headless() {
        let caps = capabilities(&BrowserOptions {
            browser_path: Some(PathBuf::from("/opt/chrome")),
            headless: true,
            ..BrowserOptions::default()
        });
        let chrome = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];
        assert_eq!(chrome["binary"], "/opt/chrome");
        assert_eq!(chrome["args"][0], "--incognito");
        assert_eq!(chrome["args"][2], "--headless=new");
        assert_eq!(
            caps["capabilities"]["alwaysMatch"]["goog:loggingPrefs"]["performance"],
            "ALL"
        );
    }

    #[tokio::test]
    async fn test_capture_against_webdriver_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let session = server
            .mock("POST", "/session")
            .with_body(r#"{"value":{"sessionId":"s1","capabilities":{}}}"#)
            .create_async()
            .await;
        let navigate = server
            .mock("POST", "/session/s1/url")
            .with_body(r#"{"value":null}"#)
            .expect(2)
            .create_async()
            .await;
        let cookie = server
            .mock("POST", "/session/s1/cookie")
            .match_body(Matcher::PartialJson(json!({"cookie": {"name": "sid"}})))
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/session/s1/title")
            .with_body(r#"{"value":"Great Clip"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/session/s1/element")
            .with_body(format!(r#"{{"value":{{"{}":"e1"}}}}"#, ELEMENT_KEY))
            .create_async()
            .await;
        server
            .mock("GET", "/session/s1/element/e1/attribute/src")
            .with_body(r#"{"value":"https://cdn/dom.mp4"}"#)
            .create_async()
            .await;
        let log = json!({ "value": [log_entry("Network.responseReceived", "https://cdn/a.m3u8", "application/vnd.apple.mpegurl")] });
        server
            .mock("POST", "/session/s1/se/log")
            .with_body(log.to_string())
            .create_async()
            .await;
        let close = server
            .mock("DELETE", "/session/s1")
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create_async()
            .await;

        let options = BrowserOptions {
            cookies: vec![BrowserCookie {
                name: "sid".into(),
                value: "abc".into(),
                domain: ".newgrounds.com".into(),
            }],
            settle: Duration::from_millis(1),
            ..BrowserOptions::default()
        };
        let capture = capture_with_endpoint(&Client::new(), &server.url(), "https://site/v/1", &options)
            .await
            .unwrap();

        assert_eq!(capture.title.as_deref(), Some("Great Clip"));
        assert_eq!(capture.video_src.as_deref(), Some("https://cdn/dom.mp4"));
        assert_eq!(capture.responses.len(), 1);
        assert_eq!(capture.responses[0].url, "https://cdn/a.m3u8");

        session.assert_async().await;
        navigate.assert_async().await;
        cookie.assert_async().await;
        close.assert_async().await;
    }

    #[tokio::test]
    async fn test_capture_failure_still_closes_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/session")
            .with_body(r#"{"value":{"sessionId":"s2"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/session/s2/url")
            .with_status(404)
            .with_body(r#"{"value":{"error":"no such window","message":"window closed"}}"#)
            .create_async()
            .await;
        let close = server
            .mock("DELETE", "/session/s2")
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create_async()
            .await;

        let err = capture_with_endpoint(
            &Client::new(),
            &server.url(),
            "https://site/v/1",
            &BrowserOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CerberusError::Automation(ref m) if m.contains("window closed")));
        close.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_driver_is_reported() {
        let browser = WebDriverBrowser::with_driver("cerberus-no-such-chromedriver");
        let err = browser
            .capture("https://site/v/1", &BrowserOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CerberusError::MissingDependency(_)));
    }
}
