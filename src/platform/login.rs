//! Site logins that turn stored credentials into session cookies

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::error::CerberusError;
use crate::platform::browser::BrowserCookie;
use crate::Result;

pub const NEWGROUNDS_LOGIN_URL: &str = "https://www.newgrounds.com/login";
pub const NEWGROUNDS_COOKIE_DOMAIN: &str = ".newgrounds.com";

/// Post the Newgrounds login form and return the session cookies it set
pub async fn newgrounds_login(
    login_url: &str,
    username: &str,
    password: &str,
    user_agent: &str,
) -> Result<Vec<BrowserCookie>> {
    let url = Url::parse(login_url)?;
    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .user_agent(user_agent)
        .cookie_provider(Arc::clone(&jar))
        .build()
        .map_err(|e| CerberusError::Network(format!("Failed to build login client: {}", e)))?;

    let response = client
        .post(url.clone())
        .form(&[("username", username), ("password", password)])
        .send()
        .await?;
    if !response.status().is_success() {
        warn!("Newgrounds login answered HTTP {}", response.status().as_u16());
    }

    let cookies = jar
        .cookies(&url)
        .and_then(|header| header.to_str().ok().map(parse_cookie_header))
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| BrowserCookie {
            name,
            value,
            domain: NEWGROUNDS_COOKIE_DOMAIN.to_string(),
        })
        .collect::<Vec<_>>();

    info!("Newgrounds login returned {} cookies", cookies.len());
    Ok(cookies)
}

/// `name=value; name=value` as sent in a `Cookie` header
pub fn cookie_header(cookies: &[BrowserCookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_parse_cookie_header() {
        assert_eq!(
            parse_cookie_header("a=1; b=two=2;  ;c="),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two=2".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_cookie_header() {
        let cookies = vec![
            BrowserCookie {
                name: "vmk1".into(),
                value: "x".into(),
                domain: NEWGROUNDS_COOKIE_DOMAIN.into(),
            },
            BrowserCookie {
                name: "NG_GG_username".into(),
                value: "me".into(),
                domain: NEWGROUNDS_COOKIE_DOMAIN.into(),
            },
        ];
        assert_eq!(cookie_header(&cookies).as_deref(), Some("vmk1=x; NG_GG_username=me"));
        assert_eq!(cookie_header(&[]), None);
    }

    #[tokio::test]
    async fn test_newgrounds_login_collects_cookies() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "me".into()),
                Matcher::UrlEncoded("password".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_header("set-cookie", "vmk1=session; Path=/")
            .create_async()
            .await;

        let cookies = newgrounds_login(&format!("{}/login", server.url()), "me", "secret", "UA")
            .await
            .unwrap();

        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "vmk1");
        assert_eq!(cookies[0].value, "session");
        assert_eq!(cookies[0].domain, NEWGROUNDS_COOKIE_DOMAIN);
        mock.assert_async().await;
    }
}
