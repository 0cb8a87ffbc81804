//! URL utilities for host matching and batch URL gathering

use url::Url;

/// Hosts that always go straight to direct extraction
pub const DEFAULT_KNOWN_HOSTS: &[&str] = &["youtube.com", "pornhub.com"];

/// Page path marker for pages that need a Newgrounds login
pub const NEWGROUNDS_VIEW_MARKER: &str = "newgrounds.com/portal/view";

/// Check whether `url` belongs to one of `hosts`.
///
/// A host entry matches the URL's host exactly or as a parent domain
/// (`youtube.com` matches `www.youtube.com`). URLs that do not parse fall
/// back to a plain substring check.
pub fn matches_known_host<S: AsRef<str>>(url: &str, hosts: &[S]) -> bool {
    let parsed_host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));

    hosts.iter().any(|entry| {
        let entry = entry.as_ref().trim().to_ascii_lowercase();
        if entry.is_empty() {
            return false;
        }
        match &parsed_host {
            Some(host) => host == &entry || host.ends_with(&format!(".{}", entry)),
            None => url.to_ascii_lowercase().contains(&entry),
        }
    })
}

/// Check if the page needs the Newgrounds login flow
pub fn is_newgrounds_view(url: &str) -> bool {
    url.contains(NEWGROUNDS_VIEW_MARKER)
}

/// Split a comma-separated URL list, dropping blanks
pub fn split_url_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split newline-separated URL list contents, dropping blanks
pub fn split_url_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

/// Short platform label for a URL: host without `www.`, first label only
pub fn platform_label(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_known_host() {
        let hosts = ["youtube.com", "erome.com"];
        assert!(matches_known_host("https://www.youtube.com/watch?v=x", &hosts));
        assert!(matches_known_host("https://youtube.com/watch?v=x", &hosts));
        assert!(matches_known_host("https://EROME.com/a/1", &hosts));
        assert!(!matches_known_host("https://notyoutube.com/watch", &hosts));
        assert!(!matches_known_host("https://example.com/youtube.com", &hosts));
    }

    #[test]
    fn test_matches_known_host_unparseable_url_uses_substring() {
        assert!(matches_known_host("youtube.com/watch?v=1", &["youtube.com"]));
    }

    #[test]
    fn test_matches_known_host_ignores_blank_entries() {
        assert!(!matches_known_host("https://example.com", &["", "  "]));
    }

    #[test]
    fn test_is_newgrounds_view() {
        assert!(is_newgrounds_view("https://www.newgrounds.com/portal/view/12345"));
        assert!(!is_newgrounds_view("https://www.newgrounds.com/audio/listen/1"));
    }

    #[test]
    fn test_split_url_csv() {
        assert_eq!(
            split_url_csv(" https://a.io/1 ,, https://b.io/2,"),
            vec!["https://a.io/1".to_string(), "https://b.io/2".to_string()]
        );
    }

    #[test]
    fn test_split_url_lines() {
        assert_eq!(
            split_url_lines("https://a.io/1\n\n  https://b.io/2  \r\n"),
            vec!["https://a.io/1".to_string(), "https://b.io/2".to_string()]
        );
    }

    #[test]
    fn test_platform_label() {
        assert_eq!(platform_label("https://www.vimeo.com/123"), Some("vimeo".into()));
        assert_eq!(platform_label("https://cdn.example.org/x"), Some("cdn".into()));
        assert_eq!(platform_label("not a url"), None);
    }
}
