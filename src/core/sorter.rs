//! Post-download filing into `sort_by` subfolders

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::config::SortBy;
use crate::platform::client::fetch_text;
use crate::utils::filename::sanitize_filename;
use crate::utils::url::platform_label;

const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

static META_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Move `file` into a subfolder of `base_dir` chosen by `sort_by`.
///
/// Returns the final location; any failure leaves the file where it was.
pub async fn sort_downloaded(
    client: &Client,
    file: &Path,
    page_url: &str,
    sort_by: SortBy,
    base_dir: &Path,
) -> PathBuf {
    if sort_by == SortBy::None {
        return file.to_path_buf();
    }

    let html = match fetch_text(client, page_url, PAGE_TIMEOUT).await {
        Ok(html) => Some(html),
        Err(e) => {
            error!("Error fetching page for sorting: {}", e);
            None
        }
    };

    let Some(folder) = folder_for(sort_by, html.as_deref(), page_url) else {
        return file.to_path_buf();
    };
    let Some(name) = file.file_name() else {
        return file.to_path_buf();
    };

    let dest_dir = base_dir.join(folder);
    let dest = dest_dir.join(name);
    if dest == file {
        return dest;
    }

    match move_file(file, &dest_dir, &dest).await {
        Ok(()) => {
            info!("Sorted {} into {}", file.display(), dest_dir.display());
            dest
        }
        Err(e) => {
            error!("Error moving file to sorted folder: {}", e);
            file.to_path_buf()
        }
    }
}

/// Subfolder name for `sort_by`, from page metadata with fixed fallbacks
pub fn folder_for(sort_by: SortBy, html: Option<&str>, page_url: &str) -> Option<String> {
    let meta = |attr: &str, key: &str| html.and_then(|h| meta_content(h, attr, key));

    let raw = match sort_by {
        SortBy::None => return None,
        SortBy::Platform => meta("property", "og:site_name").or_else(|| platform_label(page_url))?,
        SortBy::Artist => meta("name", "author").unwrap_or_else(|| "unknown_artist".to_string()),
        SortBy::Genre => meta("name", "genre").unwrap_or_else(|| "unknown_genre".to_string()),
    };
    Some(folder_name(&raw))
}

fn folder_name(raw: &str) -> String {
    sanitize_filename(&raw.trim().to_lowercase().replace(' ', "_"))
}

/// `content` of the first `<meta>` tag whose `attr` equals `key`
pub fn meta_content(html: &str, attr: &str, key: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|tag| {
        let attrs: HashMap<String, &str> = ATTR_RE
            .captures_iter(tag.as_str())
            .filter_map(|cap| {
                let value = cap.get(2).or_else(|| cap.get(3))?;
                Some((cap[1].to_ascii_lowercase(), value.as_str()))
            })
            .collect();

        let matches = attrs
            .get(&attr.to_ascii_lowercase())
            .map_or(false, |v| v.eq_ignore_ascii_case(key));
        if !matches {
            return None;
        }
        attrs
            .get("content")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    })
}

async fn move_file(from: &Path, dest_dir: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dest_dir).await?;
    if let Err(e) = tokio::fs::rename(from, dest).await {
        debug!("Rename failed ({}), copying instead", e);
        tokio::fs::copy(from, dest).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE: &str = r#"<html><head>
        <meta property="og:site_name" content="Cool Videos">
        <META content='Jane Doe' NAME='author' />
        <meta name="genre" content="  ">
        </head></html>"#;

    #[test]
    fn test_meta_content() {
        assert_eq!(meta_content(PAGE, "property", "og:site_name").as_deref(), Some("Cool Videos"));
        assert_eq!(meta_content(PAGE, "name", "author").as_deref(), Some("Jane Doe"));
        assert_eq!(meta_content(PAGE, "name", "genre"), None);
        assert_eq!(meta_content(PAGE, "name", "missing"), None);
    }

    #[test]
    fn test_folder_for() {
        let url = "https://www.example.com/v/1";
        assert_eq!(folder_for(SortBy::Platform, Some(PAGE), url).as_deref(), Some("cool_videos"));
        assert_eq!(folder_for(SortBy::Platform, None, url).as_deref(), Some("example"));
        assert_eq!(folder_for(SortBy::Artist, Some(PAGE), url).as_deref(), Some("jane_doe"));
        assert_eq!(folder_for(SortBy::Artist, None, url).as_deref(), Some("unknown_artist"));
        assert_eq!(folder_for(SortBy::Genre, Some(PAGE), url).as_deref(), Some("unknown_genre"));
        assert_eq!(folder_for(SortBy::None, Some(PAGE), url), None);
    }

    #[tokio::test]
    async fn test_sort_moves_file_into_subfolder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v/1")
            .with_body(r#"<meta name="author" content="Some Artist">"#)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let moved = sort_downloaded(
            &Client::new(),
            &file,
            &format!("{}/v/1", server.url()),
            SortBy::Artist,
            dir.path(),
        )
        .await;

        assert_eq!(moved, dir.path().join("some_artist").join("clip.mp4"));
        assert!(moved.exists());
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_sort_none_leaves_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let kept = sort_downloaded(&Client::new(), &file, "https://x.io", SortBy::None, dir.path()).await;
        assert_eq!(kept, file);
    }
}
