//! Discovered entries, format candidates and resolved media candidates

use serde::Deserialize;
use serde_json::Value;

/// Extractor info document, as much of it as selection needs
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfoJson {
    pub id: Option<String>,
    pub title: Option<String>,
    pub fulltitle: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub duration: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<f64>,
    pub formats: Option<Vec<FormatJson>>,
    pub requested_formats: Option<Vec<FormatJson>>,
    /// Present only on playlist-like results; `null` items are allowed
    pub entries: Option<Vec<Option<InfoJson>>>,
}

/// One item of an extractor `formats` list
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormatJson {
    pub format_id: Option<String>,
    pub url: Option<String>,
    pub ext: Option<String>,
    pub height: Option<u64>,
    pub tbr: Option<f64>,
    pub duration: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<f64>,
}

/// One competing encoding of an entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatCandidate {
    /// Format identifier reported by the extractor
    pub format_id: Option<String>,
    /// Resource URL
    pub url: Option<String>,
    /// File extension
    pub ext: Option<String>,
    /// Vertical resolution
    pub height: Option<u32>,
    /// Total bitrate in kbps
    pub tbr: Option<f64>,
    /// Exact or approximate size in bytes
    pub filesize: Option<u64>,
    /// Duration in seconds
    pub duration: Option<f64>,
}

impl FormatCandidate {
    /// Resource URL if it is non-blank
    pub fn usable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Sort key: (height, bitrate), missing values count as zero
    pub fn score(&self) -> (u32, f64) {
        (self.height.unwrap_or(0), self.tbr.unwrap_or(0.0))
    }
}

impl From<FormatJson> for FormatCandidate {
    fn from(format: FormatJson) -> Self {
        Self {
            format_id: format.format_id,
            url: format.url,
            ext: format.ext,
            height: format.height.and_then(|h| u32::try_from(h).ok()),
            tbr: format.tbr,
            filesize: size_or_approx(format.filesize, format.filesize_approx),
            duration: format.duration,
        }
    }
}

/// How an entry exposes its media
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// The entry itself names a resource
    DirectUrl { url: String, ext: Option<String> },
    /// Competing single-file encodings
    FormatList(Vec<FormatCandidate>),
    /// Separate video and audio streams chosen by the extractor
    PairedFormats(Vec<FormatCandidate>),
    /// Nothing usable without another extraction round
    Opaque,
}

/// One candidate video discovered for a page
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Page the entry was found on, if the extractor reported one
    pub webpage_url: Option<String>,
    pub duration: Option<f64>,
    pub filesize: Option<u64>,
    pub source: MediaSource,
}

impl RawEntry {
    /// Entry with no metadata and the given media source
    pub fn new(source: MediaSource) -> Self {
        Self {
            id: None,
            title: None,
            webpage_url: None,
            duration: None,
            filesize: None,
            source,
        }
    }

    /// Build an entry from one extractor info object
    pub fn from_json(value: &Value) -> serde_json::Result<Self> {
        InfoJson::deserialize(value).map(Self::from)
    }

    /// Direct resource URL, when the entry carries one
    pub fn direct_url(&self) -> Option<&str> {
        match &self.source {
            MediaSource::DirectUrl { url, .. } => Some(url.as_str()),
            _ => None,
        }
    }

    /// Stable de-duplication key: id, page URL, direct URL, then a
    /// (title, duration, filesize) composite.
    pub fn identity_key(&self) -> String {
        non_blank(self.id.as_deref())
            .or_else(|| non_blank(self.webpage_url.as_deref()))
            .or_else(|| non_blank(self.direct_url()))
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}|{}|{}",
                    self.title.as_deref().unwrap_or("").trim(),
                    self.duration.map(|d| d.to_string()).unwrap_or_default(),
                    self.filesize.map(|s| s.to_string()).unwrap_or_default()
                )
            })
    }

    /// URL to use when this entry must be extracted or downloaded on its own
    pub fn page_url_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        non_blank(self.webpage_url.as_deref())
            .or_else(|| non_blank(self.direct_url()))
            .unwrap_or(fallback)
    }
}

impl From<InfoJson> for RawEntry {
    /// The first usable field wins: a non-blank `url`, then a non-empty
    /// `formats` list, then a non-empty `requested_formats` list.
    fn from(info: InfoJson) -> Self {
        let source = match (info.url, info.formats, info.requested_formats) {
            (Some(url), _, _) if !url.trim().is_empty() => MediaSource::DirectUrl { url, ext: info.ext },
            (_, Some(formats), _) if !formats.is_empty() => {
                MediaSource::FormatList(formats.into_iter().map(FormatCandidate::from).collect())
            }
            (_, _, Some(pairs)) if !pairs.is_empty() => {
                MediaSource::PairedFormats(pairs.into_iter().map(FormatCandidate::from).collect())
            }
            _ => MediaSource::Opaque,
        };

        Self {
            id: info.id,
            title: info.title.or(info.fulltitle),
            webpage_url: info.webpage_url,
            duration: info.duration,
            filesize: size_or_approx(info.filesize, info.filesize_approx),
            source,
        }
    }
}

/// Result of one metadata extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedInfo {
    /// One item
    Single(RawEntry),
    /// Playlist-like result with nested entries
    Playlist {
        title: Option<String>,
        id: Option<String>,
        entries: Vec<RawEntry>,
    },
}

impl ExtractedInfo {
    /// Parse a full extractor info document
    pub fn from_json(value: &Value) -> serde_json::Result<Self> {
        InfoJson::deserialize(value).map(Self::from)
    }

    /// Title usable as a base filename: title, then id
    pub fn base_title(&self) -> Option<&str> {
        match self {
            ExtractedInfo::Single(entry) => non_blank(entry.title.as_deref())
                .or_else(|| non_blank(entry.id.as_deref())),
            ExtractedInfo::Playlist { title, id, .. } => {
                non_blank(title.as_deref()).or_else(|| non_blank(id.as_deref()))
            }
        }
    }
}

impl From<InfoJson> for ExtractedInfo {
    fn from(mut info: InfoJson) -> Self {
        match info.entries.take() {
            Some(entries) => ExtractedInfo::Playlist {
                title: info.title.or(info.fulltitle),
                id: info.id,
                entries: entries.into_iter().flatten().map(RawEntry::from).collect(),
            },
            None => ExtractedInfo::Single(RawEntry::from(info)),
        }
    }
}

/// Concrete resource chosen for an entry
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCandidate {
    pub url: String,
    pub ext: Option<String>,
    pub filesize: Option<u64>,
    pub duration: Option<f64>,
    pub format_id: Option<String>,
}

/// Quality preference from `-q` or `default_quality`
#[derive(Debug, Clone, PartialEq)]
pub enum QualityPreference {
    Best,
    Worst,
    /// Best candidate no taller than the given height
    MaxHeight(u32),
    /// Extractor-specific selector passed through untouched
    Raw(String),
}

impl QualityPreference {
    /// Parse a quality string (`best`, `worst`, `720p`, `height<=720`, ...)
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" | "best" => return QualityPreference::Best,
            "worst" => return QualityPreference::Worst,
            _ => {}
        }

        let height = lower
            .strip_suffix('p')
            .or_else(|| lower.strip_prefix("height<="))
            .and_then(|h| h.parse::<u32>().ok());

        match height {
            Some(h) => QualityPreference::MaxHeight(h),
            None => QualityPreference::Raw(s.trim().to_string()),
        }
    }

    /// Format selector understood by the extraction tool
    pub fn extractor_selector(&self) -> String {
        match self {
            QualityPreference::Best => "best".to_string(),
            QualityPreference::Worst => "worst".to_string(),
            QualityPreference::MaxHeight(h) => format!("best[height<={}]/best", h),
            QualityPreference::Raw(raw) => raw.clone(),
        }
    }
}

impl Default for QualityPreference {
    fn default() -> Self {
        QualityPreference::Best
    }
}

fn size_or_approx(exact: Option<u64>, approx: Option<f64>) -> Option<u64> {
    exact.or_else(|| approx.filter(|s| s.is_finite() && *s >= 0.0).map(|s| s as u64))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}
