//! Media candidate selection

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::core::entry::{
    ExtractedInfo, FormatCandidate, MediaCandidate, MediaSource, QualityPreference, RawEntry,
};
use crate::platform::extractor::MetadataExtractor;

/// Pick one concrete resource for `entry`.
///
/// Tries the entry's own media first. When the entry is opaque, the
/// extractor is queried once more with `fallback_url` and the fresh
/// result is tried for a direct URL or a format list. `None` means the
/// caller should hand the whole entry to the extractor's own download.
pub async fn select_candidate(
    entry: &RawEntry,
    fallback_url: &str,
    quality: &QualityPreference,
    extractor: &dyn MetadataExtractor,
) -> Option<MediaCandidate> {
    if let Some(candidate) = select_from_source(entry, quality, true) {
        return Some(candidate);
    }

    if fallback_url.trim().is_empty() {
        return None;
    }

    debug!("Re-extracting {} to find a media URL", fallback_url);
    let fresh = match extractor.extract(fallback_url, quality).await {
        Ok(ExtractedInfo::Single(entry)) => entry,
        Ok(ExtractedInfo::Playlist { entries, .. }) => entries.into_iter().next()?,
        Err(e) => {
            warn!("Re-extraction failed for {}: {}", fallback_url, e);
            return None;
        }
    };

    select_from_source(&fresh, quality, false)
}

/// Steps that need no network: direct URL, format list, and optionally the
/// first paired stream.
fn select_from_source(
    entry: &RawEntry,
    quality: &QualityPreference,
    allow_paired: bool,
) -> Option<MediaCandidate> {
    match &entry.source {
        MediaSource::DirectUrl { url, ext } if !url.trim().is_empty() => Some(MediaCandidate {
            url: url.clone(),
            ext: ext.clone(),
            filesize: entry.filesize,
            duration: entry.duration,
            format_id: None,
        }),
        MediaSource::FormatList(formats) => {
            let best = pick_format(formats, quality)?;
            Some(MediaCandidate {
                url: best.usable_url()?.to_string(),
                ext: best.ext.clone(),
                filesize: best.filesize.or(entry.filesize),
                duration: best.duration.or(entry.duration),
                format_id: best.format_id.clone(),
            })
        }
        MediaSource::PairedFormats(pairs) if allow_paired => {
            let first = pairs.first()?;
            Some(MediaCandidate {
                url: first.usable_url()?.to_string(),
                ext: first.ext.clone(),
                filesize: first.filesize.or(entry.filesize),
                duration: first.duration.or(entry.duration),
                format_id: first.format_id.clone(),
            })
        }
        _ => None,
    }
}

/// Choose among formats with a usable URL according to `quality`.
/// Ties keep the earlier format.
pub fn pick_format<'a>(
    formats: &'a [FormatCandidate],
    quality: &QualityPreference,
) -> Option<&'a FormatCandidate> {
    let usable: Vec<&FormatCandidate> = formats.iter().filter(|f| f.usable_url().is_some()).collect();

    match quality {
        QualityPreference::Worst => first_by(&usable, Ordering::Less),
        QualityPreference::MaxHeight(limit) => {
            let capped: Vec<&FormatCandidate> = usable
                .iter()
                .copied()
                .filter(|f| f.height.map_or(false, |h| h <= *limit))
                .collect();
            first_by(&capped, Ordering::Greater).or_else(|| first_by(&usable, Ordering::Greater))
        }
        QualityPreference::Best | QualityPreference::Raw(_) => first_by(&usable, Ordering::Greater),
    }
}

fn first_by<'a>(formats: &[&'a FormatCandidate], wanted: Ordering) -> Option<&'a FormatCandidate> {
    formats.iter().copied().fold(None, |chosen, candidate| match chosen {
        Some(current) if compare_score(candidate, current) != wanted => Some(current),
        _ => Some(candidate),
    })
}

fn compare_score(a: &FormatCandidate, b: &FormatCandidate) -> Ordering {
    let (ha, ra) = a.score();
    let (hb, rb) = b.score();
    ha.cmp(&hb)
        .then_with(|| ra.partial_cmp(&rb).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CerberusError;
    use crate::Result;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct FakeExtractor {
        answer: Option<RawEntry>,
        calls: AtomicUsize,
    }

    impl FakeExtractor {
        fn new(answer: Option<RawEntry>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataExtractor for FakeExtractor {
        async fn extract(&self, _url: &str, _quality: &QualityPreference) -> Result<ExtractedInfo> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.answer
                .clone()
                .map(ExtractedInfo::Single)
                .ok_or_else(|| CerberusError::Extraction("nothing".into()))
        }

        async fn download(&self, _url: &str, _target: &Path, _quality: &QualityPreference) -> Result<()> {
            Ok(())
        }
    }

    fn format(url: &str, height: u32, tbr: f64) -> FormatCandidate {
        FormatCandidate {
            url: Some(url.to_string()),
            height: Some(height),
            tbr: Some(tbr),
            ext: Some("mp4".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_direct_url_wins() {
        let mut entry = RawEntry::new(MediaSource::DirectUrl {
            url: "https://cdn/a.webm".into(),
            ext: Some("webm".into()),
        });
        entry.duration = Some(3.0);
        let extractor = FakeExtractor::new(None);

        let picked = select_candidate(&entry, "https://page", &QualityPreference::Best, &extractor)
            .await
            .unwrap();
        assert_eq!(picked.url, "https://cdn/a.webm");
        assert_eq!(picked.ext.as_deref(), Some("webm"));
        assert_eq!(picked.duration, Some(3.0));
        assert_eq!(extractor.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_highest_resolution_format_selected() {
        let entry = RawEntry::new(MediaSource::FormatList(vec![
            format("https://cdn/480.mp4", 480, 500.0),
            format("https://cdn/1080.mp4", 1080, 2000.0),
        ]));
        let extractor = FakeExtractor::new(None);

        let picked = select_candidate(&entry, "", &QualityPreference::Best, &extractor)
            .await
            .unwrap();
        assert_eq!(picked.url, "https://cdn/1080.mp4");
    }

    #[test]
    fn test_bitrate_breaks_height_ties() {
        let formats = vec![
            format("https://cdn/low", 720, 900.0),
            format("https://cdn/high", 720, 1500.0),
        ];
        let picked = pick_format(&formats, &QualityPreference::Best).unwrap();
        assert_eq!(picked.url.as_deref(), Some("https://cdn/high"));
    }

    #[test]
    fn test_worst_and_max_height() {
        let formats = vec![
            format("https://cdn/360", 360, 300.0),
            format("https://cdn/720", 720, 1200.0),
            format("https://cdn/1080", 1080, 3000.0),
        ];
        let worst = pick_format(&formats, &QualityPreference::Worst).unwrap();
        assert_eq!(worst.url.as_deref(), Some("https://cdn/360"));

        let capped = pick_format(&formats, &QualityPreference::MaxHeight(720)).unwrap();
        assert_eq!(capped.url.as_deref(), Some("https://cdn/720"));

        let none_fit = pick_format(&formats, &QualityPreference::MaxHeight(144)).unwrap();
        assert_eq!(none_fit.url.as_deref(), Some("https://cdn/1080"));
    }

    #[tokio::test]
    async fn test_blank_urls_never_selected() {
        let entry = RawEntry::new(MediaSource::FormatList(vec![
            format("   ", 2160, 9000.0),
            format("https://cdn/720", 720, 1000.0),
        ]));
        let extractor = FakeExtractor::new(None);

        let picked = select_candidate(&entry, "", &QualityPreference::Best, &extractor)
            .await
            .unwrap();
        assert_eq!(picked.url, "https://cdn/720");

        let blank = RawEntry::new(MediaSource::DirectUrl {
            url: " ".into(),
            ext: None,
        });
        assert!(select_candidate(&blank, "", &QualityPreference::Best, &extractor)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_blank_entry_url_uses_format_list() {
        let entry = RawEntry::from_json(&serde_json::json!({
            "id": "a",
            "url": "",
            "formats": [{ "url": "https://cdn/720.mp4", "height": 720 }]
        }))
        .unwrap();
        let failing = FakeExtractor::new(None);

        let picked = select_candidate(&entry, "", &QualityPreference::Best, &failing)
            .await
            .unwrap();
        assert_eq!(picked.url, "https://cdn/720.mp4");
        assert_eq!(failing.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_paired_formats_take_first_stream() {
        let entry = RawEntry::new(MediaSource::PairedFormats(vec![
            format("https://cdn/video", 1080, 2500.0),
            format("https://cdn/audio", 0, 128.0),
        ]));
        let extractor = FakeExtractor::new(None);

        let picked = select_candidate(&entry, "", &QualityPreference::Best, &extractor)
            .await
            .unwrap();
        assert_eq!(picked.url, "https://cdn/video");
    }

    #[tokio::test]
    async fn test_opaque_entry_requeries_fallback_url() {
        let fresh = RawEntry::new(MediaSource::FormatList(vec![format(
            "https://cdn/fresh.mp4",
            720,
            800.0,
        )]));
        let extractor = FakeExtractor::new(Some(fresh));

        let picked = select_candidate(
            &RawEntry::new(MediaSource::Opaque),
            "https://page/v/1",
            &QualityPreference::Best,
            &extractor,
        )
        .await
        .unwrap();
        assert_eq!(picked.url, "https://cdn/fresh.mp4");
        assert_eq!(extractor.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_requery_ignores_paired_formats_and_failures() {
        let paired = RawEntry::new(MediaSource::PairedFormats(vec![format("https://cdn/v", 720, 1.0)]));
        let extractor = FakeExtractor::new(Some(paired));
        assert!(select_candidate(
            &RawEntry::new(MediaSource::Opaque),
            "https://page",
            &QualityPreference::Best,
            &extractor
        )
        .await
        .is_none());

        let failing = FakeExtractor::new(None);
        assert!(select_candidate(
            &RawEntry::new(MediaSource::Opaque),
            "https://page",
            &QualityPreference::Best,
            &failing
        )
        .await
        .is_none());
        assert_eq!(failing.calls.load(AtomicOrdering::SeqCst), 1);
    }
}
