//! Entry de-duplication by identity key

use std::collections::HashSet;

use crate::core::entry::RawEntry;

/// Collapse entries sharing an identity key, keeping the first seen.
///
/// Entries without id or URLs fall back to a title/duration/filesize
/// composite, so distinct videos with identical metadata merge.
pub fn dedupe_entries(entries: Vec<RawEntry>) -> Vec<RawEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.identity_key()))
        .collect()
}

/// Drop repeated strings keeping first-seen order
pub fn dedupe_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
