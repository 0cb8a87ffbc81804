//! Safe filename generation utilities

/// Fallback base name used when nothing usable survives sanitization
pub const PLACEHOLDER_NAME: &str = "video";

/// Maximum length (in characters) of a sanitized base name
pub const MAX_BASE_LEN: usize = 200;

fn is_invalid_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

/// Convert a title to a safe base filename (no extension)
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| if is_invalid_char(c) { '_' } else { c })
        .collect();

    // Windows refuses names ending in '.' or ' '
    let mut safe = replaced
        .trim_end_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    if safe.chars().count() > MAX_BASE_LEN {
        safe = safe.chars().take(MAX_BASE_LEN).collect::<String>();
        safe = safe.trim_end().to_string();
    }

    if safe.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        safe
    }
}

/// Normalize an extension to its dotted form (`mp4` -> `.mp4`)
pub fn dotted_extension(extension: &str) -> String {
    let ext = extension.trim();
    if ext.is_empty() {
        String::new()
    } else if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Strip a trailing `.mp4` from a user supplied custom name
pub fn strip_mp4_suffix(name: &str) -> &str {
    if name.len() >= 4 && name.is_char_boundary(name.len() - 4) {
        let (stem, tail) = name.split_at(name.len() - 4);
        if tail.eq_ignore_ascii_case(".mp4") {
            return stem;
        }
    }
    name
}

/// Reduce a page title to letters, digits, spaces and underscores
pub fn clean_page_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim_end()
        .to_string()
}
