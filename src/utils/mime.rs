//! MIME type and URL-extension checks for harvesting media resources

/// URL fragments that mark a network response as a media resource
pub const MEDIA_URL_MARKERS: &[&str] = &[".mp4", ".m3u8", ".wav"];

/// Extensions accepted for a `<video src>` attribute
const PLAYABLE_SRC_MARKERS: &[&str] = &[".mp4", ".wav"];

/// Check if MIME type is a video format
pub fn is_video_mime(mime_type: &str) -> bool {
    mime_type.contains("video")
}

/// Check if MIME type is an audio format
pub fn is_audio_mime(mime_type: &str) -> bool {
    mime_type.starts_with("audio/")
}

/// Check if a captured network response refers to a downloadable media resource
pub fn is_media_response(mime_type: &str, url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }
    is_video_mime(mime_type)
        || is_audio_mime(mime_type)
        || MEDIA_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

/// Check if a `<video>` element source points at a directly playable file
pub fn is_playable_src(src: &str) -> bool {
    PLAYABLE_SRC_MARKERS.iter().any(|marker| src.contains(marker))
}
