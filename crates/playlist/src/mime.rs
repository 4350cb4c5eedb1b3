//! Extension to MIME type lookup for the media a gateway usually serves.

/// MIME type for a file extension, with or without the leading dot.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "wma" => "audio/x-ms-wma",
        "ape" => "audio/ape",
        "mka" => "audio/x-matroska",
        "m3u" | "m3u8" => "application/x-mpegURL",
        "cue" => "application/x-cue",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "ts" => "video/mp2t",
        "wmv" => "video/x-ms-wmv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" | "log" | "nfo" => "text/plain",
        "srt" => "application/x-subrip",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}

/// MIME type from the extension of a file name.
pub fn mime_for_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    mime_for_extension(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(mime_for_extension(".MP3"), Some("audio/mpeg"));
        assert_eq!(mime_for_extension("flac"), Some("audio/flac"));
        assert_eq!(mime_for_extension(".mkv"), Some("video/x-matroska"));
        assert_eq!(mime_for_extension(".xyz"), None);
        assert_eq!(mime_for_extension(""), None);
    }

    #[test]
    fn names_use_last_extension() {
        assert_eq!(mime_for_name("01 - Opener.mp3"), Some("audio/mpeg"));
        assert_eq!(mime_for_name("cover.tar.png"), Some("image/png"));
        assert_eq!(mime_for_name(".hidden"), None);
        assert_eq!(mime_for_name(".flac"), Some("audio/flac"));
        assert_eq!(mime_for_name("README"), None);
    }
}
