//! Container extension lookup for media mime types.

/// Map a mime type (parameters allowed) to a file extension.
///
/// Full types are tried first so `audio/mp4` resolves to `m4a` while
/// `video/mp4` falls through to the `mp4` subtype.
pub fn extension_from_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if let Some(ext) = lookup(&essence) {
        return ext;
    }
    essence
        .rsplit('/')
        .next()
        .and_then(lookup)
        .unwrap_or("unknown")
}

fn lookup(key: &str) -> Option<&'static str> {
    let ext = match key {
        // video
        "3gpp" => "3gp",
        "mp2t" => "ts",
        "mp4" => "mp4",
        "mpeg" => "mpeg",
        "mpegurl" => "m3u8",
        "quicktime" => "mov",
        "webm" => "webm",
        "vp9" => "vp9",
        "x-flv" => "flv",
        "x-m4v" => "m4v",
        "x-matroska" => "mkv",
        "x-mng" => "mng",
        "x-mp4-fragmented" => "mp4",
        "x-ms-asf" => "asf",
        "x-ms-wmv" => "wmv",
        "x-msvideo" => "avi",

        // audio
        "audio/mp4" => "m4a",
        "audio/mpeg" => "mp3",
        "audio/webm" => "webm",
        "audio/x-matroska" => "mka",
        "audio/x-mpegurl" => "m3u",
        "midi" => "mid",
        "ogg" => "ogg",
        "wav" | "wave" | "x-wav" => "wav",
        "x-aac" => "aac",
        "x-flac" => "flac",
        "x-m4a" => "m4a",
        "x-realaudio" => "ra",
        _ => return None,
    };
    Some(ext)
}
