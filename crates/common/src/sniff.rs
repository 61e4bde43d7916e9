//! Content detection: magic bytes → content type, content type → extension
//! and high-level file kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The generic binary type. Detection results equal to this are considered
/// inconclusive and lose to a declared content type.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Sniffs a content type from leading magic bytes. Falls back to
/// `text/plain` for valid UTF-8 and [`OCTET_STREAM`] otherwise.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        return OCTET_STREAM;
    }
    match bytes {
        [0xff, 0xd8, 0xff, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => "audio/wav",
        [b'I', b'D', b'3', ..] | [0xff, 0xfb, ..] | [0xff, 0xf3, ..] => "audio/mpeg",
        [b'O', b'g', b'g', b'S', ..] => "audio/ogg",
        [b'%', b'P', b'D', b'F', ..] => "application/pdf",
        [b'P', b'K', 0x03, 0x04, ..] => "application/zip",
        [0x1f, 0x8b, ..] => "application/gzip",
        [b'{', ..] | [b'[', ..] => "application/json",
        _ if bytes.len() > 8 && &bytes[4..8] == b"ftyp" => "video/mp4",
        [0x1a, 0x45, 0xdf, 0xa3, ..] => "video/webm",
        _ if std::str::from_utf8(bytes).is_ok() => "text/plain",
        _ => OCTET_STREAM,
    }
}

/// Picks between a sniffed and a declared content type: detection wins unless
/// it is inconclusive and a declared value exists.
pub fn choose_content_type(detected: &str, declared: &str) -> String {
    if detected == OCTET_STREAM && !declared.is_empty() {
        declared.to_string()
    } else {
        detected.to_string()
    }
}

/// Extension (with leading dot) from the final path segment, if any.
pub fn extension_from_path(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let dot = segment.rfind('.')?;
    let ext = &segment[dot + 1..];
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// Extension (with leading dot) for a content type, from a fixed mapping.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match normalized.as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        "audio/ogg" => ".ogg",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/markdown" => ".md",
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        _ => return None,
    };
    Some(ext)
}

/// High-level file classification derived from the content type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Text,
    Document,
    Archive,
    Data,
    Other,
}

impl FileKind {
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.starts_with("image/") {
            FileKind::Image
        } else if ct.starts_with("video/") {
            FileKind::Video
        } else if ct.starts_with("audio/") {
            FileKind::Audio
        } else if ct.starts_with("text/") {
            FileKind::Text
        } else if ct.contains("pdf") || ct.contains("msword") || ct.contains("officedocument") {
            FileKind::Document
        } else if ct.contains("zip") || ct.contains("gzip") || ct.contains("tar") {
            FileKind::Archive
        } else if ct.contains("json") || ct.contains("xml") || ct.contains("yaml") {
            FileKind::Data
        } else {
            FileKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Text => "text",
            FileKind::Document => "document",
            FileKind::Archive => "archive",
            FileKind::Data => "data",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
