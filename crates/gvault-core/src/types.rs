use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A named entry in the blob host, with the exact bytes currently stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub path: String,
    /// Opaque token identifying this exact content ("sha" on the host).
    pub revision: String,
    pub content: Vec<u8>,
    pub size: u64,
}

impl RemoteObject {
    pub fn new(path: impl Into<String>, revision: impl Into<String>, content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        Self {
            path: path.into(),
            revision: revision.into(),
            content,
            size,
        }
    }

    /// The final path segment.
    pub fn name(&self) -> &str {
        file_name_of(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One row of a directory listing (no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub revision: String,
    pub kind: EntryKind,
}

/// One entry of the metadata index.
///
/// Field names on the wire follow the documents written by the web
/// browser client, so existing `metadata.json` files load unchanged. Unknown
/// keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(rename = "fileSize", default)]
    pub file_size_bytes: u64,
    /// Upload time, milliseconds since the Unix epoch
    #[serde(rename = "timestamp", default)]
    pub upload_timestamp: u64,
    /// Object path holding the (possibly sealed) content
    #[serde(rename = "path", default)]
    pub stored_path: String,
    #[serde(default)]
    pub encrypted: bool,
    /// Free-text reminder; never the passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    /// Revision token of the object at upload time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Authenticated caller, as handed over by the login layer.
#[derive(Debug)]
pub struct Session {
    pub user_type: String,
    bearer_token: SecretString,
}

impl Session {
    pub fn new(user_type: impl Into<String>, bearer_token: SecretString) -> Self {
        Self {
            user_type: user_type.into(),
            bearer_token,
        }
    }

    pub fn bearer_token(&self) -> &SecretString {
        &self.bearer_token
    }
}

// ── File naming and classification ─────────────────────────────────────────

/// Suffix appended to the stored path of sealed uploads.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Last `/`-separated segment of a path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension_of(name: &str) -> Option<String> {
    let name = name.strip_suffix(ENCRYPTED_SUFFIX).unwrap_or(name);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Coarse file category, used for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
    Text,
    Spreadsheet,
    Presentation,
    Archive,
    Audio,
    Video,
    Code,
    Unknown,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        match extension_of(name).as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "bmp" | "ico") => {
                FileKind::Image
            }
            Some("pdf" | "doc" | "docx" | "rtf" | "odt") => FileKind::Document,
            Some("txt") => FileKind::Text,
            Some("xls" | "xlsx" | "csv" | "ods") => FileKind::Spreadsheet,
            Some("ppt" | "pptx" | "odp") => FileKind::Presentation,
            Some("zip" | "rar" | "7z" | "tar" | "gz") => FileKind::Archive,
            Some("mp3" | "wav" | "ogg" | "flac") => FileKind::Audio,
            Some("mp4" | "avi" | "mov" | "mkv") => FileKind::Video,
            Some("html" | "js" | "css" | "json" | "py" | "java" | "cpp" | "cs" | "rs") => {
                FileKind::Code
            }
            _ => FileKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Document => "document",
            FileKind::Text => "text",
            FileKind::Spreadsheet => "spreadsheet",
            FileKind::Presentation => "presentation",
            FileKind::Archive => "archive",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Code => "code",
            FileKind::Unknown => "unknown",
        }
    }
}

/// Best-effort MIME type from a file name's extension.
pub fn guess_mime_type(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
