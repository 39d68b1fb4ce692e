use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::checksum::Checksums;
use crate::models::path::ArtifactPath;

/// Description of a stored (or generated) file, always derived from its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: ArtifactPath,
    pub size_bytes: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub checksums: Checksums,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: ArtifactPath,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    /// Listing order: directories before files, then by name.
    pub fn listing_order(a: &DirectoryEntry, b: &DirectoryEntry) -> std::cmp::Ordering {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Content type guessed from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jar" | "war" | "ear" => "application/java-archive",
        "pom" | "xml" => "application/xml",
        "json" | "module" => "application/json",
        "sha1" | "sha256" | "sha512" | "md5" | "asc" | "txt" => "text/plain",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "html" => "text/html",
        _ => "application/octet-stream",
    }
}
