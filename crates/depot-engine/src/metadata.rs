//! Generated content: version descriptors, latest-version selection and
//! browsable directory listings. Nothing produced here is persisted.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use depot_core::constants::METADATA_FILE_NAME;
use depot_core::{ArtifactPath, DepotError, DepotResult, DirectoryEntry, MavenVersion};
use depot_storage::{Storage, StorageError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Directory names that look like versions. Artifact and group directories
/// do not start with a digit; version directories do.
pub fn is_version_directory(entry: &DirectoryEntry) -> bool {
    entry.is_directory
        && entry
            .name
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
}

/// Distinct versions in ascending order, with the newest change seen among
/// their sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    versions: Vec<MavenVersion>,
    last_updated: Option<DateTime<Utc>>,
}

impl VersionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version; the first spelling of an equal version is kept.
    pub fn insert(&mut self, version: &str) {
        let parsed = MavenVersion::parse(version);
        if !self.versions.iter().any(|v| v.as_str() == version) {
            self.versions.push(parsed);
            self.versions.sort();
        }
    }

    pub fn extend<'a>(&mut self, versions: impl IntoIterator<Item = &'a str>) {
        for version in versions {
            self.insert(version);
        }
    }

    /// Record a source modification time; the newest one wins.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if self.last_updated.map(|current| at > current).unwrap_or(true) {
            self.last_updated = Some(at);
        }
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(MavenVersion::as_str)
    }

    /// Highest version, pre-releases included.
    pub fn latest(&self) -> Option<&str> {
        self.versions.last().map(MavenVersion::as_str)
    }

    /// Highest version that is not a snapshot.
    pub fn release(&self) -> Option<&str> {
        self.versions
            .iter()
            .rev()
            .find(|v| !v.is_snapshot())
            .map(MavenVersion::as_str)
    }
}

/// Builds generated documents from one or more storages.
#[derive(Debug, Clone)]
pub struct MetadataSynthesizer {
    versions_block: Regex,
    version_element: Regex,
    last_updated: Regex,
}

impl MetadataSynthesizer {
    pub fn new() -> DepotResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                DepotError::Configuration(format!("Failed to compile descriptor pattern: {}", e))
            })
        };
        Ok(Self {
            versions_block: compile(r"(?s)<versions>(.*?)</versions>")?,
            version_element: compile(r"<version>\s*([^<\s]+)\s*</version>")?,
            last_updated: compile(r"<lastUpdated>\s*(\d{14})\s*</lastUpdated>")?,
        })
    }

    /// Fold a metadata document (stored or fetched upstream) into `versions`.
    pub fn merge_descriptor(&self, versions: &mut VersionSet, xml: &str) {
        for version in self.parse_descriptor_versions(xml) {
            versions.insert(&version);
        }
        let stamp = self
            .last_updated
            .captures(xml)
            .and_then(|c| c.get(1))
            .and_then(|m| NaiveDateTime::parse_from_str(m.as_str(), TIMESTAMP_FORMAT).ok());
        if let Some(stamp) = stamp {
            versions.touch(stamp.and_utc());
        }
    }

    /// Versions listed under `<versioning><versions>` of a metadata document.
    pub fn parse_descriptor_versions(&self, xml: &str) -> Vec<String> {
        self.versions_block
            .captures_iter(xml)
            .filter_map(|block| block.get(1))
            .flat_map(|block| {
                self.version_element
                    .captures_iter(block.as_str())
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Merge listings of `path` across `storages`, first occurrence of a name
    /// winning. Returns `None` when no storage has the directory.
    pub async fn merged_listing(
        &self,
        storages: &[Arc<dyn Storage>],
        path: &ArtifactPath,
    ) -> Result<Option<Vec<DirectoryEntry>>, StorageError> {
        let mut found = false;
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for storage in storages {
            match storage.list_directory(path).await {
                Ok(entries) => {
                    found = true;
                    for entry in entries {
                        if seen.insert(entry.name.clone()) {
                            merged.push(entry);
                        }
                    }
                }
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if !found {
            return Ok(None);
        }
        merged.sort_by(DirectoryEntry::listing_order);
        Ok(Some(merged))
    }

    /// Versions known locally for the artifact directory `path`: version
    /// directories plus versions listed by stored descriptors.
    pub async fn local_versions(
        &self,
        storages: &[Arc<dyn Storage>],
        path: &ArtifactPath,
    ) -> Result<VersionSet, StorageError> {
        let mut versions = VersionSet::new();

        if let Some(entries) = self.merged_listing(storages, path).await? {
            for entry in entries.iter().filter(|e| is_version_directory(e)) {
                versions.insert(&entry.name);
                if let Some(modified) = entry.last_modified {
                    versions.touch(modified);
                }
            }
        }

        let descriptor = path.join(METADATA_FILE_NAME).map_err(|e| {
            StorageError::InvalidKey(e.to_string())
        })?;
        for storage in storages {
            match storage.read_bytes(&descriptor).await {
                Ok(bytes) => self.merge_descriptor(&mut versions, &String::from_utf8_lossy(&bytes)),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %descriptor,
                        error = %e,
                        "Skipping unreadable stored descriptor"
                    );
                }
            }
        }

        Ok(versions)
    }

    /// Maven metadata XML for the artifact at `path`. The output depends only
    /// on the inputs, so the document and its checksum agree across requests.
    pub fn render_descriptor(&self, path: &ArtifactPath, versions: &VersionSet) -> Bytes {
        let last_updated = versions.last_updated().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let segments = path.segments();
        let (group_id, artifact_id) = match segments.split_last() {
            Some((artifact, group)) => (group.join("."), artifact.as_str()),
            None => (String::new(), ""),
        };

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<metadata>\n");
        xml.push_str(&format!("  <groupId>{}</groupId>\n", escape(&group_id)));
        xml.push_str(&format!("  <artifactId>{}</artifactId>\n", escape(artifact_id)));
        xml.push_str("  <versioning>\n");
        if let Some(latest) = versions.latest() {
            xml.push_str(&format!("    <latest>{}</latest>\n", escape(latest)));
        }
        if let Some(release) = versions.release() {
            xml.push_str(&format!("    <release>{}</release>\n", escape(release)));
        }
        xml.push_str("    <versions>\n");
        for version in versions.iter() {
            xml.push_str(&format!("      <version>{}</version>\n", escape(version)));
        }
        xml.push_str("    </versions>\n");
        xml.push_str(&format!(
            "    <lastUpdated>{}</lastUpdated>\n",
            last_updated.format(TIMESTAMP_FORMAT)
        ));
        xml.push_str("  </versioning>\n");
        xml.push_str("</metadata>\n");

        Bytes::from(xml)
    }

    /// Plain HTML index of a directory for browsers.
    pub fn render_listing_html(
        &self,
        repository: &str,
        path: &ArtifactPath,
        entries: &[DirectoryEntry],
    ) -> String {
        let title = format!("{}{}", escape(repository), escape(&display_dir(path)));
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">");
        html.push_str(&format!("<title>Index of /{}</title></head>\n<body>\n", title));
        html.push_str(&format!("<h1>Index of /{}</h1>\n<ul>\n", title));
        if !path.is_root() {
            html.push_str("  <li><a href=\"../\">../</a></li>\n");
        }
        for entry in entries {
            let suffix = if entry.is_directory { "/" } else { "" };
            let size = entry
                .size_bytes
                .map(|size| format!(" <small>{} bytes</small>", size))
                .unwrap_or_default();
            html.push_str(&format!(
                "  <li><a href=\"{name}{suffix}\">{name}{suffix}</a>{size}</li>\n",
                name = escape(&entry.name),
                suffix = suffix,
                size = size
            ));
        }
        html.push_str("</ul>\n</body>\n</html>\n");
        html
    }
}

fn display_dir(path: &ArtifactPath) -> String {
    if path.is_root() {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
