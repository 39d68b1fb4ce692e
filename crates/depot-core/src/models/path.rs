//! Artifact path classification.
//!
//! Every inbound path is normalized here before it can reach a storage
//! provider. A normalized `ArtifactPath` never contains `.`/`..` segments,
//! empty segments, control characters or the reserved temp directory, so it
//! can be joined onto a repository root without escaping it.

use serde::{Serialize, Serializer};
use std::fmt;

use crate::constants::{LATEST_MARKER, METADATA_FILE_NAME, TEMP_DIR_NAME};
use crate::error::{DepotError, DepotResult};
use crate::models::checksum::ChecksumAlgorithm;

/// Normalized, slash-separated artifact coordinate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ArtifactPath {
    segments: Vec<String>,
}

impl ArtifactPath {
    /// The repository root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a raw path. Leading or trailing separators are
    /// tolerated only as a single trailing slash; everything else that is not
    /// a plain segment is rejected.
    pub fn parse(raw: &str) -> DepotResult<Self> {
        if raw.is_empty() {
            return Err(DepotError::InvalidPath("Path must not be empty".to_string()));
        }
        if raw.chars().any(char::is_control) {
            return Err(DepotError::InvalidPath(
                "Path contains control characters".to_string(),
            ));
        }

        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(DepotError::InvalidPath(format!(
                "Absolute paths are not allowed: {}",
                raw
            )));
        }

        let trimmed = unified.strip_suffix('/').unwrap_or(&unified);
        if trimmed.is_empty() {
            return Err(DepotError::InvalidPath("Path must not be empty".to_string()));
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment, raw)?;
            segments.push(segment.to_string());
        }

        if segments.first().map(String::as_str) == Some(TEMP_DIR_NAME) {
            return Err(DepotError::InvalidPath(format!(
                "Reserved path segment: {}",
                TEMP_DIR_NAME
            )));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ArtifactPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a single already-validated segment (e.g. a name from a listing).
    pub fn join(&self, segment: &str) -> DepotResult<ArtifactPath> {
        validate_segment(segment, segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Sibling file with `suffix` appended to the file name (`x.jar` -> `x.jar.sha1`).
    pub fn with_suffix(&self, suffix: &str) -> Option<ArtifactPath> {
        let name = self.file_name()?;
        let mut segments = self.segments.clone();
        let last = segments.len() - 1;
        segments[last] = format!("{}{}", name, suffix);
        Some(Self { segments })
    }

    pub fn starts_with(&self, prefix: &ArtifactPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Joined representation without leading or trailing slash; empty for the root.
    pub fn as_key(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl Serialize for ArtifactPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn validate_segment(segment: &str, raw: &str) -> DepotResult<()> {
    match segment {
        "" => Err(DepotError::InvalidPath(format!(
            "Path contains an empty segment: {}",
            raw
        ))),
        "." | ".." => Err(DepotError::InvalidPath(format!(
            "Path traversal is not allowed: {}",
            raw
        ))),
        s if s.contains('/') || s.contains('\\') || s.chars().any(char::is_control) => Err(
            DepotError::InvalidPath(format!("Invalid path segment: {}", s)),
        ),
        _ => Ok(()),
    }
}

/// Tag on a file request whose content is generated rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataDescriptor {
    /// Set when the request is for a checksum of the descriptor.
    pub checksum: Option<ChecksumAlgorithm>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClassification {
    File {
        path: ArtifactPath,
        descriptor: Option<MetadataDescriptor>,
    },
    Directory(ArtifactPath),
    /// Directory of an artifact whose highest version is requested.
    Latest(ArtifactPath),
}

impl PathClassification {
    /// Classify a raw request path. A trailing slash marks a directory, a
    /// trailing `@latest` segment a latest-version lookup; anything else is a
    /// file request (the engine still falls back to a directory listing when
    /// no file matches exactly).
    pub fn classify(raw: &str) -> DepotResult<Self> {
        let is_directory = raw.ends_with('/') || raw.ends_with('\\');
        let path = ArtifactPath::parse(raw)?;

        if path.file_name() == Some(LATEST_MARKER) {
            if is_directory {
                return Err(DepotError::InvalidPath(format!(
                    "{} must be the final segment",
                    LATEST_MARKER
                )));
            }
            let directory = path.parent().unwrap_or_default();
            return Ok(PathClassification::Latest(directory));
        }

        if is_directory {
            return Ok(PathClassification::Directory(path));
        }

        let descriptor = path.file_name().and_then(descriptor_tag);
        Ok(PathClassification::File { path, descriptor })
    }

    pub fn path(&self) -> &ArtifactPath {
        match self {
            PathClassification::File { path, .. } => path,
            PathClassification::Directory(path) => path,
            PathClassification::Latest(path) => path,
        }
    }
}

fn descriptor_tag(file_name: &str) -> Option<MetadataDescriptor> {
    if file_name == METADATA_FILE_NAME {
        return Some(MetadataDescriptor { checksum: None });
    }
    let (base, algorithm) = ChecksumAlgorithm::split_file_name(file_name)?;
    (base == METADATA_FILE_NAME).then_some(MetadataDescriptor {
        checksum: Some(algorithm),
    })
}
