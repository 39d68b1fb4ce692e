//! On-disk naming shared by storage backends.
//!
//! Artifact paths map segment by segment onto the repository root. Staged
//! uploads live in `<root>/.depot-tmp/<uuid>.part`.

use depot_core::{ArtifactPath, ChecksumAlgorithm};
use std::path::PathBuf;
use uuid::Uuid;

const TEMP_SUFFIX: &str = ".part";

/// Extensions of files that are themselves integrity data and get no side-files.
const INTEGRITY_EXTENSIONS: [&str; 5] = [".sha1", ".sha256", ".sha512", ".md5", ".asc"];

pub fn relative_path(path: &ArtifactPath) -> PathBuf {
    path.segments().iter().collect()
}

pub fn temp_file_name() -> String {
    format!("{}{}", Uuid::new_v4(), TEMP_SUFFIX)
}

pub fn is_temp_file_name(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

pub fn is_integrity_file(path: &ArtifactPath) -> bool {
    path.file_name()
        .map(|name| {
            let lower = name.to_ascii_lowercase();
            INTEGRITY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .unwrap_or(false)
}

/// Lock key of `path`. A checksum side-file shares the key of the file it
/// describes, so its upload is ordered against commits of that file.
pub fn lock_key(path: &ArtifactPath) -> ArtifactPath {
    path.file_name()
        .and_then(ChecksumAlgorithm::split_file_name)
        .and_then(|(base, _)| path.parent().unwrap_or_default().join(base).ok())
        .unwrap_or_else(|| path.clone())
}

/// Checksum side-files written next to `path`, empty for integrity files.
pub fn side_files(path: &ArtifactPath) -> Vec<(ChecksumAlgorithm, ArtifactPath)> {
    if is_integrity_file(path) {
        return Vec::new();
    }
    ChecksumAlgorithm::ALL
        .iter()
        .filter_map(|algorithm| {
            path.with_suffix(algorithm.extension())
                .map(|side| (*algorithm, side))
        })
        .collect()
}
