//! Checksum algorithms used for integrity side-files.

use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Sha256];

    /// Side-file extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => ".sha1",
            ChecksumAlgorithm::Sha256 => ".sha256",
        }
    }

    /// Split `lib-1.0.jar.sha1` into (`lib-1.0.jar`, Sha1).
    pub fn split_file_name(file_name: &str) -> Option<(&str, ChecksumAlgorithm)> {
        Self::ALL.iter().find_map(|algorithm| {
            file_name
                .strip_suffix(algorithm.extension())
                .filter(|base| !base.is_empty())
                .map(|base| (base, *algorithm))
        })
    }

    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

/// Lowercase hex digests of one file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checksums {
    pub sha1: String,
    pub sha256: String,
}

impl Checksums {
    pub fn of(data: &[u8]) -> Self {
        let mut state = ChecksumState::new();
        state.update(data);
        state.finalize()
    }

    pub fn get(&self, algorithm: ChecksumAlgorithm) -> &str {
        match algorithm {
            ChecksumAlgorithm::Sha1 => &self.sha1,
            ChecksumAlgorithm::Sha256 => &self.sha256,
        }
    }

    /// Compare against the content of an uploaded checksum file. Tools write
    /// either the bare digest or `digest  filename`; only the first token counts.
    pub fn matches_upload(&self, algorithm: ChecksumAlgorithm, uploaded: &str) -> bool {
        uploaded
            .split_whitespace()
            .next()
            .map(|token| token.eq_ignore_ascii_case(self.get(algorithm)))
            .unwrap_or(false)
    }
}

/// Incremental hashing state fed while a body is streamed to disk.
#[derive(Clone, Default)]
pub struct ChecksumState {
    sha1: Sha1,
    sha256: Sha256,
}

impl ChecksumState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.sha1.update(chunk);
        self.sha256.update(chunk);
    }

    pub fn finalize(self) -> Checksums {
        Checksums {
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
        }
    }
}
