//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use depot_core::{ArtifactPath, DepotError, DirectoryEntry, FileEntry};
use futures::{Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::lock::{LockGuard, PathLocks};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Insufficient space: {available} bytes available, {required} bytes required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The inbound body ended early or errored; nothing was committed.
    #[error("Body interrupted: {0}")]
    BodyInterrupted(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Lock held for '{held}' does not cover '{requested}'")]
    LockMismatch { held: String, requested: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked file content as served to readers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Inbound body consumed by `write_file`.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

impl From<StorageError> for DepotError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => DepotError::NotFound(msg),
            StorageError::InvalidKey(msg) => DepotError::InvalidPath(msg),
            StorageError::InsufficientSpace {
                available,
                required,
            } => DepotError::InsufficientSpace {
                available,
                required,
            },
            StorageError::IoError(err) => DepotError::from(err),
            StorageError::ConfigError(msg) => DepotError::Configuration(msg),
            StorageError::BodyInterrupted(msg) => DepotError::Validation(msg),
            other => DepotError::io(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// One instance serves exactly one repository root. Reads are never locked;
/// every mutation requires a `LockGuard` obtained from the same instance, so
/// an operation that already holds the lock (deploy, proxy fetch-and-store)
/// passes it down instead of acquiring it again.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Lock registry scoped to this repository.
    fn locks(&self) -> &PathLocks;

    /// Human readable location of the root, for logs.
    fn describe(&self) -> String;

    /// Root directory; two instances with the same location share one tree.
    fn location(&self) -> &Path;

    /// Remove staged uploads left by an earlier process. Only safe before
    /// any write has started on this root. Returns the number removed.
    async fn purge_staged_uploads(&self) -> usize;

    /// True if a file or directory exists at `path`.
    async fn exists(&self, path: &ArtifactPath) -> StorageResult<bool>;

    async fn is_file(&self, path: &ArtifactPath) -> StorageResult<bool>;

    async fn is_directory(&self, path: &ArtifactPath) -> StorageResult<bool>;

    /// Metadata of a stored file without opening its content.
    async fn file_entry(&self, path: &ArtifactPath) -> StorageResult<FileEntry>;

    /// Open a stored file for streaming.
    async fn read_file(&self, path: &ArtifactPath) -> StorageResult<(FileEntry, ByteStream)>;

    /// Entries of a directory, directories first, then by name. An existing
    /// empty directory yields an empty list; a missing one is `NotFound`.
    async fn list_directory(&self, path: &ArtifactPath) -> StorageResult<Vec<DirectoryEntry>>;

    /// Atomically replace the file at `path` with the content of `reader`.
    /// Checksum side-files are committed together with the content.
    async fn write_file(
        &self,
        guard: &LockGuard,
        path: &ArtifactPath,
        reader: ByteReader,
        expected_len: Option<u64>,
    ) -> StorageResult<FileEntry>;

    /// Remove a file (with its side-files) or, under a tree lock, a whole
    /// directory. Returns false when nothing existed.
    async fn delete(&self, guard: &LockGuard, path: &ArtifactPath) -> StorageResult<bool>;

    /// Exclusive lock for writing or deleting one file.
    async fn lock_file(&self, path: &ArtifactPath) -> LockGuard {
        self.locks().lock_file(path).await
    }

    /// Exclusive lock over the whole repository (directory deletes).
    async fn lock_tree(&self) -> LockGuard {
        self.locks().lock_tree().await
    }

    /// Read a small file fully into memory.
    async fn read_bytes(&self, path: &ArtifactPath) -> StorageResult<Bytes> {
        let (entry, mut stream) = self.read_file(path).await?;
        let mut buffer = BytesMut::with_capacity(entry.size_bytes as usize);
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}
