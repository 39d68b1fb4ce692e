//! Write side: validated, locked, atomic uploads.

use depot_core::{
    is_snapshot, AccessChecker, ArtifactPath, CallerIdentity, Capability, ChecksumAlgorithm,
    DepotError, DepotResult, EventNotifier, FileEntry, PathClassification, RepositoryEvent,
};
use depot_storage::{keys, ByteReader, Storage, StorageError};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;

use crate::access::authorize;
use crate::registry::RegistryHandle;

/// Uploaded checksum files are a digest plus an optional file name.
const MAX_CHECKSUM_UPLOAD_BYTES: u64 = 1024;

pub struct DeployRequest {
    pub repository: String,
    pub path: String,
    pub identity: Option<CallerIdentity>,
    /// Consumed exactly once, to completion or failure.
    pub body: ByteReader,
    /// Declared size, used for the early space check and truncation detection.
    pub content_length: Option<u64>,
}

impl fmt::Debug for DeployRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployRequest")
            .field("repository", &self.repository)
            .field("path", &self.path)
            .field("identity", &self.identity)
            .field("content_length", &self.content_length)
            .finish()
    }
}

pub struct Deployer {
    registry: Arc<RegistryHandle>,
    access: Arc<dyn AccessChecker>,
    notifier: Arc<dyn EventNotifier>,
}

impl Deployer {
    pub fn new(
        registry: Arc<RegistryHandle>,
        access: Arc<dyn AccessChecker>,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            registry,
            access,
            notifier,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            repository = %request.repository,
            path = %request.path,
            content_length = ?request.content_length
        )
    )]
    pub async fn deploy(&self, request: DeployRequest) -> DepotResult<FileEntry> {
        let started = Instant::now();
        let registry = self.registry.snapshot();
        let repository = registry.resolve(&request.repository)?;
        let storage = repository.write_target()?.clone();
        authorize(
            self.access.as_ref(),
            &repository,
            request.identity.as_ref(),
            Capability::Write,
        )
        .await?;

        let (path, is_descriptor) = match PathClassification::classify(&request.path)? {
            PathClassification::File { path, descriptor } => (path, descriptor.is_some()),
            PathClassification::Directory(path) => {
                return Err(DepotError::Validation(format!(
                    "Cannot deploy to directory {}/",
                    path
                )))
            }
            PathClassification::Latest(_) => {
                return Err(DepotError::Validation(
                    "Cannot deploy to a latest-version marker".to_string(),
                ))
            }
        };

        let guard = storage.lock_file(&path).await;

        if storage.is_directory(&path).await? {
            return Err(DepotError::Validation(format!(
                "{} is a directory",
                path
            )));
        }

        let (body, content_length) =
            verify_checksum_upload(storage.as_ref(), &path, request.body, request.content_length)
                .await?;

        if !repository.config().redeploy
            && !is_descriptor
            && !keys::is_integrity_file(&path)
            && !is_snapshot_path(&path)
            && storage.is_file(&path).await?
        {
            return Err(DepotError::Validation(format!(
                "{} already exists and '{}' does not allow redeploying releases",
                path,
                repository.name()
            )));
        }

        let entry = storage
            .write_file(&guard, &path, body, content_length)
            .await?;
        drop(guard);

        tracing::info!(
            repository = %repository.name(),
            path = %entry.path,
            size_bytes = entry.size_bytes,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Deploy committed"
        );

        self.notifier.notify(RepositoryEvent::Deployed {
            repository: repository.name().to_string(),
            entry: entry.clone(),
        });

        Ok(entry)
    }
}

/// A checksum uploaded next to an existing file must match that file. The
/// (small) body is buffered for the comparison and handed back for storage.
async fn verify_checksum_upload(
    storage: &dyn Storage,
    path: &ArtifactPath,
    body: ByteReader,
    content_length: Option<u64>,
) -> DepotResult<(ByteReader, Option<u64>)> {
    let Some((base_name, algorithm)) = path
        .file_name()
        .and_then(ChecksumAlgorithm::split_file_name)
    else {
        return Ok((body, content_length));
    };
    let base = path.parent().unwrap_or_default().join(base_name)?;

    let existing = match storage.file_entry(&base).await {
        Ok(entry) => entry,
        Err(StorageError::NotFound(_)) => return Ok((body, content_length)),
        Err(e) => return Err(e.into()),
    };

    let mut uploaded = Vec::new();
    body.take(MAX_CHECKSUM_UPLOAD_BYTES + 1)
        .read_to_end(&mut uploaded)
        .await
        .map_err(|e| DepotError::Validation(format!("Upload interrupted: {}", e)))?;
    if uploaded.len() as u64 > MAX_CHECKSUM_UPLOAD_BYTES {
        return Err(DepotError::Validation(format!(
            "Checksum file {} is larger than {} bytes",
            path, MAX_CHECKSUM_UPLOAD_BYTES
        )));
    }

    let text = String::from_utf8_lossy(&uploaded);
    if !existing.checksums.matches_upload(algorithm, &text) {
        tracing::warn!(
            path = %path,
            expected = %existing.checksums.get(algorithm),
            "Checksum upload does not match stored artifact"
        );
        return Err(DepotError::Validation(format!(
            "{} does not match the stored {}",
            path, base
        )));
    }

    let len = uploaded.len() as u64;
    Ok((Box::pin(Cursor::new(uploaded)), Some(len)))
}

/// True when the file lives under a `-SNAPSHOT` version directory.
fn is_snapshot_path(path: &ArtifactPath) -> bool {
    path.parent()
        .and_then(|parent| parent.file_name().map(is_snapshot))
        .unwrap_or(false)
}
