use crate::capacity::{check_space_async, SpaceGate};
use crate::keys;
use crate::lock::{LockGuard, PathLocks};
use crate::traits::{ByteReader, ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::constants::TEMP_DIR_NAME;
use depot_core::{
    content_type_for, ArtifactPath, ChecksumAlgorithm, ChecksumState, Checksums, DirectoryEntry,
    FileEntry,
};
use futures::StreamExt;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_canonical: PathBuf,
    locks: PathLocks,
    space: Arc<dyn SpaceGate>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`.
    pub async fn new(
        base_path: impl Into<PathBuf>,
        space: Arc<dyn SpaceGate>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(base_path.join(TEMP_DIR_NAME))
            .await
            .map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    base_path.display(),
                    e
                ))
            })?;

        let base_canonical = base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        Ok(LocalStorage {
            base_path,
            base_canonical,
            locks: PathLocks::new(),
            space,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn temp_dir(&self) -> PathBuf {
        self.base_path.join(TEMP_DIR_NAME)
    }

    /// Convert an artifact path to a filesystem path with containment check
    ///
    /// `ArtifactPath` already excludes traversal segments; this additionally
    /// refuses paths that resolve outside the root through symlinks.
    fn key_to_path(&self, path: &ArtifactPath) -> StorageResult<PathBuf> {
        let fs_path = self.base_path.join(keys::relative_path(path));

        // Nearest existing ancestor decides where the path really lands.
        let mut probe = fs_path.as_path();
        loop {
            match probe.canonicalize() {
                Ok(canonical) => {
                    if canonical.strip_prefix(&self.base_canonical).is_err() {
                        return Err(StorageError::InvalidKey(format!(
                            "Path resolves outside storage directory: {}",
                            path
                        )));
                    }
                    break;
                }
                Err(_) => match probe.parent() {
                    Some(parent) if parent.starts_with(&self.base_path) => probe = parent,
                    _ => break,
                },
            }
        }

        Ok(fs_path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    async fn purge_stale_uploads(&self) -> usize {
        let Ok(mut dir) = fs::read_dir(self.temp_dir()).await else {
            return 0;
        };
        let mut removed = 0usize;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let is_temp = entry
                .file_name()
                .to_str()
                .map(keys::is_temp_file_name)
                .unwrap_or(false);
            if is_temp && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::warn!(
                root = %self.base_path.display(),
                removed,
                "Removed stale staged uploads"
            );
        }
        removed
    }

    /// Build the entry for a file whose metadata was taken from an open
    /// handle. Side-files are trusted only when not older than the content.
    async fn describe_file(
        &self,
        path: &ArtifactPath,
        fs_path: &Path,
        metadata: &Metadata,
    ) -> StorageResult<FileEntry> {
        let modified = metadata.modified().ok();
        let mut sidecar = Vec::new();
        for (algorithm, side) in keys::side_files(path) {
            let side_path = self.base_path.join(keys::relative_path(&side));
            sidecar.push((algorithm, read_side_file(&side_path, modified).await));
        }

        let checksums = match sidecar.as_slice() {
            [(ChecksumAlgorithm::Sha1, Some(sha1)), (ChecksumAlgorithm::Sha256, Some(sha256))] => {
                Checksums {
                    sha1: sha1.clone(),
                    sha256: sha256.clone(),
                }
            }
            _ => hash_file(fs_path).await?,
        };

        Ok(FileEntry {
            path: path.clone(),
            size_bytes: metadata.len(),
            content_type: content_type_for(path.file_name().unwrap_or_default()).to_string(),
            last_modified: modified.map(DateTime::<Utc>::from).unwrap_or_else(Utc::now),
            checksums,
        })
    }

    /// Stream `reader` into a fresh temp file, hashing as it goes.
    async fn stage(
        &self,
        mut reader: ByteReader,
        expected_len: Option<u64>,
    ) -> StorageResult<(TempFile, u64, Checksums)> {
        let temp = TempFile::new(self.temp_dir().join(keys::temp_file_name()));
        let mut file = fs::File::create(temp.path()).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to create temp file {}: {}",
                temp.path().display(),
                e
            ))
        })?;

        let mut state = ChecksumState::new();
        let mut written = 0u64;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buffer).await.map_err(|e| {
                StorageError::BodyInterrupted(format!("Failed to read body: {}", e))
            })?;
            if read == 0 {
                break;
            }
            state.update(&buffer[..read]);
            file.write_all(&buffer[..read]).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to write temp file {}: {}",
                    temp.path().display(),
                    e
                ))
            })?;
            written += read as u64;
        }

        file.flush().await?;
        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to sync temp file {}: {}",
                temp.path().display(),
                e
            ))
        })?;

        if let Some(expected) = expected_len {
            if expected != written {
                return Err(StorageError::BodyInterrupted(format!(
                    "Body ended after {} of {} bytes",
                    written, expected
                )));
            }
        }

        Ok((temp, written, state.finalize()))
    }

    async fn stage_bytes(&self, content: &[u8]) -> StorageResult<TempFile> {
        let temp = TempFile::new(self.temp_dir().join(keys::temp_file_name()));
        let mut file = fs::File::create(temp.path()).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        Ok(temp)
    }

    fn check_guard(&self, guard: &LockGuard, path: &ArtifactPath) -> StorageResult<()> {
        if self.locks.is_held(guard, path) {
            Ok(())
        } else {
            Err(StorageError::LockMismatch {
                held: guard.describe(),
                requested: path.to_string(),
            })
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn locks(&self) -> &PathLocks {
        &self.locks
    }

    fn describe(&self) -> String {
        self.base_path.display().to_string()
    }

    fn location(&self) -> &Path {
        &self.base_path
    }

    async fn purge_staged_uploads(&self) -> usize {
        self.purge_stale_uploads().await
    }

    async fn exists(&self, path: &ArtifactPath) -> StorageResult<bool> {
        let fs_path = self.key_to_path(path)?;
        Ok(fs::try_exists(&fs_path).await.unwrap_or(false))
    }

    async fn is_file(&self, path: &ArtifactPath) -> StorageResult<bool> {
        let fs_path = self.key_to_path(path)?;
        Ok(fs::metadata(&fs_path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false))
    }

    async fn is_directory(&self, path: &ArtifactPath) -> StorageResult<bool> {
        let fs_path = self.key_to_path(path)?;
        Ok(fs::metadata(&fs_path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false))
    }

    async fn file_entry(&self, path: &ArtifactPath) -> StorageResult<FileEntry> {
        let fs_path = self.key_to_path(path)?;
        let metadata = match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::NotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
        };
        self.describe_file(path, &fs_path, &metadata).await
    }

    async fn read_file(&self, path: &ArtifactPath) -> StorageResult<(FileEntry, ByteStream)> {
        let fs_path = self.key_to_path(path)?;
        let start = std::time::Instant::now();

        let file = match fs::File::open(&fs_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to open file {}: {}",
                    fs_path.display(),
                    e
                )))
            }
        };

        // Metadata of the opened handle, so a concurrent commit cannot mix two versions.
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let entry = self.describe_file(path, &fs_path, &metadata).await?;

        let stream = tokio_util::io::ReaderStream::new(file).map(|result| {
            result.map_err(|e| StorageError::ReadFailed(format!("Failed to read chunk: {}", e)))
        });

        let key = path.to_string();
        let path_display = fs_path.display().to_string();
        let logged_stream = stream.map(move |item| {
            if item.is_err() {
                tracing::error!(
                    path = %path_display,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream read error"
                );
            }
            item
        });

        Ok((entry, Box::pin(logged_stream)))
    }

    async fn list_directory(&self, path: &ArtifactPath) -> StorageResult<Vec<DirectoryEntry>> {
        let fs_path = if path.is_root() {
            self.base_path.clone()
        } else {
            self.key_to_path(path)?
        };

        let mut dir = match fs::read_dir(&fs_path).await {
            Ok(dir) => dir,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => {
                // Reading a regular file as a directory.
                if fs::metadata(&fs_path)
                    .await
                    .map(|meta| meta.is_file())
                    .unwrap_or(false)
                {
                    return Err(StorageError::NotFound(path.to_string()));
                }
                return Err(StorageError::ReadFailed(format!(
                    "Failed to list {}: {}",
                    fs_path.display(),
                    e
                )));
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if path.is_root() && name == TEMP_DIR_NAME {
                continue;
            }
            let Ok(child) = path.join(&name) else {
                continue;
            };
            let Ok(metadata) = item.metadata().await else {
                // Removed between read_dir and stat.
                continue;
            };
            entries.push(DirectoryEntry {
                name,
                path: child,
                is_directory: metadata.is_dir(),
                size_bytes: metadata.is_file().then(|| metadata.len()),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(DirectoryEntry::listing_order);
        Ok(entries)
    }

    async fn write_file(
        &self,
        guard: &LockGuard,
        path: &ArtifactPath,
        reader: ByteReader,
        expected_len: Option<u64>,
    ) -> StorageResult<FileEntry> {
        self.check_guard(guard, path)?;
        let fs_path = self.key_to_path(path)?;
        let start = std::time::Instant::now();

        if fs::metadata(&fs_path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(StorageError::InvalidKey(format!(
                "Path is an existing directory: {}",
                path
            )));
        }

        if let Some(expected) = expected_len {
            check_space_async(self.space.clone(), &self.base_path, expected).await?;
        }

        let (staged, size, checksums) = self.stage(reader, expected_len).await?;

        let mut sides = Vec::new();
        for (algorithm, side) in keys::side_files(path) {
            let side_fs_path = self.key_to_path(&side)?;
            let temp = self.stage_bytes(checksums.get(algorithm).as_bytes()).await?;
            sides.push((temp, side_fs_path));
        }

        // The staged bytes are already on disk; the floor must still hold.
        check_space_async(self.space.clone(), &self.base_path, 0).await?;

        self.ensure_parent_dir(&fs_path).await?;
        staged.commit(&fs_path).await?;
        for (temp, side_fs_path) in sides {
            temp.commit(&side_fs_path).await?;
        }

        let metadata = fs::metadata(&fs_path).await?;
        let entry = FileEntry {
            path: path.clone(),
            size_bytes: size,
            content_type: content_type_for(path.file_name().unwrap_or_default()).to_string(),
            last_modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
            checksums,
        };

        tracing::info!(
            path = %fs_path.display(),
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write committed"
        );

        Ok(entry)
    }

    async fn delete(&self, guard: &LockGuard, path: &ArtifactPath) -> StorageResult<bool> {
        if path.is_root() {
            return Err(StorageError::InvalidKey(
                "Refusing to delete the repository root".to_string(),
            ));
        }
        let fs_path = self.key_to_path(path)?;
        let start = std::time::Instant::now();

        let metadata = match fs::symlink_metadata(&fs_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::DeleteFailed(e.to_string())),
        };

        if metadata.is_dir() {
            if !self.locks.is_tree_held(guard) {
                return Err(StorageError::LockMismatch {
                    held: guard.describe(),
                    requested: format!("{} (directory)", path),
                });
            }
            fs::remove_dir_all(&fs_path).await.map_err(|e| {
                StorageError::DeleteFailed(format!(
                    "Failed to delete directory {}: {}",
                    fs_path.display(),
                    e
                ))
            })?;
        } else {
            self.check_guard(guard, path)?;
            fs::remove_file(&fs_path).await.map_err(|e| {
                StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    fs_path.display(),
                    e
                ))
            })?;
            for (_, side) in keys::side_files(path) {
                let side_fs_path = self.key_to_path(&side)?;
                match fs::remove_file(&side_fs_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(
                            path = %side_fs_path.display(),
                            error = %e,
                            "Failed to delete checksum side-file"
                        );
                    }
                }
            }
        }

        tracing::info!(
            path = %fs_path.display(),
            key = %path,
            directory = metadata.is_dir(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(true)
    }
}

/// Staged file removed on drop unless committed. Covers early returns and
/// cancelled uploads alike.
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn commit(mut self, destination: &Path) -> StorageResult<()> {
        fs::rename(&self.path, destination).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to move {} into place: {}",
                destination.display(),
                e
            ))
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn read_side_file(
    path: &Path,
    content_modified: Option<std::time::SystemTime>,
) -> Option<String> {
    let metadata = fs::metadata(path).await.ok()?;
    if let (Some(content), Ok(side)) = (content_modified, metadata.modified()) {
        if side < content {
            return None;
        }
    }
    let raw = fs::read_to_string(path).await.ok()?;
    let digest = raw.split_whitespace().next()?.to_ascii_lowercase();
    digest
        .chars()
        .all(|c| c.is_ascii_hexdigit())
        .then_some(digest)
}

async fn hash_file(path: &Path) -> StorageResult<Checksums> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        StorageError::ReadFailed(format!("Failed to open file {}: {}", path.display(), e))
    })?;
    let mut state = ChecksumState::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        state.update(&buffer[..read]);
    }
    Ok(state.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::UnlimitedSpace;
    use futures::StreamExt;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::tempdir;
    use tokio::io::{AsyncRead, ReadBuf};

    fn path(raw: &str) -> ArtifactPath {
        ArtifactPath::parse(raw).unwrap()
    }

    fn reader(data: &[u8]) -> ByteReader {
        Box::pin(std::io::Cursor::new(data.to_vec()))
    }

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, Arc::new(UnlimitedSpace)).await.unwrap()
    }

    async fn write(storage: &LocalStorage, raw: &str, data: &[u8]) -> FileEntry {
        let target = path(raw);
        let guard = storage.lock_file(&target).await;
        storage
            .write_file(&guard, &target, reader(data), Some(data.len() as u64))
            .await
            .unwrap()
    }

    struct FixedSpace(u64);

    impl SpaceGate for FixedSpace {
        fn check(&self, _path: &Path, required_bytes: u64) -> StorageResult<()> {
            if required_bytes > self.0 {
                return Err(StorageError::InsufficientSpace {
                    available: self.0,
                    required: required_bytes,
                });
            }
            Ok(())
        }
    }

    /// Yields some bytes, then fails like a dropped client connection.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "client went away",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    fn temp_dir_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root.join(TEMP_DIR_NAME))
            .unwrap()
            .next()
            .is_none()
    }

    #[tokio::test]
    async fn test_write_read_round_trip_with_side_files() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let entry = write(&storage, "com/example/lib/1.0/lib-1.0.jar", b"hello").await;
        assert_eq!(entry.size_bytes, 5);
        assert_eq!(entry.content_type, "application/java-archive");
        assert_eq!(entry.checksums, Checksums::of(b"hello"));

        let sha1 = std::fs::read_to_string(
            dir.path().join("com/example/lib/1.0/lib-1.0.jar.sha1"),
        )
        .unwrap();
        assert_eq!(sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert!(dir
            .path()
            .join("com/example/lib/1.0/lib-1.0.jar.sha256")
            .exists());

        let (read_entry, mut stream) = storage
            .read_file(&path("com/example/lib/1.0/lib-1.0.jar"))
            .await
            .unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(downloaded, b"hello");
        assert_eq!(read_entry.checksums, entry.checksums);
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_checksum_files_get_no_side_files() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        write(&storage, "com/example/lib/1.0/lib-1.0.jar.sha1", b"abc").await;
        assert!(!dir
            .path()
            .join("com/example/lib/1.0/lib-1.0.jar.sha1.sha1")
            .exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content_and_checksums() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        write(&storage, "a/b.jar", b"first").await;
        write(&storage, "a/b.jar", b"second version").await;

        let bytes = storage.read_bytes(&path("a/b.jar")).await.unwrap();
        assert_eq!(&bytes[..], b"second version");
        let entry = storage.file_entry(&path("a/b.jar")).await.unwrap();
        assert_eq!(entry.checksums, Checksums::of(b"second version"));
    }

    #[tokio::test]
    async fn test_stale_side_file_is_recomputed() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        write(&storage, "a/b.jar", b"hello").await;

        std::fs::remove_file(dir.path().join("a/b.jar.sha256")).unwrap();
        let entry = storage.file_entry(&path("a/b.jar")).await.unwrap();
        assert_eq!(entry.checksums, Checksums::of(b"hello"));
    }

    #[tokio::test]
    async fn test_write_requires_matching_lock() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let guard = storage.lock_file(&path("a/other.jar")).await;
        let result = storage
            .write_file(&guard, &path("a/b.jar"), reader(b"x"), None)
            .await;
        assert!(matches!(result, Err(StorageError::LockMismatch { .. })));
    }

    #[tokio::test]
    async fn test_interrupted_upload_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        write(&storage, "a/b.jar", b"old").await;

        let target = path("a/b.jar");
        let guard = storage.lock_file(&target).await;
        let result = storage
            .write_file(
                &guard,
                &target,
                Box::pin(BrokenReader { sent: false }),
                None,
            )
            .await;
        assert!(matches!(result, Err(StorageError::BodyInterrupted(_))));
        drop(guard);

        assert_eq!(&storage.read_bytes(&target).await.unwrap()[..], b"old");
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_short_body_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let target = path("a/b.jar");
        let guard = storage.lock_file(&target).await;
        let result = storage
            .write_file(&guard, &target, reader(b"abc"), Some(10))
            .await;
        assert!(matches!(result, Err(StorageError::BodyInterrupted(_))));
        assert!(!storage.exists(&target).await.unwrap());
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_insufficient_space_aborts_before_commit() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), Arc::new(FixedSpace(4)))
            .await
            .unwrap();

        let target = path("a/b.jar");
        let guard = storage.lock_file(&target).await;
        let result = storage
            .write_file(&guard, &target, reader(b"too large"), Some(9))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::InsufficientSpace {
                available: 4,
                required: 9
            })
        ));
        assert!(!storage.exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        write(&storage, "com/example/lib/1.0/lib-1.0.jar.sha1", b"x").await;
        write(&storage, "com/example/lib/2.0/lib-2.0.jar.sha1", b"x").await;
        write(&storage, "com/example/lib/notes.txt", b"notes").await;

        let entries = storage
            .list_directory(&path("com/example/lib"))
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["1.0", "2.0", "notes.txt"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[2].size_bytes, Some(5));
        assert_eq!(entries[2].path, path("com/example/lib/notes.txt"));

        let root = storage.list_directory(&ArtifactPath::root()).await.unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["com"]);
    }

    #[tokio::test]
    async fn test_list_directory_empty_missing_and_file() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        write(&storage, "a/b.txt", b"x").await;

        assert!(storage
            .list_directory(&path("empty"))
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            storage.list_directory(&path("missing")).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.list_directory(&path("a/b.txt")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_file_and_directory() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        write(&storage, "a/1.0/b.jar", b"x").await;
        write(&storage, "a/2.0/b.jar", b"y").await;

        let target = path("a/1.0/b.jar");
        let guard = storage.lock_file(&target).await;
        assert!(storage.delete(&guard, &target).await.unwrap());
        assert!(!storage.exists(&target).await.unwrap());
        assert!(!storage.exists(&path("a/1.0/b.jar.sha1")).await.unwrap());
        assert!(!storage.delete(&guard, &target).await.unwrap());
        drop(guard);

        // Directory deletes need the tree lock.
        let directory = path("a/2.0");
        let file_guard = storage.lock_file(&directory).await;
        assert!(matches!(
            storage.delete(&file_guard, &directory).await,
            Err(StorageError::LockMismatch { .. })
        ));
        drop(file_guard);

        let tree = storage.lock_tree().await;
        assert!(storage.delete(&tree, &directory).await.unwrap());
        assert!(!storage.exists(&path("a/2.0/b.jar")).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_uploads_purged_on_request() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(TEMP_DIR_NAME)).unwrap();
        std::fs::write(dir.path().join(TEMP_DIR_NAME).join("leftover.part"), b"x").unwrap();

        // Opening a root never touches staged uploads: another instance on
        // the same root may still be writing them.
        let storage = storage(dir.path()).await;
        assert!(!temp_dir_is_empty(dir.path()));

        assert_eq!(storage.purge_staged_uploads().await, 1);
        assert!(temp_dir_is_empty(dir.path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let storage = storage(dir.path()).await;
        let result = storage.read_file(&path("link/secret.txt")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        assert!(matches!(
            storage.read_file(&path("nope.jar")).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.is_file(&path("nope.jar")).await.unwrap());
    }
}
