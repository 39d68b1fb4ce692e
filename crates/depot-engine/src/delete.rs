//! Removal of files and whole directories.
//!
//! Files are removed under their path lock. Directories take the repository
//! tree lock, which waits for every in-flight file operation and blocks new
//! ones, so a deploy into the subtree either lands before the removal or
//! after it, never half way.

use depot_core::{
    AccessChecker, ArtifactPath, CallerIdentity, Capability, DepotError, DepotResult,
    DirectoryEntry, EventNotifier, FileEntry, PathClassification, RepositoryEvent,
    RepositoryKind,
};
use depot_storage::StorageError;
use std::sync::Arc;

use crate::access::authorize;
use crate::registry::RegistryHandle;

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub repository: String,
    pub path: String,
    pub identity: Option<CallerIdentity>,
}

/// The item that existed before removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removed {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl Removed {
    pub fn path(&self) -> &ArtifactPath {
        match self {
            Removed::File(entry) => &entry.path,
            Removed::Directory(entry) => &entry.path,
        }
    }
}

pub struct Deleter {
    registry: Arc<RegistryHandle>,
    access: Arc<dyn AccessChecker>,
    notifier: Arc<dyn EventNotifier>,
}

impl Deleter {
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
        fields(repository = %request.repository, path = %request.path)
    )]
    pub async fn delete(&self, request: DeleteRequest) -> DepotResult<Removed> {
        let registry = self.registry.snapshot();
        let repository = registry.resolve(&request.repository)?;
        if repository.kind() == RepositoryKind::Group {
            return Err(DepotError::WriteDisabled(format!(
                "Group repository '{}' does not support deletes",
                repository.name()
            )));
        }
        let storage = repository.storage().cloned().ok_or_else(|| {
            DepotError::Configuration(format!("Repository '{}' has no storage", repository.name()))
        })?;
        authorize(
            self.access.as_ref(),
            &repository,
            request.identity.as_ref(),
            Capability::Write,
        )
        .await?;

        let path = match PathClassification::classify(&request.path)? {
            PathClassification::File { path, .. } | PathClassification::Directory(path) => path,
            PathClassification::Latest(_) => {
                return Err(DepotError::Validation(
                    "Cannot delete a latest-version marker".to_string(),
                ))
            }
        };

        let removed = if storage.is_directory(&path).await? {
            let guard = storage.lock_tree().await;
            if !storage.delete(&guard, &path).await? {
                return Err(DepotError::NotFound(format!("{} not found", path)));
            }
            Removed::Directory(DirectoryEntry {
                name: path.file_name().unwrap_or_default().to_string(),
                path: path.clone(),
                is_directory: true,
                size_bytes: None,
                last_modified: None,
            })
        } else {
            let guard = storage.lock_file(&path).await;
            let entry = match storage.file_entry(&path).await {
                Ok(entry) => entry,
                Err(StorageError::NotFound(_)) => {
                    return Err(DepotError::NotFound(format!("{} not found", path)))
                }
                Err(e) => return Err(e.into()),
            };
            if !storage.delete(&guard, &path).await? {
                return Err(DepotError::NotFound(format!("{} not found", path)));
            }
            Removed::File(entry)
        };

        self.notifier.notify(RepositoryEvent::Deleted {
            repository: repository.name().to_string(),
            path,
        });

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Repository, RepositoryRegistry};
    use depot_core::{AllowAllAccess, Checksums, RepositoryConfig, TracingNotifier};
    use depot_storage::{LocalStorage, Storage, UnlimitedSpace};
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<dyn Storage>, Deleter) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(dir.path().join("releases"), Arc::new(UnlimitedSpace))
                .await
                .unwrap(),
        );
        let registry = RepositoryRegistry::build(vec![
            Repository::new(RepositoryConfig::hosted("releases"), Some(storage.clone()), vec![])
                .unwrap(),
            Repository::new(
                RepositoryConfig::group("all", vec!["releases".to_string()]),
                None,
                vec![],
            )
            .unwrap(),
        ])
        .unwrap();
        let deleter = Deleter::new(
            Arc::new(RegistryHandle::new(registry)),
            Arc::new(AllowAllAccess),
            Arc::new(TracingNotifier),
        );
        (dir, storage, deleter)
    }

    async fn put(storage: &Arc<dyn Storage>, raw: &str, content: &str) {
        let path = ArtifactPath::parse(raw).unwrap();
        let guard = storage.lock_file(&path).await;
        storage
            .write_file(&guard, &path, Box::pin(Cursor::new(content.as_bytes().to_vec())), None)
            .await
            .unwrap();
    }

    fn request(repository: &str, path: &str) -> DeleteRequest {
        DeleteRequest {
            repository: repository.to_string(),
            path: path.to_string(),
            identity: Some(CallerIdentity::new("admin")),
        }
    }

    #[tokio::test]
    async fn test_delete_file_returns_previous_entry() {
        let (_dir, storage, deleter) = setup().await;
        put(&storage, "lib/1.0/lib.jar", "bytes").await;

        let removed = deleter.delete(request("releases", "lib/1.0/lib.jar")).await.unwrap();
        match removed {
            Removed::File(entry) => assert_eq!(entry.checksums, Checksums::of(b"bytes")),
            other => panic!("expected a file, got {:?}", other),
        }
        assert!(!storage.exists(&ArtifactPath::parse("lib/1.0/lib.jar.sha1").unwrap()).await.unwrap());

        assert!(matches!(
            deleter.delete(request("releases", "lib/1.0/lib.jar")).await,
            Err(DepotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_directory_subtree() {
        let (_dir, storage, deleter) = setup().await;
        put(&storage, "lib/1.0/lib.jar", "a").await;
        put(&storage, "lib/2.0/lib.jar", "b").await;

        let removed = deleter.delete(request("releases", "lib/")).await.unwrap();
        assert_eq!(removed.path().as_key(), "lib");
        assert!(matches!(removed, Removed::Directory(_)));
        assert!(!storage.exists(&ArtifactPath::parse("lib").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_rejections() {
        let (_dir, storage, deleter) = setup().await;
        put(&storage, "lib/1.0/lib.jar", "a").await;

        assert!(matches!(
            deleter.delete(request("all", "lib/1.0/lib.jar")).await,
            Err(DepotError::WriteDisabled(_))
        ));
        assert!(matches!(
            deleter.delete(request("releases", "lib/@latest")).await,
            Err(DepotError::Validation(_))
        ));
        let mut anonymous = request("releases", "lib/1.0/lib.jar");
        anonymous.identity = None;
        assert!(matches!(
            deleter.delete(anonymous).await,
            Err(DepotError::AccessDenied(_))
        ));
        assert!(storage.is_file(&ArtifactPath::parse("lib/1.0/lib.jar").unwrap()).await.unwrap());
    }
}
