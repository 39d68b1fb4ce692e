use crate::capacity::SpaceGate;
use crate::{LocalStorage, Storage, StorageError, StorageResult};
use depot_core::{Config, RepositoryConfig};
use std::sync::Arc;

/// Create the storage backend owning `repository`'s root directory.
pub async fn create_storage(
    config: &Config,
    repository: &RepositoryConfig,
    space: Arc<dyn SpaceGate>,
) -> StorageResult<Arc<dyn Storage>> {
    if !repository.has_storage() {
        return Err(StorageError::ConfigError(format!(
            "Repository '{}' is a {} repository and owns no storage",
            repository.name, repository.kind
        )));
    }

    let root = config.repository_root(repository);
    let storage = LocalStorage::new(&root, space).await?;

    tracing::debug!(
        repository = %repository.name,
        root = %root.display(),
        "Storage initialized"
    );

    Ok(Arc::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::UnlimitedSpace;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_storage_per_repository_root() {
        let dir = tempdir().unwrap();
        let config = Config {
            storage_path: dir.path().to_path_buf(),
            ..Config::default()
        };

        let storage = create_storage(
            &config,
            &RepositoryConfig::hosted("releases"),
            Arc::new(UnlimitedSpace),
        )
        .await
        .unwrap();
        assert!(storage.describe().ends_with("releases"));
        assert!(dir.path().join("releases").is_dir());

        let group = RepositoryConfig::group("public", vec!["releases".to_string()]);
        assert!(matches!(
            create_storage(&config, &group, Arc::new(UnlimitedSpace)).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
