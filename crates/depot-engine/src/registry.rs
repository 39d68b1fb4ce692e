//! Repository model.
//!
//! A `RepositoryRegistry` is built once from configuration and never mutated.
//! Group membership is resolved and flattened at build time, so unknown
//! members and cycles are configuration errors rather than request-time
//! surprises. `RegistryHandle` publishes the current registry and swaps it as
//! a whole.

use depot_core::{
    Config, DepotError, DepotResult, RepositoryConfig, RepositoryKind, Visibility,
};
use depot_storage::{create_storage, SpaceGate, Storage};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::proxy::{ProxyClient, RemoteDescriptor};

/// A configured repository with its live collaborators.
pub struct Repository {
    config: RepositoryConfig,
    storage: Option<Arc<dyn Storage>>,
    proxy: Option<ProxyClient>,
}

impl Repository {
    /// Assemble a repository. Hosted and proxy repositories need a storage;
    /// groups must not have one.
    pub fn new(
        config: RepositoryConfig,
        storage: Option<Arc<dyn Storage>>,
        remotes: Vec<RemoteDescriptor>,
    ) -> DepotResult<Self> {
        if config.has_storage() != storage.is_some() {
            return Err(DepotError::Configuration(format!(
                "Repository '{}' of kind {} {} a storage",
                config.name,
                config.kind,
                if config.has_storage() { "requires" } else { "cannot have" }
            )));
        }

        let proxy = match config.kind {
            RepositoryKind::Proxy => {
                if remotes.is_empty() {
                    return Err(DepotError::Configuration(format!(
                        "Proxy repository '{}' has no remotes",
                        config.name
                    )));
                }
                Some(ProxyClient::new(remotes)?)
            }
            _ => None,
        };

        Ok(Self {
            config,
            storage,
            proxy,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> RepositoryKind {
        self.config.kind
    }

    pub fn visibility(&self) -> Visibility {
        self.config.visibility
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    pub fn proxy(&self) -> Option<&ProxyClient> {
        self.proxy.as_ref()
    }

    /// Storage for direct writes, or why there is none.
    pub fn write_target(&self) -> DepotResult<&Arc<dyn Storage>> {
        match self.config.kind {
            RepositoryKind::Group => Err(DepotError::WriteDisabled(format!(
                "Group repository '{}' is not a write target",
                self.config.name
            ))),
            RepositoryKind::Proxy if !self.config.accept_deploys => {
                Err(DepotError::WriteDisabled(format!(
                    "Proxy repository '{}' does not accept deploys",
                    self.config.name
                )))
            }
            _ => self.storage.as_ref().ok_or_else(|| {
                DepotError::Configuration(format!(
                    "Repository '{}' has no storage",
                    self.config.name
                ))
            }),
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.config.name)
            .field("kind", &self.config.kind)
            .field("visibility", &self.config.visibility)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Immutable lookup table `name -> Repository`.
#[derive(Debug)]
pub struct RepositoryRegistry {
    repositories: HashMap<String, Arc<Repository>>,
    /// Storage-owning repositories that contribute to each name, in lookup order.
    contributors: HashMap<String, Vec<Arc<Repository>>>,
}

impl RepositoryRegistry {
    /// Validate and index `repositories`. Fails on duplicate names, unknown
    /// group members and membership cycles.
    pub fn build(repositories: Vec<Repository>) -> DepotResult<Self> {
        let mut by_name = HashMap::new();
        for repository in repositories {
            let name = repository.name().to_string();
            if by_name.insert(name.clone(), Arc::new(repository)).is_some() {
                return Err(DepotError::Configuration(format!(
                    "Duplicate repository name '{}'",
                    name
                )));
            }
        }

        let mut contributors = HashMap::new();
        let mut visits = HashMap::new();
        let mut names: Vec<&String> = by_name.keys().collect();
        names.sort();
        for name in names {
            let mut flattened = Vec::new();
            let mut seen = HashSet::new();
            flatten(&by_name, name, &mut visits, &mut flattened, &mut seen)?;
            contributors.insert(name.clone(), flattened);
        }

        Ok(Self {
            repositories: by_name,
            contributors,
        })
    }

    /// Build every configured repository at process start, creating storage
    /// roots on disk and clearing uploads staged by an earlier process.
    pub async fn from_config(config: &Config, space: Arc<dyn SpaceGate>) -> DepotResult<Self> {
        let registry = Self::assemble(config, space, None).await?;
        for repository in registry.repositories.values() {
            if let Some(storage) = repository.storage() {
                storage.purge_staged_uploads().await;
            }
        }
        Ok(registry)
    }

    /// Build a replacement for `previous`. Roots already open in `previous`
    /// keep their storage instance, so writers in both snapshots share one
    /// lock registry and no staged upload is touched.
    pub async fn reload_from(
        config: &Config,
        space: Arc<dyn SpaceGate>,
        previous: &RepositoryRegistry,
    ) -> DepotResult<Self> {
        Self::assemble(config, space, Some(previous)).await
    }

    async fn assemble(
        config: &Config,
        space: Arc<dyn SpaceGate>,
        previous: Option<&RepositoryRegistry>,
    ) -> DepotResult<Self> {
        let mut repositories = Vec::with_capacity(config.repositories.len());
        for repository in &config.repositories {
            let storage = if repository.has_storage() {
                let root = config.repository_root(repository);
                match previous.and_then(|registry| registry.storage_at(&root)) {
                    Some(open) => Some(open),
                    None => Some(create_storage(config, repository, space.clone()).await?),
                }
            } else {
                None
            };
            let remotes = repository
                .remotes
                .iter()
                .map(|remote| {
                    RemoteDescriptor::from_config(
                        remote,
                        Some(config.default_connect_timeout_secs),
                        Some(config.default_read_timeout_secs),
                    )
                })
                .collect();
            repositories.push(Repository::new(repository.clone(), storage, remotes)?);
        }

        let registry = Self::build(repositories)?;
        tracing::info!(
            repositories = registry.repositories.len(),
            reused_roots = previous.is_some(),
            "Repository registry built"
        );
        Ok(registry)
    }

    fn storage_at(&self, root: &Path) -> Option<Arc<dyn Storage>> {
        self.repositories
            .values()
            .filter_map(|repository| repository.storage())
            .find(|storage| storage.location() == root)
            .cloned()
    }

    pub fn resolve(&self, name: &str) -> DepotResult<Arc<Repository>> {
        self.repositories
            .get(name)
            .cloned()
            .ok_or_else(|| DepotError::NotFound(format!("Repository '{}' not found", name)))
    }

    /// Storage-owning repositories consulted for `name`: itself for hosted
    /// and proxy repositories, the depth-first flattened members for groups.
    pub fn contributors(&self, name: &str) -> DepotResult<&[Arc<Repository>]> {
        self.contributors
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DepotError::NotFound(format!("Repository '{}' not found", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.repositories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

fn flatten(
    repositories: &HashMap<String, Arc<Repository>>,
    name: &str,
    visits: &mut HashMap<String, Visit>,
    out: &mut Vec<Arc<Repository>>,
    seen: &mut HashSet<String>,
) -> DepotResult<()> {
    let repository = repositories.get(name).ok_or_else(|| {
        DepotError::Configuration(format!("Unknown repository '{}' referenced as a member", name))
    })?;

    if repository.kind() != RepositoryKind::Group {
        if seen.insert(name.to_string()) {
            out.push(repository.clone());
        }
        return Ok(());
    }

    match visits.get(name) {
        Some(Visit::InProgress) => {
            return Err(DepotError::Configuration(format!(
                "Group membership cycle through '{}'",
                name
            )))
        }
        Some(Visit::Done) | None => {}
    }

    visits.insert(name.to_string(), Visit::InProgress);
    for member in &repository.config().members {
        if !repositories.contains_key(member) {
            return Err(DepotError::Configuration(format!(
                "Group '{}' references unknown member '{}'",
                name, member
            )));
        }
        flatten(repositories, member, visits, out, seen)?;
    }
    visits.insert(name.to_string(), Visit::Done);
    Ok(())
}

/// Current registry snapshot, replaced atomically on reload.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<RepositoryRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: RepositoryRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry to use for the whole of one request.
    pub fn snapshot(&self) -> Arc<RepositoryRegistry> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a new registry. Requests already holding a snapshot keep it.
    pub fn replace(&self, registry: RepositoryRegistry) -> Arc<RepositoryRegistry> {
        let next = Arc::new(registry);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = std::mem::replace(&mut *current, next);
        tracing::info!(
            repositories = current.len(),
            "Repository registry replaced"
        );
        previous
    }
}
