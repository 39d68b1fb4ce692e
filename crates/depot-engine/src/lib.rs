//! Depot Engine
//!
//! Artifact resolution, proxying and deploy/delete pipelines on top of the
//! storage layer. `Depot` wires the pieces together over one shared
//! repository registry so a reload is visible to every operation at once.

pub mod access;
pub mod delete;
pub mod deploy;
pub mod metadata;
pub mod proxy;
pub mod registry;
pub mod resolver;

pub use delete::{DeleteRequest, Deleter, Removed};
pub use deploy::{DeployRequest, Deployer};
pub use metadata::{MetadataSynthesizer, VersionSet};
pub use proxy::{ProxyClient, RemoteDescriptor, UpstreamFailure, UpstreamFailureKind};
pub use registry::{RegistryHandle, Repository, RepositoryRegistry};
pub use resolver::{LookupRequest, LookupResult, Origin, Resolver};

use depot_core::{AccessChecker, Config, DepotResult, EventNotifier, FileEntry};
use depot_storage::SpaceGate;
use std::sync::Arc;

/// The engine as seen by a host: lookup, deploy and delete over one registry.
pub struct Depot {
    registry: Arc<RegistryHandle>,
    metadata: Arc<MetadataSynthesizer>,
    resolver: Resolver,
    deployer: Deployer,
    deleter: Deleter,
}

impl Depot {
    pub fn new(
        registry: RepositoryRegistry,
        access: Arc<dyn AccessChecker>,
        notifier: Arc<dyn EventNotifier>,
    ) -> DepotResult<Self> {
        let registry = Arc::new(RegistryHandle::new(registry));
        let metadata = Arc::new(MetadataSynthesizer::new()?);

        Ok(Self {
            resolver: Resolver::new(registry.clone(), access.clone(), metadata.clone()),
            deployer: Deployer::new(registry.clone(), access.clone(), notifier.clone()),
            deleter: Deleter::new(registry.clone(), access, notifier),
            registry,
            metadata,
        })
    }

    pub async fn from_config(
        config: &Config,
        space: Arc<dyn SpaceGate>,
        access: Arc<dyn AccessChecker>,
        notifier: Arc<dyn EventNotifier>,
    ) -> DepotResult<Self> {
        let registry = RepositoryRegistry::from_config(config, space).await?;
        Self::new(registry, access, notifier)
    }

    pub async fn lookup(&self, request: LookupRequest) -> DepotResult<LookupResult> {
        self.resolver.lookup(request).await
    }

    pub async fn deploy(&self, request: DeployRequest) -> DepotResult<FileEntry> {
        self.deployer.deploy(request).await
    }

    pub async fn delete(&self, request: DeleteRequest) -> DepotResult<Removed> {
        self.deleter.delete(request).await
    }

    pub fn registry(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    /// Swap in a freshly built registry; requests already running keep theirs.
    /// Build it with `RepositoryRegistry::reload_from` so open roots keep
    /// their storage instance.
    pub fn reload(&self, registry: RepositoryRegistry) -> Arc<RepositoryRegistry> {
        self.registry.replace(registry)
    }

    /// Rebuild the registry from `config` and swap it in.
    pub async fn reload_config(
        &self,
        config: &Config,
        space: Arc<dyn SpaceGate>,
    ) -> DepotResult<Arc<RepositoryRegistry>> {
        let current = self.registry.snapshot();
        let registry = RepositoryRegistry::reload_from(config, space, &current).await?;
        Ok(self.reload(registry))
    }

    pub fn metadata(&self) -> &MetadataSynthesizer {
        &self.metadata
    }
}
