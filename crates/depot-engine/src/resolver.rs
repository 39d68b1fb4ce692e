//! Read side of the engine.
//!
//! A lookup walks the storage-owning repositories behind the requested name
//! in order. Exact files win over directories, local content wins over
//! remotes, and a remote is only contacted while holding the path lock of the
//! proxy repository that would cache the result.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use depot_core::constants::METADATA_FILE_NAME;
use depot_core::{
    content_type_for, AccessChecker, ArtifactPath, CallerIdentity, Capability, Checksums,
    DepotError, DepotResult, DirectoryEntry, FileEntry, MetadataDescriptor, PathClassification,
};
use depot_storage::{ByteStream, Storage, StorageError};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::access::{authorize, readable_contributors};
use crate::metadata::MetadataSynthesizer;
use crate::proxy::UpstreamFailure;
use crate::registry::{RegistryHandle, Repository};

#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub repository: String,
    /// Raw request path relative to the repository root.
    pub path: String,
    pub identity: Option<CallerIdentity>,
}

/// Where the bytes of a file answer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local { repository: String },
    Remote { repository: String, remote: String },
    Generated,
}

pub enum LookupResult {
    File {
        entry: FileEntry,
        body: ByteStream,
        origin: Origin,
    },
    Directory {
        repository: String,
        path: ArtifactPath,
        entries: Vec<DirectoryEntry>,
    },
    Latest {
        path: ArtifactPath,
        version: String,
    },
}

impl fmt::Debug for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupResult::File { entry, origin, .. } => f
                .debug_struct("File")
                .field("entry", entry)
                .field("origin", origin)
                .finish(),
            LookupResult::Directory {
                repository,
                path,
                entries,
            } => f
                .debug_struct("Directory")
                .field("repository", repository)
                .field("path", path)
                .field("entries", &entries.len())
                .finish(),
            LookupResult::Latest { path, version } => f
                .debug_struct("Latest")
                .field("path", path)
                .field("version", version)
                .finish(),
        }
    }
}

type FileHit = (FileEntry, ByteStream, Origin);

pub struct Resolver {
    registry: Arc<RegistryHandle>,
    access: Arc<dyn AccessChecker>,
    metadata: Arc<MetadataSynthesizer>,
}

impl Resolver {
    pub fn new(
        registry: Arc<RegistryHandle>,
        access: Arc<dyn AccessChecker>,
        metadata: Arc<MetadataSynthesizer>,
    ) -> Self {
        Self {
            registry,
            access,
            metadata,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(repository = %request.repository, path = %request.path)
    )]
    pub async fn lookup(&self, request: LookupRequest) -> DepotResult<LookupResult> {
        let registry = self.registry.snapshot();
        let repository = registry.resolve(&request.repository)?;
        authorize(
            self.access.as_ref(),
            &repository,
            request.identity.as_ref(),
            Capability::Read,
        )
        .await?;

        let contributors = readable_contributors(
            self.access.as_ref(),
            &repository,
            registry.contributors(repository.name())?,
            request.identity.as_ref(),
        )
        .await;
        let contributors = contributors.as_slice();

        if request.path.trim_matches('/').is_empty() {
            return self
                .list_directory(repository.name(), contributors, ArtifactPath::root())
                .await;
        }

        match PathClassification::classify(&request.path)? {
            PathClassification::File {
                path,
                descriptor: Some(descriptor),
            } => {
                self.synthesize_descriptor(repository.name(), contributors, path, descriptor)
                    .await
            }
            PathClassification::File {
                path,
                descriptor: None,
            } => self.resolve_file(repository.name(), contributors, path).await,
            PathClassification::Directory(path) => {
                self.list_directory(repository.name(), contributors, path)
                    .await
            }
            PathClassification::Latest(path) => self.latest(contributors, path).await,
        }
    }

    async fn resolve_file(
        &self,
        repository: &str,
        contributors: &[Arc<Repository>],
        path: ArtifactPath,
    ) -> DepotResult<LookupResult> {
        if let Some((entry, body, origin)) = read_local(contributors, &path).await? {
            return Ok(LookupResult::File {
                entry,
                body,
                origin,
            });
        }

        // Exact file miss: an existing directory answers before any remote is asked.
        let storages = storages_of(contributors);
        if let Some(entries) = self.metadata.merged_listing(&storages, &path).await? {
            return Ok(LookupResult::Directory {
                repository: repository.to_string(),
                path,
                entries,
            });
        }

        for contributor in contributors {
            if contributor.proxy().is_none() {
                continue;
            }
            if let Some((entry, body, origin)) = fetch_through(contributor, &path).await? {
                return Ok(LookupResult::File {
                    entry,
                    body,
                    origin,
                });
            }
        }

        Err(DepotError::NotFound(format!("{} not found in '{}'", path, repository)))
    }

    async fn list_directory(
        &self,
        repository: &str,
        contributors: &[Arc<Repository>],
        path: ArtifactPath,
    ) -> DepotResult<LookupResult> {
        let storages = storages_of(contributors);
        match self.metadata.merged_listing(&storages, &path).await? {
            Some(entries) => Ok(LookupResult::Directory {
                repository: repository.to_string(),
                path,
                entries,
            }),
            None => Err(DepotError::NotFound(format!(
                "Directory {} not found in '{}'",
                display_directory(&path),
                repository
            ))),
        }
    }

    async fn latest(
        &self,
        contributors: &[Arc<Repository>],
        path: ArtifactPath,
    ) -> DepotResult<LookupResult> {
        let storages = storages_of(contributors);
        let versions = self.metadata.local_versions(&storages, &path).await?;
        match versions.latest() {
            Some(version) => Ok(LookupResult::Latest {
                version: version.to_string(),
                path,
            }),
            None => Err(DepotError::NotFound(format!(
                "No versions under {}",
                display_directory(&path)
            ))),
        }
    }

    /// Generated `maven-metadata.xml` (or its checksum) for the artifact
    /// directory holding `path`. When no versions are known the request is
    /// served like any other file, which covers stored snapshot metadata.
    async fn synthesize_descriptor(
        &self,
        repository: &str,
        contributors: &[Arc<Repository>],
        path: ArtifactPath,
        descriptor: MetadataDescriptor,
    ) -> DepotResult<LookupResult> {
        let artifact = path.parent().unwrap_or_default();
        let storages = storages_of(contributors);
        let mut versions = self.metadata.local_versions(&storages, &artifact).await?;

        let upstream = artifact.join(METADATA_FILE_NAME)?;
        for proxy in contributors.iter().filter_map(|c| c.proxy()) {
            let (document, _failures) = proxy.fetch_bytes(&upstream).await;
            if let Some(document) = document {
                self.metadata
                    .merge_descriptor(&mut versions, &String::from_utf8_lossy(&document));
            }
        }

        if versions.is_empty() {
            return self.resolve_file(repository, contributors, path).await;
        }

        let document = self.metadata.render_descriptor(&artifact, &versions);
        let content = match descriptor.checksum {
            None => document,
            Some(algorithm) => Bytes::from(algorithm.digest_hex(&document)),
        };
        let last_modified = versions.last_updated().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        tracing::debug!(
            path = %path,
            versions = versions.len(),
            "Descriptor synthesized"
        );

        let entry = entry_for_bytes(&path, &content, last_modified);
        Ok(LookupResult::File {
            entry,
            body: single_chunk(content),
            origin: Origin::Generated,
        })
    }
}

fn storages_of(contributors: &[Arc<Repository>]) -> Vec<Arc<dyn Storage>> {
    contributors
        .iter()
        .filter_map(|c| c.storage().cloned())
        .collect()
}

async fn read_local(
    contributors: &[Arc<Repository>],
    path: &ArtifactPath,
) -> DepotResult<Option<FileHit>> {
    for contributor in contributors {
        let Some(storage) = contributor.storage() else {
            continue;
        };
        match storage.read_file(path).await {
            Ok((entry, body)) => {
                return Ok(Some((
                    entry,
                    body,
                    Origin::Local {
                        repository: contributor.name().to_string(),
                    },
                )))
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Fetch `path` through one proxy repository's remotes under its path lock.
/// Whoever waited on the lock re-checks storage first, so a race between two
/// misses produces a single upstream fetch.
async fn fetch_through(
    repository: &Repository,
    path: &ArtifactPath,
) -> DepotResult<Option<FileHit>> {
    let (Some(proxy), Some(storage)) = (repository.proxy(), repository.storage()) else {
        return Ok(None);
    };

    let guard = storage.lock_file(path).await;

    match storage.read_file(path).await {
        Ok((entry, body)) => {
            tracing::debug!(path = %path, "Cached by a concurrent fetch");
            return Ok(Some((
                entry,
                body,
                Origin::Local {
                    repository: repository.name().to_string(),
                },
            )));
        }
        Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut failures: Vec<UpstreamFailure> = Vec::new();
    let mut start = 0;
    while start < proxy.len() {
        let outcome = proxy.open(path, start).await;
        failures.extend(outcome.failures);
        let Some(response) = outcome.response else {
            break;
        };

        start = response.remote_index + 1;
        let remote = response.remote.clone();
        let origin = Origin::Remote {
            repository: repository.name().to_string(),
            remote: remote.base_url.clone(),
        };
        let started = Instant::now();

        if remote.store_locally {
            let content_length = response.content_length;
            match storage
                .write_file(&guard, path, response.into_reader(), content_length)
                .await
            {
                Ok(_) => {
                    // Opened before the guard drops: later overwrites cannot tear this read.
                    let (entry, body) = storage.read_file(path).await?;
                    tracing::info!(
                        repository = %repository.name(),
                        remote = %remote.base_url,
                        path = %path,
                        size_bytes = entry.size_bytes,
                        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                        "Cached upstream artifact"
                    );
                    return Ok(Some((entry, body, origin)));
                }
                Err(StorageError::BodyInterrupted(message)) => {
                    let failure = UpstreamFailure::interrupted(&remote, path, message);
                    failure.log();
                    failures.push(failure);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            match response.bytes().await {
                Ok(content) => {
                    tracing::debug!(
                        remote = %remote.base_url,
                        path = %path,
                        size_bytes = content.len(),
                        "Passing upstream artifact through"
                    );
                    let entry = entry_for_bytes(path, &content, Utc::now());
                    return Ok(Some((entry, single_chunk(content), origin)));
                }
                Err(e) => {
                    let failure = UpstreamFailure::from_reqwest(&remote, path, &e);
                    failure.log();
                    failures.push(failure);
                }
            }
        }
    }

    if !failures.is_empty() {
        tracing::debug!(
            repository = %repository.name(),
            path = %path,
            failures = failures.len(),
            "No remote could serve the artifact"
        );
    }
    Ok(None)
}

fn entry_for_bytes(path: &ArtifactPath, content: &Bytes, last_modified: DateTime<Utc>) -> FileEntry {
    FileEntry {
        path: path.clone(),
        size_bytes: content.len() as u64,
        content_type: content_type_for(path.file_name().unwrap_or_default()).to_string(),
        last_modified,
        checksums: Checksums::of(content),
    }
}

fn single_chunk(content: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok::<_, StorageError>(content) }))
}

fn display_directory(path: &ArtifactPath) -> String {
    if path.is_root() {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::RemoteDescriptor;
    use crate::registry::RepositoryRegistry;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use depot_core::{
        AllowAllAccess, ChecksumAlgorithm, RepositoryConfig, RepositoryKind, Visibility,
    };
    use depot_storage::{LocalStorage, UnlimitedSpace};
    use futures::StreamExt;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    struct DenyAll;

    #[async_trait]
    impl AccessChecker for DenyAll {
        async fn check_access(&self, _: &CallerIdentity, _: &str, _: Capability) -> bool {
            false
        }
    }

    fn path(raw: &str) -> ArtifactPath {
        ArtifactPath::parse(raw).unwrap()
    }

    fn remote(base_url: &str, store_locally: bool) -> RemoteDescriptor {
        RemoteDescriptor {
            base_url: base_url.trim_end_matches('/').to_string(),
            store_locally,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
        }
    }

    async fn storage(dir: &TempDir, name: &str) -> Arc<dyn Storage> {
        Arc::new(
            LocalStorage::new(&dir.path().join(name), Arc::new(UnlimitedSpace))
                .await
                .unwrap(),
        )
    }

    async fn put(storage: &Arc<dyn Storage>, raw: &str, content: &str) {
        let target = path(raw);
        let guard = storage.lock_file(&target).await;
        storage
            .write_file(
                &guard,
                &target,
                Box::pin(Cursor::new(content.as_bytes().to_vec())),
                None,
            )
            .await
            .unwrap();
    }

    fn resolver(repositories: Vec<Repository>, access: Arc<dyn AccessChecker>) -> Resolver {
        let registry = RepositoryRegistry::build(repositories).unwrap();
        Resolver::new(
            Arc::new(RegistryHandle::new(registry)),
            access,
            Arc::new(MetadataSynthesizer::new().unwrap()),
        )
    }

    fn request(repository: &str, raw: &str) -> LookupRequest {
        LookupRequest {
            repository: repository.to_string(),
            path: raw.to_string(),
            identity: None,
        }
    }

    async fn body_of(result: LookupResult) -> (FileEntry, Vec<u8>, Origin) {
        match result {
            LookupResult::File {
                entry,
                mut body,
                origin,
            } => {
                let mut content = Vec::new();
                while let Some(chunk) = body.next().await {
                    content.extend_from_slice(&chunk.unwrap());
                }
                (entry, content, origin)
            }
            other => panic!("expected a file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hosted_file_hit() {
        let dir = tempfile::tempdir().unwrap();
        let releases = storage(&dir, "releases").await;
        put(&releases, "com/example/lib/1.0/lib-1.0.jar", "jar").await;

        let resolver = resolver(
            vec![Repository::new(
                RepositoryConfig::hosted("releases"),
                Some(releases),
                vec![],
            )
            .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let (entry, content, origin) = body_of(
            resolver
                .lookup(request("releases", "com/example/lib/1.0/lib-1.0.jar"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(content, b"jar");
        assert_eq!(entry.checksums, Checksums::of(b"jar"));
        assert_eq!(
            origin,
            Origin::Local {
                repository: "releases".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_file_path_falls_back_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let releases = storage(&dir, "releases").await;
        put(&releases, "com/example/lib/1.0/lib-1.0.jar", "jar").await;
        let resolver = resolver(
            vec![Repository::new(RepositoryConfig::hosted("releases"), Some(releases), vec![])
                .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let result = resolver
            .lookup(request("releases", "com/example/lib"))
            .await
            .unwrap();
        match result {
            LookupResult::Directory { entries, .. } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "1.0");
            }
            other => panic!("expected a listing, got {:?}", other),
        }

        let root = resolver.lookup(request("releases", "/")).await.unwrap();
        assert!(matches!(root, LookupResult::Directory { ref path, .. } if path.is_root()));

        assert!(matches!(
            resolver.lookup(request("releases", "com/missing/")).await,
            Err(DepotError::NotFound(_))
        ));
        assert!(matches!(
            resolver.lookup(request("releases", "com/../etc/passwd")).await,
            Err(DepotError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_private_repository_requires_identity() {
        let dir = tempfile::tempdir().unwrap();
        let internal = storage(&dir, "internal").await;
        put(&internal, "a.txt", "secret").await;
        let config = RepositoryConfig::hosted("internal").with_visibility(Visibility::Private);
        let resolver = resolver(
            vec![Repository::new(config, Some(internal), vec![]).unwrap()],
            Arc::new(DenyAll),
        );

        assert!(matches!(
            resolver.lookup(request("internal", "a.txt")).await,
            Err(DepotError::AccessDenied(_))
        ));
        // Denial does not depend on whether the path exists.
        assert!(matches!(
            resolver.lookup(request("internal", "missing.txt")).await,
            Err(DepotError::AccessDenied(_))
        ));
        let mut with_token = request("internal", "a.txt");
        with_token.identity = Some(CallerIdentity::new("nope"));
        assert!(matches!(
            resolver.lookup(with_token).await,
            Err(DepotError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_proxy_caches_when_store_locally() {
        let dir = tempfile::tempdir().unwrap();
        let mut upstream = mockito::Server::new_async().await;
        let hit = upstream
            .mock("GET", "/org/x/1.0/x-1.0.pom")
            .with_status(200)
            .with_body("<project/>")
            .expect(1)
            .create_async()
            .await;

        let cache = storage(&dir, "central").await;
        let resolver = resolver(
            vec![Repository::new(
                RepositoryConfig::proxy("central", vec![]),
                Some(cache.clone()),
                vec![remote(&upstream.url(), true)],
            )
            .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let (_, content, origin) = body_of(
            resolver
                .lookup(request("central", "org/x/1.0/x-1.0.pom"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(content, b"<project/>");
        assert!(matches!(origin, Origin::Remote { .. }));
        assert!(cache.is_file(&path("org/x/1.0/x-1.0.pom")).await.unwrap());

        let (_, _, origin) = body_of(
            resolver
                .lookup(request("central", "org/x/1.0/x-1.0.pom"))
                .await
                .unwrap(),
        )
        .await;
        assert!(matches!(origin, Origin::Local { .. }));
        hit.assert_async().await;
    }

    #[tokio::test]
    async fn test_proxy_pass_through_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let mut upstream = mockito::Server::new_async().await;
        upstream
            .mock("GET", "/org/x/1.0/x-1.0.jar")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;

        let cache = storage(&dir, "central").await;
        let resolver = resolver(
            vec![Repository::new(
                RepositoryConfig::proxy("central", vec![]),
                Some(cache.clone()),
                vec![remote(&upstream.url(), false)],
            )
            .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let (entry, content, _) = body_of(
            resolver
                .lookup(request("central", "org/x/1.0/x-1.0.jar"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(content, b"bytes");
        assert_eq!(entry.content_type, "application/java-archive");
        assert!(!cache.exists(&path("org/x/1.0/x-1.0.jar")).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_remotes_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut failing = mockito::Server::new_async().await;
        let mut absent = mockito::Server::new_async().await;
        failing
            .mock("GET", "/a.jar")
            .with_status(502)
            .create_async()
            .await;
        absent
            .mock("GET", "/a.jar")
            .with_status(404)
            .create_async()
            .await;

        let resolver = resolver(
            vec![Repository::new(
                RepositoryConfig::proxy("central", vec![]),
                Some(storage(&dir, "central").await),
                vec![remote(&failing.url(), true), remote(&absent.url(), true)],
            )
            .unwrap()],
            Arc::new(AllowAllAccess),
        );

        assert!(matches!(
            resolver.lookup(request("central", "a.jar")).await,
            Err(DepotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_prefers_member_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = storage(&dir, "first").await;
        let second = storage(&dir, "second").await;
        put(&first, "lib/1.0/a.jar", "first").await;
        put(&second, "lib/1.0/a.jar", "second").await;
        put(&second, "lib/2.0/a.jar", "only-second").await;

        let resolver = resolver(
            vec![
                Repository::new(RepositoryConfig::hosted("first"), Some(first), vec![]).unwrap(),
                Repository::new(RepositoryConfig::hosted("second"), Some(second), vec![]).unwrap(),
                Repository::new(
                    RepositoryConfig::group("public", vec!["first".into(), "second".into()]),
                    None,
                    vec![],
                )
                .unwrap(),
            ],
            Arc::new(AllowAllAccess),
        );

        let (_, content, origin) =
            body_of(resolver.lookup(request("public", "lib/1.0/a.jar")).await.unwrap()).await;
        assert_eq!(content, b"first");
        assert_eq!(
            origin,
            Origin::Local {
                repository: "first".to_string()
            }
        );

        let (_, content, _) =
            body_of(resolver.lookup(request("public", "lib/2.0/a.jar")).await.unwrap()).await;
        assert_eq!(content, b"only-second");

        match resolver.lookup(request("public", "lib/")).await.unwrap() {
            LookupResult::Directory { entries, .. } => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["1.0", "2.0"]);
            }
            other => panic!("expected a listing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_latest_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let releases = storage(&dir, "releases").await;
        for version in ["1.0", "1.2", "1.10", "2.0-SNAPSHOT"] {
            put(&releases, &format!("com/x/lib/{0}/lib-{0}.jar", version), "x").await;
        }
        let resolver = resolver(
            vec![Repository::new(RepositoryConfig::hosted("releases"), Some(releases), vec![])
                .unwrap()],
            Arc::new(AllowAllAccess),
        );

        match resolver
            .lookup(request("releases", "com/x/lib/@latest"))
            .await
            .unwrap()
        {
            LookupResult::Latest { version, .. } => assert_eq!(version, "2.0-SNAPSHOT"),
            other => panic!("expected a version, got {:?}", other),
        }

        assert!(matches!(
            resolver.lookup(request("releases", "com/y/@latest")).await,
            Err(DepotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_descriptor_synthesized_with_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let releases = storage(&dir, "releases").await;
        put(&releases, "com/x/lib/1.0/lib-1.0.jar", "x").await;
        put(&releases, "com/x/lib/1.1/lib-1.1.jar", "x").await;
        let resolver = resolver(
            vec![Repository::new(RepositoryConfig::hosted("releases"), Some(releases), vec![])
                .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let (entry, xml, origin) = body_of(
            resolver
                .lookup(request("releases", "com/x/lib/maven-metadata.xml"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(origin, Origin::Generated);
        assert_eq!(entry.content_type, "application/xml");
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<groupId>com.x</groupId>"));
        assert!(xml.contains("<release>1.1</release>"));

        let (_, digest, _) = body_of(
            resolver
                .lookup(request("releases", "com/x/lib/maven-metadata.xml.sha1"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(
            String::from_utf8(digest).unwrap(),
            ChecksumAlgorithm::Sha1.digest_hex(xml.as_bytes())
        );
    }

    #[tokio::test]
    async fn test_snapshot_descriptor_served_from_storage() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = storage(&dir, "snapshots").await;
        let stored = "<metadata><version>1.0-SNAPSHOT</version></metadata>";
        put(&snapshots, "com/x/lib/1.0-SNAPSHOT/maven-metadata.xml", stored).await;
        let resolver = resolver(
            vec![Repository::new(RepositoryConfig::hosted("snapshots"), Some(snapshots), vec![])
                .unwrap()],
            Arc::new(AllowAllAccess),
        );

        let (_, content, origin) = body_of(
            resolver
                .lookup(request(
                    "snapshots",
                    "com/x/lib/1.0-SNAPSHOT/maven-metadata.xml",
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(content, stored.as_bytes());
        assert!(matches!(origin, Origin::Local { .. }));
    }

    #[tokio::test]
    async fn test_proxy_descriptor_merges_upstream_versions() {
        let dir = tempfile::tempdir().unwrap();
        let mut upstream = mockito::Server::new_async().await;
        upstream
            .mock("GET", "/com/x/lib/maven-metadata.xml")
            .with_status(200)
            .with_body(
                "<metadata><versioning><versions><version>0.9</version></versions>\
                 <lastUpdated>20200101000000</lastUpdated></versioning></metadata>",
            )
            .create_async()
            .await;

        let cache = storage(&dir, "central").await;
        put(&cache, "com/x/lib/1.0/lib-1.0.pom", "x").await;
        let proxy = Repository::new(
            RepositoryConfig::proxy("central", vec![]),
            Some(cache),
            vec![remote(&upstream.url(), true)],
        )
        .unwrap();
        assert_eq!(proxy.kind(), RepositoryKind::Proxy);
        let resolver = resolver(vec![proxy], Arc::new(AllowAllAccess));

        let (entry, xml, _) = body_of(
            resolver
                .lookup(request("central", "com/x/lib/maven-metadata.xml"))
                .await
                .unwrap(),
        )
        .await;
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<version>0.9</version>"));
        assert!(xml.contains("<version>1.0</version>"));
        assert!(entry.last_modified > Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }

    struct NamedReader;

    #[async_trait]
    impl AccessChecker for NamedReader {
        async fn check_access(&self, identity: &CallerIdentity, _: &str, c: Capability) -> bool {
            identity.as_str() == "reader" && c == Capability::Read
        }
    }

    #[tokio::test]
    async fn test_public_group_hides_private_members() {
        let dir = tempfile::tempdir().unwrap();
        let releases = storage(&dir, "releases").await;
        let internal = storage(&dir, "internal").await;
        put(&releases, "org/open/1.0/open-1.0.jar", "open").await;
        put(&internal, "org/secret/2.0/secret-2.0.jar", "secret").await;
        put(&internal, "org/open/3.0/open-3.0.jar", "internal").await;

        let resolver = resolver(
            vec![
                Repository::new(RepositoryConfig::hosted("releases"), Some(releases), vec![])
                    .unwrap(),
                Repository::new(
                    RepositoryConfig::hosted("internal").with_visibility(Visibility::Private),
                    Some(internal),
                    vec![],
                )
                .unwrap(),
                Repository::new(
                    RepositoryConfig::group(
                        "public",
                        vec!["releases".to_string(), "internal".to_string()],
                    ),
                    None,
                    vec![],
                )
                .unwrap(),
            ],
            Arc::new(NamedReader),
        );

        assert!(matches!(
            resolver
                .lookup(request("public", "org/secret/2.0/secret-2.0.jar"))
                .await,
            Err(DepotError::NotFound(_))
        ));
        match resolver.lookup(request("public", "org/")).await.unwrap() {
            LookupResult::Directory { entries, .. } => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["open"]);
            }
            other => panic!("expected a listing, got {:?}", other),
        }
        match resolver.lookup(request("public", "org/open/@latest")).await.unwrap() {
            LookupResult::Latest { version, .. } => assert_eq!(version, "1.0"),
            other => panic!("expected a version, got {:?}", other),
        }

        let reader = LookupRequest {
            identity: Some(CallerIdentity::new("reader")),
            ..request("public", "org/secret/2.0/secret-2.0.jar")
        };
        let (_, content, origin) = body_of(resolver.lookup(reader).await.unwrap()).await;
        assert_eq!(content, b"secret");
        assert_eq!(
            origin,
            Origin::Local {
                repository: "internal".to_string()
            }
        );
    }
}
