//! Hooks and traits for external collaborators
//!
//! The engine consumes authorization as an opaque yes/no capability check and
//! publishes deploy/delete events fire-and-forget. Credential storage, token
//! formats and event buses live behind these traits.

use async_trait::async_trait;
use std::fmt;

use crate::models::{ArtifactPath, FileEntry};

/// Opaque caller identity as presented by the HTTP layer (e.g. a bearer token).
#[derive(Clone, PartialEq, Eq)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens never end up in logs.
impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallerIdentity(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    Write,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
        }
    }
}

/// Authorization gate consulted before every private read and every write.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check_access(
        &self,
        identity: &CallerIdentity,
        repository: &str,
        capability: Capability,
    ) -> bool;
}

/// Grants every capability to any presented identity. Anonymous callers are
/// still rejected by the engine wherever an identity is required.
pub struct AllowAllAccess;

#[async_trait]
impl AccessChecker for AllowAllAccess {
    async fn check_access(
        &self,
        _identity: &CallerIdentity,
        _repository: &str,
        _capability: Capability,
    ) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    Deployed {
        repository: String,
        entry: FileEntry,
    },
    Deleted {
        repository: String,
        path: ArtifactPath,
    },
}

/// Fire-and-forget notification sink. Implementations must not block; the
/// engine never waits on delivery and ignores failures.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: RepositoryEvent);
}

/// Default notifier: records events in the trace log.
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn notify(&self, event: RepositoryEvent) {
        match event {
            RepositoryEvent::Deployed { repository, entry } => {
                tracing::info!(
                    repository = %repository,
                    path = %entry.path,
                    size_bytes = entry.size_bytes,
                    "Artifact deployed"
                );
            }
            RepositoryEvent::Deleted { repository, path } => {
                tracing::info!(repository = %repository, path = %path, "Artifact deleted");
            }
        }
    }
}
