//! Depot Core Library
//!
//! This crate provides the domain types, error taxonomy, configuration and
//! collaborator hooks shared by every depot component: the artifact path
//! classifier, repository descriptors, file/directory entries, checksums and
//! version ordering.

pub mod config;
pub mod constants;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::{DepotError, DepotResult, ErrorMetadata, LogLevel};
pub use hooks::{
    AccessChecker, AllowAllAccess, CallerIdentity, Capability, EventNotifier, RepositoryEvent,
    TracingNotifier,
};
pub use models::{
    compare_versions, content_type_for, is_snapshot, ArtifactPath, ChecksumAlgorithm, ChecksumState, Checksums, DirectoryEntry, FileEntry,
    MavenVersion, MetadataDescriptor, PathClassification, RemoteConfig, RepositoryConfig,
    RepositoryKind, Visibility,
};
