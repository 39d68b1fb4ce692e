pub mod checksum;
pub mod entry;
pub mod path;
pub mod repository;
pub mod version;

pub use checksum::{ChecksumAlgorithm, ChecksumState, Checksums};
pub use entry::{content_type_for, DirectoryEntry, FileEntry};
pub use path::{ArtifactPath, MetadataDescriptor, PathClassification};
pub use repository::{RemoteConfig, RepositoryConfig, RepositoryKind, Visibility};
pub use version::{compare_versions, is_snapshot, MavenVersion};
