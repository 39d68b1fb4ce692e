//! Depot Storage Library
//!
//! This crate owns the bytes of every repository. It provides the `Storage`
//! trait, the local filesystem implementation, the per-path lock registry that
//! serializes writers, and the free-space gate consulted before commits.
//!
//! # Layout
//!
//! Each repository occupies its own root directory. Artifact paths map
//! directly onto it (`com/example/lib/1.0/lib-1.0.jar`), checksum side-files
//! live next to their artifact (`lib-1.0.jar.sha1`, `lib-1.0.jar.sha256`) and
//! in-flight uploads are staged under the reserved `.depot-tmp` directory of
//! the same root so that the final rename never crosses filesystems.

pub mod capacity;
pub mod factory;
pub mod keys;
pub mod local;
pub mod lock;
pub mod traits;

// Re-export commonly used types
pub use capacity::{check_space_async, DiskSpaceGate, SpaceGate, UnlimitedSpace};
pub use factory::create_storage;
pub use local::LocalStorage;
pub use lock::{LockGuard, PathLocks};
pub use traits::{ByteReader, ByteStream, Storage, StorageError, StorageResult};
