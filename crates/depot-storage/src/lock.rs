//! Keyed lock registry.
//!
//! Every repository owns one `PathLocks`. A file operation takes the tree lock
//! shared and then the FIFO mutex of its exact path; a directory delete takes
//! the tree lock exclusively, which drains and blocks every file operation of
//! the repository for its duration. Path entries exist only while someone
//! holds or waits for them. Checksum side-files are keyed by the file they
//! describe (see `keys::lock_key`).

use crate::keys;
use depot_core::ArtifactPath;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

type EntryMap = HashMap<ArtifactPath, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct PathLocks {
    tree: Arc<RwLock<()>>,
    entries: Arc<Mutex<EntryMap>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive lock on a single file path. Waiters are served in arrival order.
    pub async fn lock_file(&self, path: &ArtifactPath) -> LockGuard {
        let key = keys::lock_key(path);
        let tree = self.tree.clone().read_owned().await;
        let entry = EntryHandle::register(self.entries.clone(), key.clone());
        let path_guard = entry.mutex.clone().lock_owned().await;

        LockGuard {
            scope: LockScope::File(key),
            _path_guard: Some(path_guard),
            _entry: Some(entry),
            tree: TreeGuard::Shared(tree),
            owner: self.tree.clone(),
        }
    }

    /// Exclusive lock over every path of the repository.
    pub async fn lock_tree(&self) -> LockGuard {
        let tree = self.tree.clone().write_owned().await;

        LockGuard {
            scope: LockScope::Tree,
            _path_guard: None,
            _entry: None,
            tree: TreeGuard::Exclusive(tree),
            owner: self.tree.clone(),
        }
    }

    /// Number of path entries currently registered.
    pub fn active_paths(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn owns(&self, guard: &LockGuard) -> bool {
        Arc::ptr_eq(&self.tree, &guard.owner)
    }

    /// True if `guard` was issued by this registry and covers `path`.
    pub fn is_held(&self, guard: &LockGuard, path: &ArtifactPath) -> bool {
        self.owns(guard) && guard.covers(path)
    }

    /// True if `guard` was issued by this registry for the whole tree.
    pub fn is_tree_held(&self, guard: &LockGuard) -> bool {
        self.owns(guard) && matches!(guard.scope, LockScope::Tree)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LockScope {
    File(ArtifactPath),
    Tree,
}

enum TreeGuard {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Proof of a held lock. Released on drop, on every exit path.
///
/// Fields drop in declaration order: the path mutex first, then the registry
/// entry (pruned if nobody else waits on it), then the tree lock.
pub struct LockGuard {
    scope: LockScope,
    _path_guard: Option<OwnedMutexGuard<()>>,
    _entry: Option<EntryHandle>,
    tree: TreeGuard,
    owner: Arc<RwLock<()>>,
}

impl LockGuard {
    pub fn covers(&self, path: &ArtifactPath) -> bool {
        match &self.scope {
            LockScope::File(held) => *held == keys::lock_key(path),
            LockScope::Tree => true,
        }
    }

    pub fn is_exclusive_tree(&self) -> bool {
        matches!(self.tree, TreeGuard::Exclusive(_))
    }

    pub fn describe(&self) -> String {
        match &self.scope {
            LockScope::File(path) => path.to_string(),
            LockScope::Tree => "<repository>".to_string(),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Reference to a registry entry; removes the entry when the last user leaves,
/// including a waiter whose task was cancelled before acquiring.
struct EntryHandle {
    entries: Arc<Mutex<EntryMap>>,
    path: ArtifactPath,
    mutex: Arc<AsyncMutex<()>>,
}

impl EntryHandle {
    fn register(entries: Arc<Mutex<EntryMap>>, path: ArtifactPath) -> Self {
        let mutex = {
            let mut map = entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(path.clone()).or_default().clone()
        };
        Self {
            entries,
            path,
            mutex,
        }
    }
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        let mut map = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here: nobody else holds or waits.
        if Arc::strong_count(&self.mutex) == 2 {
            if let Some(existing) = map.get(&self.path) {
                if Arc::ptr_eq(existing, &self.mutex) {
                    map.remove(&self.path);
                }
            }
        }
    }
}
