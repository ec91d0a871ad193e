//! # File-Watch Collaborator
//!
//! The index registers one watch target per file row: the file itself when
//! it exists, else its parent directory when that exists, else nothing.
//! Several rows can share a directory target, so `WatchLedger` reference
//! counts targets and only unwatches a path when no row needs it anymore.

use crate::{FileId, FileSystem, PathResolver, TexIndexError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EVENTS & TRAIT
// =============================================================================

/// A change reported by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "event", content = "path", rename_all = "snake_case")]
pub enum WatchEvent {
    FileChanged(String),
    DirectoryChanged(String),
}

/// Registers paths with an external notification source.
pub trait FileWatcher {
    fn watch(&mut self, path: &str) -> Result<(), TexIndexError>;

    fn unwatch(&mut self, path: &str);
}

// =============================================================================
// WATCH LEDGER
// =============================================================================

#[derive(Debug, Clone)]
struct Target {
    path: String,
    holders: BTreeSet<FileId>,
}

/// Watch targets per file row, reference counted per path.
#[derive(Debug, Clone, Default)]
pub struct WatchLedger {
    by_file: BTreeMap<FileId, String>,
    /// normalized key -> target
    targets: BTreeMap<String, Target>,
}

impl WatchLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path to watch for `path`: the file, its directory, or nothing.
    #[must_use]
    pub fn target_for(path: &str, fs: &dyn FileSystem) -> Option<String> {
        if fs.is_file(path) {
            return Some(PathResolver::normalize(path));
        }
        PathResolver::parent(path).filter(|dir| fs.is_dir(dir))
    }

    /// (Re)register the watch of a file row.
    ///
    /// Returns the target now watched for the row. On failure the row is
    /// left without a watch.
    pub fn register(
        &mut self,
        file_id: FileId,
        path: &str,
        fs: &dyn FileSystem,
        watcher: &mut dyn FileWatcher,
    ) -> Result<Option<String>, TexIndexError> {
        let wanted = Self::target_for(path, fs);
        let current = self.by_file.get(&file_id).cloned();
        if current.is_some() && current == wanted {
            return Ok(wanted);
        }
        self.release(file_id, watcher);

        let Some(target) = wanted else {
            return Ok(None);
        };
        let key = PathResolver::normalized_key(&target);
        match self.targets.get_mut(&key) {
            Some(entry) => {
                entry.holders.insert(file_id);
            }
            None => {
                watcher
                    .watch(&target)
                    .map_err(|e| TexIndexError::WatchRegistrationFailed {
                        path: target.clone(),
                        reason: e.to_string(),
                    })?;
                self.targets.insert(
                    key,
                    Target {
                        path: target.clone(),
                        holders: BTreeSet::from([file_id]),
                    },
                );
            }
        }
        self.by_file.insert(file_id, target.clone());
        Ok(Some(target))
    }

    /// Drop the watch of a file row.
    pub fn release(&mut self, file_id: FileId, watcher: &mut dyn FileWatcher) {
        let Some(path) = self.by_file.remove(&file_id) else {
            return;
        };
        let key = PathResolver::normalized_key(&path);
        let now_unused = self.targets.get_mut(&key).is_some_and(|entry| {
            entry.holders.remove(&file_id);
            entry.holders.is_empty()
        });
        if now_unused {
            if let Some(entry) = self.targets.remove(&key) {
                watcher.unwatch(&entry.path);
            }
        }
    }

    /// Unwatch everything.
    pub fn clear(&mut self, watcher: &mut dyn FileWatcher) {
        for target in self.targets.values() {
            watcher.unwatch(&target.path);
        }
        self.targets.clear();
        self.by_file.clear();
    }

    #[must_use]
    pub fn target_of(&self, file_id: FileId) -> Option<&str> {
        self.by_file.get(&file_id).map(String::as_str)
    }

    /// Number of distinct watched paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// =============================================================================
// MEMORY WATCHER
// =============================================================================

/// Watcher that only records paths. Paths can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatcher {
    watched: BTreeSet<String>,
    failing: BTreeSet<String>,
}

impl MemoryWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `watch(path)` fail from now on.
    pub fn fail_on(&mut self, path: &str) {
        self.failing.insert(PathResolver::normalize(path));
    }

    #[must_use]
    pub fn is_watched(&self, path: &str) -> bool {
        self.watched.contains(&PathResolver::normalize(path))
    }

    #[must_use]
    pub fn watched(&self) -> Vec<String> {
        self.watched.iter().cloned().collect()
    }
}

impl FileWatcher for MemoryWatcher {
    fn watch(&mut self, path: &str) -> Result<(), TexIndexError> {
        let path = PathResolver::normalize(path);
        if self.failing.contains(&path) {
            return Err(TexIndexError::IoError(format!("cannot watch {path}")));
        }
        self.watched.insert(path);
        Ok(())
    }

    fn unwatch(&mut self, path: &str) {
        self.watched.remove(&PathResolver::normalize(path));
    }
}

// =============================================================================
// TESTS
// =============================================================================
