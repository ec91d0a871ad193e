//! # File-System Seam
//!
//! Every existence check, permission probe and copy made by the index goes
//! through the `FileSystem` trait, so resolution stays a pure function of
//! its inputs plus this capability.
//!
//! - `OsFileSystem` talks to the real disk.
//! - `MemoryFileSystem` is a shared in-memory tree for tests and dry runs.

use crate::{FileState, PathResolver, TexIndexError};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

// =============================================================================
// FILESYSTEM TRAIT
// =============================================================================

/// Synchronous, local file-system capability.
pub trait FileSystem {
    /// True if `path` names an existing regular file.
    fn is_file(&self, path: &str) -> bool;

    /// True if `path` names an existing directory.
    fn is_dir(&self, path: &str) -> bool;

    /// True if `path` can be written by the current process.
    fn is_writable(&self, path: &str) -> bool;

    /// Read a text file, refusing files larger than `limit` bytes.
    fn read_to_string(&self, path: &str, limit: u64) -> Result<String, TexIndexError>;

    /// Look up an environment variable.
    fn env_var(&self, name: &str) -> Option<String>;

    /// Copy `from` to `to`, replacing `to` if it exists.
    fn copy_file(&self, from: &str, to: &str) -> Result<(), TexIndexError>;

    /// Set or clear the read-only permission of a file.
    fn set_read_only(&self, path: &str, read_only: bool) -> Result<(), TexIndexError>;

    /// Derive the access state of a path.
    ///
    /// Directories and absent paths are `Missing`.
    fn file_state(&self, path: &str) -> FileState {
        if path.is_empty() || !self.is_file(path) {
            FileState::Missing
        } else if self.is_writable(path) {
            FileState::Writable
        } else {
            FileState::ReadOnly
        }
    }

    /// True if `path` names a file or a directory.
    fn exists(&self, path: &str) -> bool {
        self.is_file(path) || self.is_dir(path)
    }
}

// =============================================================================
// OS FILESYSTEM
// =============================================================================

/// `FileSystem` backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn is_file(&self, path: &str) -> bool {
        !path.is_empty() && Path::new(path).is_file()
    }

    fn is_dir(&self, path: &str) -> bool {
        !path.is_empty() && Path::new(path).is_dir()
    }

    fn is_writable(&self, path: &str) -> bool {
        std::fs::metadata(path).is_ok_and(|meta| !meta.permissions().readonly())
    }

    fn read_to_string(&self, path: &str, limit: u64) -> Result<String, TexIndexError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > limit {
            return Err(TexIndexError::IoError(format!(
                "{path} is {} bytes, limit is {limit}",
                meta.len()
            )));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn copy_file(&self, from: &str, to: &str) -> Result<(), TexIndexError> {
        std::fs::copy(from, to)?;
        Ok(())
    }

    #[allow(clippy::permissions_set_readonly_false)]
    fn set_read_only(&self, path: &str, read_only: bool) -> Result<(), TexIndexError> {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(read_only);
        std::fs::set_permissions(path, perms)?;
        Ok(())
    }
}

// =============================================================================
// MEMORY FILESYSTEM
// =============================================================================

#[derive(Debug, Default)]
struct MemoryTree {
    /// path -> (read_only, contents)
    files: BTreeMap<String, (bool, String)>,
    dirs: BTreeSet<String>,
    env: BTreeMap<String, String>,
}

impl MemoryTree {
    fn add_ancestors(&mut self, path: &str) {
        let mut current = PathResolver::parent(path);
        while let Some(dir) = current {
            if !self.dirs.insert(dir.clone()) {
                break;
            }
            current = PathResolver::parent(&dir);
        }
    }
}

/// In-memory file tree.
///
/// Clones share the same tree, so a test can keep a handle and mutate the
/// disk while an index owns another handle.
/// Paths are stored normalized and compared case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    tree: Rc<RefCell<MemoryTree>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writable empty file and its parent directories.
    pub fn add_file(&self, path: &str) {
        self.write(path, "");
    }

    /// Create a read-only empty file and its parent directories.
    pub fn add_read_only(&self, path: &str) {
        let path = PathResolver::normalize(path);
        let mut tree = self.tree.borrow_mut();
        tree.add_ancestors(&path);
        tree.files.insert(path, (true, String::new()));
    }

    /// Create or overwrite a writable file with `contents`.
    pub fn write(&self, path: &str, contents: &str) {
        let path = PathResolver::normalize(path);
        let mut tree = self.tree.borrow_mut();
        tree.add_ancestors(&path);
        tree.files.insert(path, (false, contents.to_string()));
    }

    /// Create a directory and its parents.
    pub fn add_dir(&self, path: &str) {
        let path = PathResolver::normalize(path);
        let mut tree = self.tree.borrow_mut();
        tree.add_ancestors(&path);
        tree.dirs.insert(path);
    }

    /// Remove a file. Directories are kept.
    pub fn remove(&self, path: &str) {
        let path = PathResolver::normalize(path);
        self.tree.borrow_mut().files.remove(&path);
    }

    pub fn set_env(&self, name: &str, value: &str) {
        self.tree
            .borrow_mut()
            .env
            .insert(name.to_string(), value.to_string());
    }

    /// Number of files in the tree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.tree.borrow().files.len()
    }
}

impl FileSystem for MemoryFileSystem {
    fn is_file(&self, path: &str) -> bool {
        self.tree
            .borrow()
            .files
            .contains_key(&PathResolver::normalize(path))
    }

    fn is_dir(&self, path: &str) -> bool {
        self.tree
            .borrow()
            .dirs
            .contains(&PathResolver::normalize(path))
    }

    fn is_writable(&self, path: &str) -> bool {
        self.tree
            .borrow()
            .files
            .get(&PathResolver::normalize(path))
            .is_some_and(|(read_only, _)| !read_only)
    }

    fn read_to_string(&self, path: &str, limit: u64) -> Result<String, TexIndexError> {
        let tree = self.tree.borrow();
        let (_, contents) = tree
            .files
            .get(&PathResolver::normalize(path))
            .ok_or_else(|| TexIndexError::IoError(format!("{path}: not found")))?;
        if u64::try_from(contents.len()).unwrap_or(u64::MAX) > limit {
            return Err(TexIndexError::IoError(format!("{path}: exceeds {limit} bytes")));
        }
        Ok(contents.clone())
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.tree.borrow().env.get(name).cloned()
    }

    fn copy_file(&self, from: &str, to: &str) -> Result<(), TexIndexError> {
        let contents = self.read_to_string(from, u64::MAX)?;
        let to = PathResolver::normalize(to);
        let mut tree = self.tree.borrow_mut();
        let parent_exists = PathResolver::parent(&to).is_none_or(|dir| tree.dirs.contains(&dir));
        if !parent_exists {
            return Err(TexIndexError::IoError(format!("{to}: parent directory missing")));
        }
        tree.files.insert(to, (false, contents));
        Ok(())
    }

    fn set_read_only(&self, path: &str, read_only: bool) -> Result<(), TexIndexError> {
        let mut tree = self.tree.borrow_mut();
        let entry = tree
            .files
            .get_mut(&PathResolver::normalize(path))
            .ok_or_else(|| TexIndexError::IoError(format!("{path}: not found")))?;
        entry.0 = read_only;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
