//! # Reference Context Store
//!
//! One row per external reference scope plus the `ROOT` row for the
//! primary workspace. Rows are created lazily and only cleared on reset.

use crate::primitives::{MAX_MARKER_SIZE, ROOT_CONTEXT};
use crate::{ContextId, FileSystem, IndexConfig, PathResolver, ReferenceContext};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `workspace -fr "sourceImages" "<folder>"` rule inside a marker file.
static RESOURCE_RULE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""sourceImages"\s+"([^"]*)""#).ok());

/// Root and subfolder found by marker discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub root_path: String,
    pub resource_subfolder: String,
    /// False when no marker was found within the search depth.
    pub marker_found: bool,
}

/// Table of reference contexts.
#[derive(Debug, Clone, Default)]
pub struct ReferenceContextStore {
    contexts: BTreeMap<ContextId, ReferenceContext>,
    name_index: BTreeMap<String, ContextId>,
    next_id: u64,
}

impl ReferenceContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every row. Identifiers keep increasing.
    pub fn clear(&mut self) {
        self.contexts.clear();
        self.name_index.clear();
    }

    /// Insert or replace the `ROOT` row.
    pub fn seed_root(&mut self, root_path: &str, resource_subfolder: &str) -> ContextId {
        if let Some(id) = self.name_index.get(ROOT_CONTEXT).copied() {
            if let Some(row) = self.contexts.get_mut(&id) {
                row.root_path = PathResolver::normalize(root_path);
                row.resource_subfolder = resource_subfolder.to_string();
            }
            return id;
        }
        self.insert(ROOT_CONTEXT, root_path, resource_subfolder)
    }

    fn insert(&mut self, name: &str, root_path: &str, resource_subfolder: &str) -> ContextId {
        let id = ContextId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.contexts.insert(
            id,
            ReferenceContext {
                id,
                name: name.to_string(),
                root_path: PathResolver::normalize(root_path),
                resource_subfolder: resource_subfolder.to_string(),
            },
        );
        self.name_index.insert(name.to_string(), id);
        id
    }

    #[must_use]
    pub fn root_id(&self) -> Option<ContextId> {
        self.name_index.get(ROOT_CONTEXT).copied()
    }

    #[must_use]
    pub fn root(&self) -> Option<&ReferenceContext> {
        self.root_id().and_then(|id| self.contexts.get(&id))
    }

    #[must_use]
    pub fn get(&self, id: ContextId) -> Option<&ReferenceContext> {
        self.contexts.get(&id)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ReferenceContext> {
        self.name_index.get(name).and_then(|id| self.contexts.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceContext> {
        self.contexts.values()
    }

    /// Context of an external reference scope, creating it on first sight.
    ///
    /// Returns `(is_new, id)`.
    pub fn context_for(
        &mut self,
        reference_name: &str,
        reference_file: &str,
        config: &IndexConfig,
        fs: &dyn FileSystem,
    ) -> (bool, ContextId) {
        if let Some(id) = self.name_index.get(reference_name).copied() {
            return (false, id);
        }
        let found = Self::discover(reference_file, config, fs);
        if !found.marker_found {
            tracing::debug!(
                reference = reference_name,
                root = %found.root_path,
                "no workspace marker found, using nearest directory"
            );
        }
        let id = self.insert(reference_name, &found.root_path, &found.resource_subfolder);
        tracing::debug!(reference = reference_name, ?id, root = %found.root_path, "context created");
        (true, id)
    }

    /// Walk upward from `reference_file` looking for the workspace marker.
    ///
    /// Without a marker inside the search depth, the nearest existing
    /// ancestor directory becomes the root.
    #[must_use]
    pub fn discover(reference_file: &str, config: &IndexConfig, fs: &dyn FileSystem) -> Discovery {
        let mut nearest: Option<String> = None;
        let mut current = PathResolver::parent(reference_file);

        for _ in 0..config.marker_search_depth {
            let Some(dir) = current else { break };
            if fs.is_dir(&dir) {
                if nearest.is_none() {
                    nearest = Some(dir.clone());
                }
                let marker = PathResolver::join(&dir, &config.workspace_marker);
                if fs.is_file(&marker) {
                    let subfolder = fs
                        .read_to_string(&marker, MAX_MARKER_SIZE)
                        .ok()
                        .and_then(|text| Self::parse_marker(&text))
                        .unwrap_or_else(|| config.resource_subfolder.clone());
                    return Discovery {
                        root_path: dir,
                        resource_subfolder: subfolder,
                        marker_found: true,
                    };
                }
            }
            current = PathResolver::parent(&dir);
        }

        Discovery {
            root_path: nearest.unwrap_or_default(),
            resource_subfolder: config.resource_subfolder.clone(),
            marker_found: false,
        }
    }

    /// Resource subfolder declared by a marker file, if any.
    #[must_use]
    pub fn parse_marker(contents: &str) -> Option<String> {
        RESOURCE_RULE
            .as_ref()?
            .captures(contents)?
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|folder| !folder.is_empty())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileSystem;

    const MARKER: &str = r#"//Maya 2018 Project Definition

workspace -fr "scene" "scenes";
workspace -fr "sourceImages" "textures/src";
"#;

    #[test]
    fn root_is_seeded_once() {
        let mut store = ReferenceContextStore::new();
        let first = store.seed_root("/proj", "sourceimages");
        let second = store.seed_root("/other", "res");
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let root = store.root().expect("root");
        assert_eq!(root.root_path, "/other");
        assert_eq!(root.resource_subfolder, "res");
    }

    #[test]
    fn parse_marker_rules() {
        assert_eq!(
            ReferenceContextStore::parse_marker(MARKER).as_deref(),
            Some("textures/src")
        );
        assert_eq!(ReferenceContextStore::parse_marker("garbage"), None);
        assert_eq!(
            ReferenceContextStore::parse_marker(r#"workspace -fr "sourceImages" "";"#),
            None
        );
    }

    #[test]
    fn discovery_finds_marker() {
        let fs = MemoryFileSystem::new();
        fs.write("/lib/chair/workspace.mel", MARKER);
        fs.add_file("/lib/chair/scenes/v1/chair.ma");
        let found = ReferenceContextStore::discover(
            "/lib/chair/scenes/v1/chair.ma",
            &IndexConfig::default(),
            &fs,
        );
        assert!(found.marker_found);
        assert_eq!(found.root_path, "/lib/chair");
        assert_eq!(found.resource_subfolder, "textures/src");
    }

    #[test]
    fn unparsable_marker_uses_default_subfolder() {
        let fs = MemoryFileSystem::new();
        fs.write("/lib/lamp/workspace.mel", "not a workspace");
        fs.add_file("/lib/lamp/lamp.ma");
        let found =
            ReferenceContextStore::discover("/lib/lamp/lamp.ma", &IndexConfig::default(), &fs);
        assert!(found.marker_found);
        assert_eq!(found.resource_subfolder, "sourceimages");
    }

    #[test]
    fn bounded_search_falls_back_to_nearest_dir() {
        let fs = MemoryFileSystem::new();
        fs.write("/deep/workspace.mel", MARKER);
        fs.add_file("/deep/a/b/c/d.ma");
        let config = IndexConfig {
            marker_search_depth: 2,
            ..IndexConfig::default()
        };
        let found = ReferenceContextStore::discover("/deep/a/b/c/d.ma", &config, &fs);
        assert!(!found.marker_found);
        assert_eq!(found.root_path, "/deep/a/b/c");
        assert_eq!(found.resource_subfolder, "sourceimages");
    }

    #[test]
    fn contexts_are_created_once_per_reference() {
        let fs = MemoryFileSystem::new();
        fs.write("/lib/chair/workspace.mel", MARKER);
        fs.add_file("/lib/chair/chair.ma");
        let config = IndexConfig::default();
        let mut store = ReferenceContextStore::new();
        store.seed_root("/proj", "sourceimages");

        let (is_new, id) = store.context_for("chairRN", "/lib/chair/chair.ma", &config, &fs);
        assert!(is_new);
        let (again, same) = store.context_for("chairRN", "/lib/chair/chair.ma", &config, &fs);
        assert!(!again);
        assert_eq!(id, same);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.by_name("chairRN").map(|c| c.root_path.as_str()),
            Some("/lib/chair")
        );

        store.clear();
        assert!(store.is_empty());
        let root = store.seed_root("/proj", "sourceimages");
        assert!(root > id);
    }
}
