//! # Storage Tables
//!
//! `FileTable` and `NodeTable` are plain id-keyed maps with secondary
//! indices (normalized key, node name, file membership). They check only
//! their own uniqueness rules; cross-table invariants are enforced by
//! `TextureIndex`.

use crate::{ContextId, FileId, FileRecord, FileState, Node, NodeId, PathResolver, TexIndexError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FILE TABLE
// =============================================================================

/// Deduplicated file rows keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct FileTable {
    files: BTreeMap<FileId, FileRecord>,
    key_index: BTreeMap<String, FileId>,
    next_id: u64,
}

impl FileTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.key_index.clear();
    }

    /// Insert a row for an unseen key.
    ///
    /// Returns the existing id unchanged if the key is already present.
    pub fn insert(&mut self, absolute_path: &str, state: FileState, instance_count: u64) -> FileId {
        let key = PathResolver::normalized_key(absolute_path);
        if let Some(id) = self.key_index.get(&key) {
            return *id;
        }
        let id = FileId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.files.insert(
            id,
            FileRecord {
                id,
                normalized_key: key.clone(),
                absolute_path: PathResolver::normalize(absolute_path),
                state,
                instance_count,
            },
        );
        self.key_index.insert(key, id);
        id
    }

    /// Delete a row regardless of its count.
    pub fn remove(&mut self, id: FileId) -> Option<FileRecord> {
        let row = self.files.remove(&id)?;
        self.key_index.remove(&row.normalized_key);
        Some(row)
    }

    /// Increment a row's count. Returns the new count.
    pub fn retain(&mut self, id: FileId) -> Result<u64, TexIndexError> {
        let row = self.row_mut(id)?;
        row.retain();
        Ok(row.instance_count)
    }

    /// Decrement a row's count, deleting it at zero.
    ///
    /// Returns the deleted row, if any.
    pub fn release(&mut self, id: FileId) -> Result<Option<FileRecord>, TexIndexError> {
        if self.row_mut(id)?.release() == 0 {
            return Ok(self.remove(id));
        }
        Ok(None)
    }

    /// Replace a row's state. Returns true if it changed.
    pub fn set_state(&mut self, id: FileId, state: FileState) -> Result<bool, TexIndexError> {
        let row = self.row_mut(id)?;
        let changed = row.state != state;
        row.state = state;
        Ok(changed)
    }

    fn row_mut(&mut self, id: FileId) -> Result<&mut FileRecord, TexIndexError> {
        self.files
            .get_mut(&id)
            .ok_or_else(|| TexIndexError::InvariantViolation(format!("{id} is not a live file")))
    }

    #[must_use]
    pub fn get(&self, id: FileId) -> Option<&FileRecord> {
        self.files.get(&id)
    }

    #[must_use]
    pub fn id_for_key(&self, key: &str) -> Option<FileId> {
        self.key_index.get(key).copied()
    }

    /// Row whose key matches `path` after normalization.
    #[must_use]
    pub fn by_path(&self, path: &str) -> Option<&FileRecord> {
        self.id_for_key(&PathResolver::normalized_key(path))
            .and_then(|id| self.files.get(&id))
    }

    /// Rows whose file lives directly inside `dir`.
    #[must_use]
    pub fn in_directory(&self, dir: &str) -> Vec<FileId> {
        let dir_key = PathResolver::normalized_key(dir);
        self.files
            .values()
            .filter(|row| {
                PathResolver::parent(&row.normalized_key).is_some_and(|parent| parent == dir_key)
            })
            .map(|row| row.id)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }
}

// =============================================================================
// NODE TABLE
// =============================================================================

/// Fields of a node row before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub name: String,
    pub type_name: String,
    pub nice_name: String,
    pub raw_attribute: String,
    pub is_external_reference: bool,
    pub context_id: ContextId,
}

/// Tracked node rows with a unique name index.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, Node>,
    name_index: BTreeMap<String, NodeId>,
    /// file -> nodes pointing at it
    file_index: BTreeMap<FileId, BTreeSet<NodeId>>,
    next_id: u64,
}

impl NodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every row. Identifiers keep increasing.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.name_index.clear();
        self.file_index.clear();
    }

    pub fn insert(&mut self, draft: NodeDraft, file_id: FileId) -> Result<NodeId, TexIndexError> {
        if self.name_index.contains_key(&draft.name) {
            return Err(TexIndexError::DuplicateName(draft.name));
        }
        let id = NodeId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.name_index.insert(draft.name.clone(), id);
        self.file_index.entry(file_id).or_default().insert(id);
        self.nodes.insert(
            id,
            Node {
                id,
                name: draft.name,
                type_name: draft.type_name,
                nice_name: draft.nice_name,
                raw_attribute: draft.raw_attribute,
                is_external_reference: draft.is_external_reference,
                context_id: draft.context_id,
                file_id,
            },
        );
        Ok(id)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        self.name_index.remove(&node.name);
        self.unlink(node.file_id, id);
        Some(node)
    }

    fn unlink(&mut self, file_id: FileId, id: NodeId) {
        if let Some(members) = self.file_index.get_mut(&file_id) {
            members.remove(&id);
            if members.is_empty() {
                self.file_index.remove(&file_id);
            }
        }
    }

    /// Change a node's unique name.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<(), TexIndexError> {
        if self.name_index.get(new_name).is_some_and(|holder| *holder != id) {
            return Err(TexIndexError::DuplicateName(new_name.to_string()));
        }
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
        self.name_index.remove(&node.name);
        node.name = new_name.to_string();
        self.name_index.insert(new_name.to_string(), id);
        Ok(())
    }

    /// Point a node at another file row and store its new raw value.
    pub fn set_file(
        &mut self,
        id: NodeId,
        file_id: FileId,
        raw_attribute: &str,
    ) -> Result<FileId, TexIndexError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
        let previous = node.file_id;
        node.file_id = file_id;
        node.raw_attribute = raw_attribute.to_string();
        self.unlink(previous, id);
        self.file_index.entry(file_id).or_default().insert(id);
        Ok(previous)
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.name_index.get(name).copied()
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Node> {
        self.id_of(name).and_then(|id| self.nodes.get(&id))
    }

    /// Nodes sharing `file_id`, in id order.
    #[must_use]
    pub fn members_of(&self, file_id: FileId) -> Vec<NodeId> {
        self.file_index
            .get(&file_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count_for_file(&self, file_id: FileId) -> usize {
        self.file_index.get(&file_id).map_or(0, BTreeSet::len)
    }

    /// Files referenced by at least one node.
    pub fn referenced_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.file_index.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> NodeDraft {
        NodeDraft {
            name: name.into(),
            type_name: "file".into(),
            nice_name: "FILE".into(),
            raw_attribute: "a.png".into(),
            is_external_reference: false,
            context_id: ContextId(0),
        }
    }

    #[test]
    fn file_keys_are_unique() {
        let mut files = FileTable::new();
        let a = files.insert("C:\\Proj\\A.png", FileState::Writable, 1);
        let b = files.insert("c:/proj/a.PNG", FileState::Missing, 1);
        assert_eq!(a, b);
        assert_eq!(files.len(), 1);
        assert_eq!(
            files.get(a).map(|f| f.absolute_path.as_str()),
            Some("C:/Proj/A.png")
        );
        assert!(files.by_path("C:/PROJ/a.png").is_some());
    }

    #[test]
    fn release_deletes_at_zero() {
        let mut files = FileTable::new();
        let id = files.insert("/a.png", FileState::Missing, 1);
        assert_eq!(files.retain(id).expect("retain"), 2);
        assert!(files.release(id).expect("release").is_none());
        let removed = files.release(id).expect("release");
        assert_eq!(removed.map(|f| f.id), Some(id));
        assert!(files.is_empty());
        assert!(files.id_for_key("/a.png").is_none());
        assert!(matches!(
            files.release(id),
            Err(TexIndexError::InvariantViolation(_))
        ));
    }

    #[test]
    fn ids_are_not_reused() {
        let mut files = FileTable::new();
        let first = files.insert("/a.png", FileState::Missing, 1);
        files.clear();
        let second = files.insert("/a.png", FileState::Missing, 1);
        assert_ne!(first, second);
    }

    #[test]
    fn files_in_directory() {
        let mut files = FileTable::new();
        let a = files.insert("/tex/a.png", FileState::Missing, 1);
        let b = files.insert("/TEX/b.png", FileState::Missing, 1);
        files.insert("/tex/sub/c.png", FileState::Missing, 1);
        assert_eq!(files.in_directory("/Tex"), vec![a, b]);
    }

    #[test]
    fn node_names_are_unique() {
        let mut nodes = NodeTable::new();
        let a = nodes.insert(draft("tex1"), FileId(0)).expect("insert");
        assert!(matches!(
            nodes.insert(draft("tex1"), FileId(0)),
            Err(TexIndexError::DuplicateName(_))
        ));
        let b = nodes.insert(draft("tex2"), FileId(0)).expect("insert");
        assert!(matches!(
            nodes.rename(b, "tex1"),
            Err(TexIndexError::DuplicateName(_))
        ));
        nodes.rename(a, "tex1").expect("self rename");
        nodes.rename(a, "wood").expect("rename");
        assert_eq!(nodes.id_of("wood"), Some(a));
        assert_eq!(nodes.id_of("tex1"), None);
    }

    #[test]
    fn file_membership_follows_repoint_and_removal() {
        let mut nodes = NodeTable::new();
        let a = nodes.insert(draft("a"), FileId(1)).expect("insert");
        let b = nodes.insert(draft("b"), FileId(1)).expect("insert");
        assert_eq!(nodes.members_of(FileId(1)), vec![a, b]);

        let previous = nodes.set_file(a, FileId(2), "b.png").expect("set_file");
        assert_eq!(previous, FileId(1));
        assert_eq!(nodes.members_of(FileId(1)), vec![b]);
        assert_eq!(nodes.count_for_file(FileId(2)), 1);
        assert_eq!(
            nodes.get(a).map(|n| n.raw_attribute.as_str()),
            Some("b.png")
        );

        nodes.remove(b);
        assert_eq!(nodes.count_for_file(FileId(1)), 0);
        assert_eq!(nodes.referenced_files().collect::<Vec<_>>(), vec![FileId(2)]);
    }
}
