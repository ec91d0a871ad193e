//! # Bulk Operations
//!
//! Operations over a set of nodes. Each runs inside `TextureIndex::batch`:
//! propagation prompts are off and the view is recomputed once at the end.
//!
//! Soft failures on a single node (locked, refused by the host, missing
//! file) are logged and skipped; anything else aborts the operation.

use crate::index::TextureIndex;
use crate::policy::{Propagation, PropagationRequest};
use crate::watch::FileWatcher;
use crate::{FileId, FileState, FileSystem, Host, NodeId, PathResolver, TexIndexError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Log a soft failure and keep going; propagate anything else.
fn skip_soft<T>(result: Result<T, TexIndexError>, node: NodeId) -> Result<Option<T>, TexIndexError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_soft() => {
            warn!(node = %node, error = %e, "node skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl<H: Host, W: FileWatcher> TextureIndex<H, W> {
    // -------------------------------------------------------------------------
    // Selection expansion
    // -------------------------------------------------------------------------

    /// Resolve names to ids, adding every sibling of shared files if the
    /// policy answers `All`.
    ///
    /// The policy is asked at most once. `Cancel` aborts with `Cancelled`.
    pub fn expand_instances(&mut self, names: &[String]) -> Result<Vec<NodeId>, TexIndexError> {
        let mut selected = BTreeSet::new();
        for name in names {
            selected.insert(self.node_id(name)?);
        }

        let mut extra = BTreeSet::new();
        let mut first_shared = None;
        for id in &selected {
            let Some(node) = self.nodes.get(*id) else {
                continue;
            };
            let siblings: Vec<NodeId> = self
                .nodes
                .members_of(node.file_id)
                .into_iter()
                .filter(|member| !selected.contains(member))
                .collect();
            if !siblings.is_empty() && first_shared.is_none() {
                first_shared = Some(*id);
            }
            extra.extend(siblings);
        }

        let Some(first) = first_shared else {
            return Ok(selected.into_iter().collect());
        };
        let answer = match self
            .nodes
            .get(first)
            .and_then(|node| self.files.get(node.file_id).map(|file| (node, file)))
        {
            Some((node, file)) => self.policy.decide(&PropagationRequest {
                node: &node.name,
                file: &file.absolute_path,
                instance_count: file.instance_count,
                cancellable: true,
            }),
            None => Propagation::Single,
        };
        match answer {
            Propagation::All => {
                debug!(added = extra.len(), "selection expanded to instances");
                selected.extend(extra);
            }
            Propagation::Single => {}
            Propagation::Cancel => {
                info!("bulk operation cancelled");
                return Err(TexIndexError::Cancelled);
            }
        }
        Ok(selected.into_iter().collect())
    }

    // -------------------------------------------------------------------------
    // Reload
    // -------------------------------------------------------------------------

    /// Make the host re-read the files of `ids`. One node per distinct raw
    /// value is enough.
    pub fn reload_files(&mut self, ids: &[NodeId]) -> Result<usize, TexIndexError> {
        self.batch(|idx| {
            let mut seen = BTreeSet::new();
            let mut targets = Vec::new();
            let mut files = BTreeSet::new();
            for id in ids {
                let node = idx
                    .nodes
                    .get(*id)
                    .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
                files.insert(node.file_id);
                if seen.insert(node.raw_attribute.clone()) {
                    targets.push(*id);
                }
            }
            let reloaded = idx.reload_nodes(&targets);
            for file_id in files {
                if let Some(path) = idx.files.get(file_id).map(|f| f.absolute_path.clone()) {
                    let state = idx.fs.file_state(&path);
                    if idx.files.set_state(file_id, state)? {
                        idx.view.invalidate();
                    }
                }
            }
            info!(reloaded, "files reloaded");
            Ok(reloaded)
        })
    }

    // -------------------------------------------------------------------------
    // Renames
    // -------------------------------------------------------------------------

    /// Rename each node after its file. Returns `(old, new)` for every node
    /// whose name changed.
    pub fn rename_nodes_after_files(
        &mut self,
        ids: &[NodeId],
    ) -> Result<Vec<(String, String)>, TexIndexError> {
        self.batch(|idx| {
            let mut renamed = Vec::new();
            for id in ids {
                let old = idx.node_ref_name(*id)?;
                if let Some(new) = skip_soft(idx.rename_after_file(*id), *id)? {
                    if new != old {
                        renamed.push((old, new));
                    }
                }
            }
            info!(renamed = renamed.len(), "nodes renamed after files");
            Ok(renamed)
        })
    }

    // -------------------------------------------------------------------------
    // Path rewrites
    // -------------------------------------------------------------------------

    fn rewrite_each(
        &mut self,
        ids: &[NodeId],
        label: &'static str,
        mut target: impl FnMut(&Self, NodeId) -> Option<String>,
    ) -> Result<usize, TexIndexError> {
        self.batch(|idx| {
            let mut changed = 0usize;
            for id in ids {
                let raw = idx
                    .nodes
                    .get(*id)
                    .map(|node| node.raw_attribute.clone())
                    .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
                let Some(value) = target(&*idx, *id) else {
                    continue;
                };
                if value == raw {
                    continue;
                }
                if skip_soft(idx.repoint_node(*id, &value), *id)?.is_some() {
                    changed = changed.saturating_add(1);
                }
            }
            info!(operation = label, changed, "attributes rewritten");
            Ok(changed)
        })
    }

    /// Rewrite attributes as `/`-prefixed paths below the workspace root.
    ///
    /// Paths under some resource folder are rebased onto the workspace
    /// resource folder. Nodes whose file does not exist there are left
    /// alone.
    pub fn convert_to_relative(&mut self, ids: &[NodeId]) -> Result<usize, TexIndexError> {
        self.rewrite_each(ids, "to_relative", |idx, id| {
            let root = idx.contexts.root()?;
            let path = idx.resolved_path(id)?;
            PathResolver::workspace_relative(
                &path,
                &root.root_path,
                &root.resource_subfolder,
                idx.fs.as_ref(),
            )
        })
    }

    /// Rewrite attributes as the absolute path they resolve to.
    pub fn convert_to_absolute(&mut self, ids: &[NodeId]) -> Result<usize, TexIndexError> {
        self.rewrite_each(ids, "to_absolute", |idx, id| idx.resolved_path(id))
    }

    /// Point each node at the file of the same name inside `dir`.
    pub fn retarget_directory(&mut self, ids: &[NodeId], dir: &str) -> Result<usize, TexIndexError> {
        let dir = PathResolver::normalize(dir);
        self.rewrite_each(ids, "retarget", |idx, id| {
            let path = idx.resolved_path(id)?;
            Some(PathResolver::join(&dir, PathResolver::basename(&path)))
        })
    }

    // -------------------------------------------------------------------------
    // File operations
    // -------------------------------------------------------------------------

    /// Copy each node's file into the workspace resource folder and
    /// repoint the node at the copy.
    ///
    /// Files already inside the folder are left alone. An existing copy is
    /// reused unless `overwrite` is set.
    pub fn copy_to_workspace(&mut self, ids: &[NodeId], overwrite: bool) -> Result<usize, TexIndexError> {
        let folder = self
            .contexts
            .root()
            .map(|root| PathResolver::join(&root.root_path, &root.resource_subfolder))
            .ok_or_else(|| TexIndexError::InvariantViolation("ROOT context missing".into()))?;

        self.batch(|idx| {
            let mut history: BTreeMap<FileId, String> = BTreeMap::new();
            let mut moved = 0usize;
            for id in ids {
                let (file_id, path) = {
                    let node = idx
                        .nodes
                        .get(*id)
                        .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
                    let path = idx
                        .files
                        .get(node.file_id)
                        .map(|file| file.absolute_path.clone())
                        .unwrap_or_default();
                    (node.file_id, path)
                };
                if path.is_empty() || PathResolver::strip_root(&path, &folder).is_some() {
                    continue;
                }

                let destination = match history.get(&file_id) {
                    Some(done) => done.clone(),
                    None => {
                        let destination = PathResolver::join(&folder, PathResolver::basename(&path));
                        let copied = idx.copy_into(&path, &destination, overwrite);
                        if skip_soft(copied, *id)?.is_none() {
                            continue;
                        }
                        history.insert(file_id, destination.clone());
                        destination
                    }
                };
                if skip_soft(idx.repoint_node(*id, &destination), *id)?.is_some() {
                    moved = moved.saturating_add(1);
                }
            }
            info!(moved, files = history.len(), "files copied to workspace");
            Ok(moved)
        })
    }

    fn copy_into(&self, from: &str, to: &str, overwrite: bool) -> Result<(), TexIndexError> {
        if !self.fs.is_file(from) {
            return Err(TexIndexError::FileUnresolvable(from.to_string()));
        }
        if self.fs.is_file(to) && !overwrite {
            debug!(path = to, "copy exists, reusing it");
            return Ok(());
        }
        self.fs.copy_file(from, to)?;
        debug!(from, to, "file copied");
        Ok(())
    }

    /// Flip the read-only flag of each distinct file. Missing files are
    /// skipped. Returns the number of files changed.
    pub fn toggle_read_only(&mut self, ids: &[NodeId]) -> Result<usize, TexIndexError> {
        self.batch(|idx| {
            let mut files = BTreeSet::new();
            for id in ids {
                let node = idx
                    .nodes
                    .get(*id)
                    .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))?;
                files.insert(node.file_id);
            }
            let mut toggled = 0usize;
            for file_id in files {
                let Some((path, state)) = idx
                    .files
                    .get(file_id)
                    .map(|file| (file.absolute_path.clone(), file.state))
                else {
                    continue;
                };
                if state == FileState::Missing {
                    continue;
                }
                let read_only = state == FileState::Writable;
                if let Err(e) = idx.fs.set_read_only(&path, read_only) {
                    warn!(path = %path, error = %e, "read-only flag not changed");
                    continue;
                }
                let now = idx.fs.file_state(&path);
                if idx.files.set_state(file_id, now)? {
                    idx.view.invalidate();
                }
                toggled = toggled.saturating_add(1);
            }
            info!(toggled, "read-only flags toggled");
            Ok(toggled)
        })
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Editable source file (`.psd`) of a node's texture, if one exists.
    pub fn source_file_of(&self, name: &str) -> Result<Option<String>, TexIndexError> {
        let id = self.node_id(name)?;
        let Some(path) = self.resolved_path(id) else {
            return Ok(None);
        };
        let Some(root) = self.contexts.root() else {
            return Ok(None);
        };
        Ok(PathResolver::source_file(
            &path,
            &root.root_path,
            &root.resource_subfolder,
            &self.config.source_folder,
            self.fs.as_ref(),
        ))
    }

    fn resolved_path(&self, id: NodeId) -> Option<String> {
        self.nodes
            .get(id)
            .and_then(|node| self.files.get(node.file_id))
            .map(|file| file.absolute_path.clone())
            .filter(|path| !path.is_empty())
    }

    fn node_ref_name(&self, id: NodeId) -> Result<String, TexIndexError> {
        self.nodes
            .get(id)
            .map(|node| node.name.clone())
            .ok_or_else(|| TexIndexError::NodeNotFound(id.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
