//! # Texture Index
//!
//! The orchestrator. `TextureIndex` owns the node, file and context tables
//! and is the single point of mutation. Host and file-watch events enter
//! through `ingest` / `ingest_watch`; user mutations through `repoint`,
//! `rename` and the bulk operations.
//!
//! ## Invariants
//!
//! After every mutating call:
//! 1. every node points at a live file row
//! 2. each file's `instance_count` equals the number of nodes pointing at it
//! 3. normalized keys are unique
//! 4. node names are unique
//! 5. no file row has `instance_count == 0`
//!
//! `verify_invariants` checks all of them.
//!
//! ## Re-entrancy
//!
//! Writes the index makes to the host come back as host events. Before the
//! index writes, events already queued by the host are moved to a deferred
//! queue, so that while `is_replaying_file` is set the host queue holds only
//! echoes; their attribute-changed events are ignored and other events are
//! applied normally. `pump` applies the deferred queue ahead of new host
//! events. A write to a node's attribute supersedes deferred changes of the
//! same attribute.

use crate::export::{self, CsvRow};
use crate::policy::{Propagation, PropagationPolicy, PropagationRequest};
use crate::tables::{FileTable, NodeDraft, NodeTable};
use crate::traversal;
use crate::view::{Column, Row, SortOrder, SortedView, ViewFilter};
use crate::watch::{FileWatcher, WatchEvent, WatchLedger};
use crate::{
    ContextId, FileId, FileRecord, FileState, FileSystem, Host, HostEvent, IndexConfig, Node,
    NodeId, PathResolver, ReferenceContextStore, Selection, TexIndexError,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Write;
use tracing::{debug, info, trace, warn};

// =============================================================================
// INGEST MODE
// =============================================================================

/// Gate applied to incoming events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Apply events.
    #[default]
    Live,
    /// Drop events, as during a host-side scene load. `DocumentReset` is
    /// still applied.
    Suspended,
}

// =============================================================================
// TEXTURE INDEX
// =============================================================================

/// In-memory texture reference index.
pub struct TextureIndex<H, W> {
    pub(crate) host: H,
    pub(crate) watcher: W,
    pub(crate) fs: Box<dyn FileSystem>,
    pub(crate) policy: Box<dyn PropagationPolicy>,
    pub(crate) config: IndexConfig,
    pub(crate) contexts: ReferenceContextStore,
    pub(crate) files: FileTable,
    pub(crate) nodes: NodeTable,
    pub(crate) watches: WatchLedger,
    pub(crate) selection: Selection,
    pub(crate) view: SortedView,
    /// Skip view recomputes until the current batch ends.
    pub(crate) suspend_derived_recompute: bool,
    /// Set while the index itself writes to the host.
    pub(crate) is_replaying_file: bool,
    /// Set during bulk operations; disables propagation prompts.
    pub(crate) is_batching: bool,
    /// Host events queued before the index's own writes, awaiting `pump`.
    deferred_events: VecDeque<HostEvent>,
    generation: u64,
}

impl<H: Host, W: FileWatcher> TextureIndex<H, W> {
    /// Build an index and scan the host.
    pub fn new(
        host: H,
        watcher: W,
        fs: Box<dyn FileSystem>,
        policy: Box<dyn PropagationPolicy>,
        config: IndexConfig,
    ) -> Result<Self, TexIndexError> {
        config.validate()?;
        let mut index = Self {
            host,
            watcher,
            fs,
            policy,
            config,
            contexts: ReferenceContextStore::new(),
            files: FileTable::new(),
            nodes: NodeTable::new(),
            watches: WatchLedger::new(),
            selection: Selection::new(),
            view: SortedView::new(),
            suspend_derived_recompute: false,
            is_replaying_file: false,
            is_batching: false,
            deferred_events: VecDeque::new(),
            generation: 0,
        };
        index.full_reset()?;
        Ok(index)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut W {
        &mut self.watcher
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn contexts(&self) -> &ReferenceContextStore {
        &self.contexts
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn watches(&self) -> &WatchLedger {
        &self.watches
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_policy(&mut self, policy: Box<dyn PropagationPolicy>) {
        self.policy = policy;
    }

    /// Counter bumped on every change visible to the presentation layer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_recompute_suspended(&self) -> bool {
        self.suspend_derived_recompute
    }

    pub fn is_replaying_file(&self) -> bool {
        self.is_replaying_file
    }

    // -------------------------------------------------------------------------
    // Reset
    // -------------------------------------------------------------------------

    /// Drop every table and rebuild from the live host.
    ///
    /// Events queued before the reset describe state the scan already saw
    /// and are discarded. Returns the number of nodes indexed.
    pub fn full_reset(&mut self) -> Result<usize, TexIndexError> {
        self.watches.clear(&mut self.watcher);
        self.files.clear();
        self.nodes.clear();
        self.contexts.clear();
        self.selection.clear();

        let root = self.host.workspace_root();
        let subfolder = self
            .host
            .resource_folder_rule()
            .unwrap_or_else(|| self.config.resource_subfolder.clone());
        self.contexts.seed_root(&root, &subfolder);

        let types: Vec<String> = self
            .config
            .tracked_types
            .iter()
            .map(|t| t.type_name.clone())
            .collect();
        let mut indexed = 0usize;
        for type_name in &types {
            for name in self.host.objects_of_type(type_name) {
                match self.track_host_object(&name) {
                    Ok(Some(_)) => indexed = indexed.saturating_add(1),
                    Ok(None) => {}
                    Err(e) => warn!(node = %name, error = %e, "node skipped during scan"),
                }
            }
        }
        let discarded = self.host.drain_events().len();

        info!(
            root = %root,
            nodes = indexed,
            files = self.files.len(),
            discarded_events = discarded,
            "index rebuilt"
        );
        self.touch();
        self.refresh_view();
        Ok(indexed)
    }

    // -------------------------------------------------------------------------
    // Contexts
    // -------------------------------------------------------------------------

    /// Context of a host object: `ROOT`, or its reference scope.
    ///
    /// Returns `(is_new, id)`; reference contexts are created on first sight.
    pub fn resolve_context(&mut self, name: &str) -> Result<(bool, ContextId), TexIndexError> {
        let reference = if self.host.is_referenced(name) {
            self.host.reference_of(name)
        } else {
            None
        };
        self.context_for(reference.as_deref())
    }

    fn context_for(&mut self, reference: Option<&str>) -> Result<(bool, ContextId), TexIndexError> {
        match reference {
            None => self
                .contexts
                .root_id()
                .map(|id| (false, id))
                .ok_or_else(|| TexIndexError::InvariantViolation("ROOT context missing".into())),
            Some(reference) => {
                let file = self.host.reference_file(reference).unwrap_or_default();
                Ok(self
                    .contexts
                    .context_for(reference, &file, &self.config, self.fs.as_ref()))
            }
        }
    }

    // -------------------------------------------------------------------------
    // File rows
    // -------------------------------------------------------------------------

    /// Retain the row for `absolute_path`, creating and watching it if new.
    pub fn add_file(&mut self, absolute_path: &str) -> Result<FileId, TexIndexError> {
        let key = PathResolver::normalized_key(absolute_path);
        if let Some(id) = self.files.id_for_key(&key) {
            let count = self.files.retain(id)?;
            trace!(file = %id, count, "file retained");
            return Ok(id);
        }
        let state = self.fs.file_state(absolute_path);
        let id = self.files.insert(absolute_path, state, 1);
        self.watch_file(id, absolute_path);
        debug!(file = %id, path = absolute_path, ?state, "file row created");
        Ok(id)
    }

    /// Drop one reference to a row, deleting it and its watch at zero.
    pub fn release_file(&mut self, file_id: FileId) -> Result<(), TexIndexError> {
        match self.files.release(file_id)? {
            Some(row) => {
                self.watches.release(file_id, &mut self.watcher);
                debug!(file = %file_id, path = %row.absolute_path, "file row deleted");
            }
            None => {
                self.refresh_state(file_id)?;
            }
        }
        Ok(())
    }

    fn watch_file(&mut self, file_id: FileId, path: &str) {
        if let Err(e) = self
            .watches
            .register(file_id, path, self.fs.as_ref(), &mut self.watcher)
        {
            warn!(file = %file_id, error = %e, "file watch not registered");
        }
    }

    fn refresh_state(&mut self, file_id: FileId) -> Result<bool, TexIndexError> {
        let path = self
            .files
            .get(file_id)
            .map(|row| row.absolute_path.clone())
            .ok_or_else(|| TexIndexError::InvariantViolation(format!("{file_id} missing")))?;
        let state = self.fs.file_state(&path);
        let changed = self.files.set_state(file_id, state)?;
        if changed {
            debug!(file = %file_id, ?state, "file state changed");
            self.touch();
        }
        Ok(changed)
    }

    // -------------------------------------------------------------------------
    // Node rows
    // -------------------------------------------------------------------------

    /// Insert a node row for a file already retained with `add_file`.
    ///
    /// On failure the file reference is released again.
    pub fn add_node(&mut self, draft: NodeDraft, file_id: FileId) -> Result<NodeId, TexIndexError> {
        let name = draft.name.clone();
        match self.nodes.insert(draft, file_id) {
            Ok(id) => {
                debug!(node = %name, %id, file = %file_id, "node added");
                self.touch();
                Ok(id)
            }
            Err(e) => {
                self.release_file(file_id)?;
                Err(e)
            }
        }
    }

    /// Resolve `raw_value` and insert a node for it.
    pub fn insert_node(
        &mut self,
        name: &str,
        type_name: &str,
        raw_value: &str,
        reference: Option<&str>,
    ) -> Result<NodeId, TexIndexError> {
        if self.nodes.id_of(name).is_some() {
            return Err(TexIndexError::DuplicateName(name.to_string()));
        }
        let (_, context_id) = self.context_for(reference)?;
        let resolution = {
            let context = self.contexts.get(context_id).ok_or_else(|| {
                TexIndexError::InvariantViolation(format!("context {context_id:?} missing"))
            })?;
            PathResolver::resolve(raw_value, context, self.fs.as_ref())
        };
        if !resolution.is_resolved() {
            debug!(node = name, raw = raw_value, "file unresolved, tracked as missing");
        }
        let nice_name = self
            .config
            .tracked(type_name)
            .map_or(type_name, |t| t.label())
            .to_string();
        let file_id = self.add_file(&resolution.path)?;
        self.add_node(
            NodeDraft {
                name: name.to_string(),
                type_name: type_name.to_string(),
                nice_name,
                raw_attribute: raw_value.to_string(),
                is_external_reference: reference.is_some(),
                context_id,
            },
            file_id,
        )
    }

    /// Index a host object if its type is tracked and it is not indexed yet.
    fn track_host_object(&mut self, name: &str) -> Result<Option<NodeId>, TexIndexError> {
        if self.nodes.id_of(name).is_some() {
            return Ok(None);
        }
        let type_name = self
            .host
            .object_type(name)
            .ok_or_else(|| TexIndexError::NodeNotFound(name.to_string()))?;
        let Some(attribute) = self.config.attribute_for(&type_name).map(str::to_string) else {
            return Ok(None);
        };
        let raw = self.host.get_attribute(name, &attribute).unwrap_or_default();
        let reference = if self.host.is_referenced(name) {
            self.host.reference_of(name)
        } else {
            None
        };
        self.insert_node(name, &type_name, &raw, reference.as_deref())
            .map(Some)
    }

    /// Remove a node row and release its file.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, TexIndexError> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| TexIndexError::NodeNotFound(node_id.to_string()))?;
        self.release_file(node.file_id)?;
        self.selection.prune(&node.name);
        debug!(node = %node.name, "node removed");
        self.touch();
        Ok(node)
    }

    /// Remove a node by name.
    pub fn remove(&mut self, name: &str) -> Result<Node, TexIndexError> {
        let id = self.node_id(name)?;
        let node = self.remove_node(id)?;
        self.refresh_view();
        Ok(node)
    }

    // -------------------------------------------------------------------------
    // Rename
    // -------------------------------------------------------------------------

    /// Name the host will accept for `wanted`, keeping `current`'s namespace.
    fn host_safe_name(current: &str, wanted: &str) -> Result<String, TexIndexError> {
        let wanted = wanted.trim();
        if wanted.is_empty() {
            return Err(TexIndexError::InvalidName(wanted.to_string()));
        }
        let mut name = if wanted.starts_with(|c: char| c.is_ascii_digit()) {
            format!("_{wanted}")
        } else {
            wanted.to_string()
        };
        if let Some((namespace, _)) = current.rsplit_once(':') {
            let prefix = format!("{namespace}:");
            if !name.starts_with(&prefix) {
                name.insert_str(0, &prefix);
            }
        }
        Ok(name)
    }

    fn ensure_editable(&self, name: &str) -> Result<(), TexIndexError> {
        if self.host.is_locked(name) || self.host.is_referenced(name) {
            warn!(node = name, "node is locked or referenced, change refused");
            return Err(TexIndexError::NodeLocked(name.to_string()));
        }
        Ok(())
    }

    /// Rename a node through the host. Returns the name actually assigned.
    ///
    /// Refused with `NodeLocked` for locked or referenced objects and with
    /// `DuplicateName` when another indexed node holds the name.
    pub fn rename_node(&mut self, node_id: NodeId, new_name: &str) -> Result<String, TexIndexError> {
        let current = self.node_ref(node_id)?.name.clone();
        self.ensure_editable(&current)?;
        let wanted = Self::host_safe_name(&current, new_name)?;
        if wanted == current {
            return Ok(current);
        }
        if self.nodes.id_of(&wanted).is_some_and(|holder| holder != node_id) {
            warn!(node = %current, wanted = %wanted, "rename refused, name in use");
            return Err(TexIndexError::DuplicateName(wanted));
        }

        self.defer_pending();
        let previous = std::mem::replace(&mut self.is_replaying_file, true);
        let assigned = match self.host.rename(&current, &wanted) {
            Ok(assigned) => assigned,
            Err(e) => {
                self.is_replaying_file = previous;
                warn!(node = %current, error = %e, "host refused rename");
                return Err(e);
            }
        };
        let renamed = self.nodes.rename(node_id, &assigned);
        match &renamed {
            Ok(()) => {
                self.selection.migrate(&current, &assigned);
                self.migrate_deferred(&current, &assigned);
                debug!(from = %current, to = %assigned, "node renamed");
            }
            Err(e) => {
                warn!(node = %current, error = %e, "index rename failed, reverting host");
                if let Err(revert) = self.host.rename(&assigned, &current) {
                    warn!(error = %revert, "host rename could not be reverted");
                }
            }
        }
        self.settle_echoes();
        self.is_replaying_file = previous;
        renamed?;
        self.touch();
        self.refresh_view();
        Ok(assigned)
    }

    /// Rename by current name.
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<String, TexIndexError> {
        let id = self.node_id(name)?;
        self.rename_node(id, new_name)
    }

    /// Rename a node after its file stem.
    pub fn rename_after_file(&mut self, node_id: NodeId) -> Result<String, TexIndexError> {
        let node = self.node_ref(node_id)?;
        let path = self
            .files
            .get(node.file_id)
            .map_or(node.raw_attribute.as_str(), |f| f.absolute_path.as_str());
        let stem = PathResolver::file_stem(path).to_string();
        if stem.is_empty() {
            return Ok(node.name.clone());
        }
        self.rename_node(node_id, &stem)
    }

    // -------------------------------------------------------------------------
    // Repoint
    // -------------------------------------------------------------------------

    /// Move a node to the file `raw_value` resolves to, without touching
    /// the host.
    ///
    /// Resolution and target lookup happen before any row changes.
    pub fn apply_repoint(&mut self, node_id: NodeId, raw_value: &str) -> Result<FileId, TexIndexError> {
        let (old_file, context_id) = {
            let node = self.node_ref(node_id)?;
            (node.file_id, node.context_id)
        };
        let resolution = {
            let context = self.contexts.get(context_id).ok_or_else(|| {
                TexIndexError::InvariantViolation(format!("context {context_id:?} missing"))
            })?;
            PathResolver::resolve(raw_value, context, self.fs.as_ref())
        };
        if self.files.get(old_file).is_none() {
            return Err(TexIndexError::InvariantViolation(format!("{old_file} missing")));
        }
        let existing = self.files.id_for_key(&resolution.key());

        if existing == Some(old_file) {
            self.nodes.set_file(node_id, old_file, raw_value)?;
            self.refresh_state(old_file)?;
            self.touch();
            return Ok(old_file);
        }

        let new_file = match existing {
            Some(id) => id,
            None => {
                let state = self.fs.file_state(&resolution.path);
                let id = self.files.insert(&resolution.path, state, 0);
                self.watch_file(id, &resolution.path);
                id
            }
        };
        self.release_file(old_file)?;
        self.files.retain(new_file)?;
        self.refresh_state(new_file)?;
        self.nodes.set_file(node_id, new_file, raw_value)?;

        debug!(node = %node_id, from = %old_file, to = %new_file, "node repointed");
        self.touch();
        Ok(new_file)
    }

    /// Siblings to update along with `node_id`, according to the policy.
    fn propagation_targets(
        &mut self,
        node_id: NodeId,
        cancellable: bool,
    ) -> Result<Vec<NodeId>, TexIndexError> {
        if self.is_batching {
            return Ok(Vec::new());
        }
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| TexIndexError::NodeNotFound(node_id.to_string()))?;
        let Some(file) = self.files.get(node.file_id) else {
            return Ok(Vec::new());
        };
        if file.instance_count <= 1 {
            return Ok(Vec::new());
        }
        let request = PropagationRequest {
            node: &node.name,
            file: &file.absolute_path,
            instance_count: file.instance_count,
            cancellable,
        };
        match self.policy.decide(&request) {
            Propagation::All => Ok(self
                .nodes
                .members_of(node.file_id)
                .into_iter()
                .filter(|id| *id != node_id)
                .collect()),
            Propagation::Single => Ok(Vec::new()),
            Propagation::Cancel => Err(TexIndexError::Cancelled),
        }
    }

    fn tracked_attribute(&self, node_id: NodeId) -> Result<(String, String), TexIndexError> {
        let node = self.node_ref(node_id)?;
        let attribute = self
            .config
            .attribute_for(&node.type_name)
            .ok_or_else(|| {
                TexIndexError::InvalidConfig(format!("type {} is not tracked", node.type_name))
            })?
            .to_string();
        Ok((node.name.clone(), attribute))
    }

    /// Write `raw_value` to a sibling in the host and apply it. Host
    /// refusals are logged and skipped.
    fn propagate_to(&mut self, siblings: &[NodeId], raw_value: &str) -> Vec<NodeId> {
        let mut applied = Vec::new();
        for sibling in siblings {
            let Ok((name, attribute)) = self.tracked_attribute(*sibling) else {
                continue;
            };
            if let Err(e) = self.write_attribute(&name, &attribute, raw_value) {
                warn!(node = %name, error = %e, "sibling not updated");
                continue;
            }
            match self.apply_repoint(*sibling, raw_value) {
                Ok(_) => applied.push(*sibling),
                Err(e) => warn!(node = %name, error = %e, "sibling repoint failed"),
            }
        }
        applied
    }

    /// Change a node's file path through the host.
    ///
    /// The host write happens before any row changes; if the host refuses,
    /// the index is left untouched. Returns the number of nodes repointed,
    /// siblings included.
    pub fn repoint_node(&mut self, node_id: NodeId, raw_value: &str) -> Result<usize, TexIndexError> {
        let (name, attribute) = self.tracked_attribute(node_id)?;
        self.ensure_editable(&name)?;
        let siblings = self.propagation_targets(node_id, false)?;

        self.defer_pending();
        let previous = std::mem::replace(&mut self.is_replaying_file, true);
        if let Err(e) = self.write_attribute(&name, &attribute, raw_value) {
            self.is_replaying_file = previous;
            warn!(node = %name, error = %e, "host refused write, repoint abandoned");
            return Err(e);
        }
        let result = self.apply_repoint(node_id, raw_value).map(|_| {
            let mut changed = vec![node_id];
            changed.extend(self.propagate_to(&siblings, raw_value));
            changed
        });
        self.settle_echoes();
        self.is_replaying_file = previous;

        let changed = result?;
        self.auto_rename(&changed);
        self.refresh_view();
        Ok(changed.len())
    }

    /// Repoint by name.
    pub fn repoint(&mut self, name: &str, raw_value: &str) -> Result<usize, TexIndexError> {
        let id = self.node_id(name)?;
        self.repoint_node(id, raw_value)
    }

    fn auto_rename(&mut self, changed: &[NodeId]) {
        if !self.config.auto_rename {
            return;
        }
        for id in changed {
            if let Err(e) = self.rename_after_file(*id) {
                warn!(node = %id, error = %e, "auto rename skipped");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Event ingestion
    // -------------------------------------------------------------------------

    /// Apply one host event. Returns true if the index changed.
    pub fn ingest(&mut self, event: HostEvent, mode: IngestMode) -> Result<bool, TexIndexError> {
        if mode == IngestMode::Suspended && event != HostEvent::DocumentReset {
            trace!(?event, "event dropped, callbacks suspended");
            return Ok(false);
        }
        let result = self.dispatch(event);
        self.refresh_view();
        result
    }

    /// Drain and apply every queued host event, deferred events first.
    ///
    /// Failures are logged and do not stop the pump. Returns the number of
    /// events that changed the index.
    pub fn pump(&mut self, mode: IngestMode) -> usize {
        let queued = self.host.drain_events();
        self.deferred_events.extend(queued);
        let mut applied = 0usize;
        while let Some(event) = self.deferred_events.pop_front() {
            match self.ingest(event, mode) {
                Ok(true) => applied = applied.saturating_add(1),
                Ok(false) => {}
                Err(e) if e.is_soft() => warn!(error = %e, "event not applied"),
                Err(e) => tracing::error!(error = %e, "event failed"),
            }
        }
        applied
    }

    /// Apply one file-watch event.
    pub fn ingest_watch(&mut self, event: WatchEvent, mode: IngestMode) -> Result<bool, TexIndexError> {
        if mode == IngestMode::Suspended {
            return Ok(false);
        }
        let result = match event {
            WatchEvent::FileChanged(path) => self.on_file_watch_event(&path),
            WatchEvent::DirectoryChanged(path) => self.on_directory_changed(&path),
        };
        self.refresh_view();
        result
    }

    fn dispatch(&mut self, event: HostEvent) -> Result<bool, TexIndexError> {
        match event {
            HostEvent::NodeAdded { name } => self.on_node_added(&name),
            HostEvent::NodeRemoved { name } => self.on_node_removed(&name),
            HostEvent::NodeRenamed { old_name, new_name } => {
                self.on_node_renamed(&old_name, &new_name)
            }
            HostEvent::AttributeChanged {
                name,
                attribute,
                value,
            } => self.on_attribute_changed(&name, &attribute, &value),
            HostEvent::SelectionChanged { selection } => Ok(self.on_selection_changed(&selection)),
            HostEvent::DocumentReset => self.full_reset().map(|_| true),
        }
    }

    /// Set queued host events aside before the index writes to the host.
    fn defer_pending(&mut self) {
        if self.is_replaying_file {
            return;
        }
        let queued = self.host.drain_events();
        if !queued.is_empty() {
            trace!(count = queued.len(), "host events deferred");
        }
        self.deferred_events.extend(queued);
    }

    /// Write an attribute to the host. Deferred changes of the same
    /// attribute are dropped: the host now holds this value.
    fn write_attribute(&mut self, name: &str, attribute: &str, value: &str) -> Result<(), TexIndexError> {
        self.host.set_attribute(name, attribute, value)?;
        self.deferred_events.retain(|event| {
            !matches!(
                event,
                HostEvent::AttributeChanged { name: n, attribute: a, .. } if n == name && a == attribute
            )
        });
        Ok(())
    }

    fn migrate_deferred(&mut self, old_name: &str, new_name: &str) {
        for event in &mut self.deferred_events {
            if let HostEvent::AttributeChanged { name, .. } = event {
                if *name == old_name {
                    *name = new_name.to_string();
                }
            }
        }
    }

    /// Number of host events set aside until the next `pump`.
    #[must_use]
    pub fn deferred_event_count(&self) -> usize {
        self.deferred_events.len()
    }

    /// Host echoes of writes made by the index itself.
    fn settle_echoes(&mut self) {
        for event in self.host.drain_events() {
            if let Err(e) = self.dispatch(event) {
                warn!(error = %e, "event failed while settling host echoes");
            }
        }
    }

    fn on_node_added(&mut self, name: &str) -> Result<bool, TexIndexError> {
        Ok(self.track_host_object(name)?.is_some())
    }

    fn on_node_removed(&mut self, name: &str) -> Result<bool, TexIndexError> {
        let Some(id) = self.nodes.id_of(name) else {
            return Ok(false);
        };
        self.remove_node(id)?;
        Ok(true)
    }

    fn on_node_renamed(&mut self, old_name: &str, new_name: &str) -> Result<bool, TexIndexError> {
        let Some(id) = self.nodes.id_of(old_name) else {
            return Ok(false);
        };
        self.nodes.rename(id, new_name)?;
        self.selection.migrate(old_name, new_name);
        debug!(from = old_name, to = new_name, "node renamed by host");
        self.touch();
        Ok(true)
    }

    fn on_attribute_changed(
        &mut self,
        name: &str,
        attribute: &str,
        value: &str,
    ) -> Result<bool, TexIndexError> {
        let Some(id) = self.nodes.id_of(name) else {
            return Ok(false);
        };
        let (_, tracked) = self.tracked_attribute(id)?;
        if attribute != tracked {
            return Ok(false);
        }
        if self.is_replaying_file {
            trace!(node = name, "attribute echo ignored");
            return Ok(false);
        }

        let siblings = self.propagation_targets(id, false)?;
        self.defer_pending();
        self.is_replaying_file = true;
        let result = self.apply_repoint(id, value).map(|_| {
            let mut changed = vec![id];
            changed.extend(self.propagate_to(&siblings, value));
            changed
        });
        self.settle_echoes();
        self.is_replaying_file = false;

        let changed = result?;
        self.auto_rename(&changed);
        Ok(true)
    }

    fn on_selection_changed(&mut self, selection: &[String]) -> bool {
        let types = self.tracked_type_names();
        let related =
            traversal::related_tracked(&self.host, selection, &self.config.group_type, &types);
        trace!(selected = selection.len(), related = ?related.as_ref().map(BTreeSet::len), "selection changed");
        self.selection.set(related);
        if self.view.current_filter().selection_only {
            self.view.invalidate();
        }
        true
    }

    /// Re-derive the state of the row matching `path` and re-register its
    /// watch. With auto-reload on, the host re-reads every node using it.
    pub fn on_file_watch_event(&mut self, path: &str) -> Result<bool, TexIndexError> {
        let Some(file_id) = self.files.id_for_key(&PathResolver::normalized_key(path)) else {
            return Ok(false);
        };
        if self.config.auto_reload {
            self.reload_members(file_id);
        }
        let absolute = self
            .files
            .get(file_id)
            .map(|row| row.absolute_path.clone())
            .unwrap_or_default();
        self.watch_file(file_id, &absolute);
        self.refresh_state(file_id)?;
        self.view.invalidate();
        Ok(true)
    }

    /// Re-check every non-writable row inside `dir`.
    pub fn on_directory_changed(&mut self, dir: &str) -> Result<bool, TexIndexError> {
        let candidates: Vec<(FileId, String)> = self
            .files
            .in_directory(dir)
            .into_iter()
            .filter_map(|id| self.files.get(id))
            .filter(|row| row.state != FileState::Writable)
            .map(|row| (row.id, row.absolute_path.clone()))
            .collect();
        for (id, path) in &candidates {
            self.watch_file(*id, path);
            self.refresh_state(*id)?;
        }
        if !candidates.is_empty() {
            self.view.invalidate();
        }
        Ok(!candidates.is_empty())
    }

    /// Ask the host to re-read the file of every node in a row's group.
    pub(crate) fn reload_members(&mut self, file_id: FileId) -> usize {
        let members = self.nodes.members_of(file_id);
        self.reload_nodes(&members)
    }

    pub(crate) fn reload_nodes(&mut self, node_ids: &[NodeId]) -> usize {
        self.defer_pending();
        let previous = std::mem::replace(&mut self.is_replaying_file, true);
        let mut reloaded = 0usize;
        for id in node_ids {
            let Ok((name, attribute)) = self.tracked_attribute(*id) else {
                continue;
            };
            let value = self
                .host
                .get_attribute(&name, &attribute)
                .unwrap_or_else(|| {
                    self.nodes
                        .get(*id)
                        .map(|n| n.raw_attribute.clone())
                        .unwrap_or_default()
                });
            match self.write_attribute(&name, &attribute, &value) {
                Ok(()) => reloaded = reloaded.saturating_add(1),
                Err(e) => warn!(node = %name, error = %e, "reload refused"),
            }
        }
        self.settle_echoes();
        self.is_replaying_file = previous;
        reloaded
    }

    // -------------------------------------------------------------------------
    // Batching
    // -------------------------------------------------------------------------

    /// Run `f` with derived recomputes and propagation prompts suspended,
    /// then recompute once.
    pub fn batch<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TexIndexError>,
    ) -> Result<T, TexIndexError> {
        let suspended = std::mem::replace(&mut self.suspend_derived_recompute, true);
        let batching = std::mem::replace(&mut self.is_batching, true);
        let result = f(self);
        self.suspend_derived_recompute = suspended;
        self.is_batching = batching;
        self.refresh_view();
        result
    }

    // -------------------------------------------------------------------------
    // View
    // -------------------------------------------------------------------------

    fn touch(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.view.invalidate();
    }

    /// Recompute the view if it is stale and recomputes are not suspended.
    pub fn refresh_view(&mut self) {
        if self.suspend_derived_recompute || !self.view.is_stale() {
            return;
        }
        let rows = self.rows();
        self.view.recompute(rows, &self.selection);
    }

    pub fn view(&self) -> &SortedView {
        &self.view
    }

    pub fn set_sort(&mut self, column: Column, order: SortOrder) {
        self.view.sort(column, order);
        self.refresh_view();
    }

    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.view.filter(filter);
        self.refresh_view();
    }

    /// Sort and report where the named rows ended up.
    pub fn sort_preserving(
        &mut self,
        column: Column,
        order: SortOrder,
        keep: &[String],
    ) -> Vec<Option<usize>> {
        self.set_sort(column, order);
        keep.iter().map(|name| self.view.position_of(name)).collect()
    }

    /// Every node joined with its file, in node id order.
    pub fn rows(&self) -> Vec<Row> {
        self.nodes
            .iter()
            .filter_map(|node| {
                self.files.get(node.file_id).map(|file| Row {
                    node_id: node.id,
                    name: node.name.clone(),
                    type_name: node.type_name.clone(),
                    nice_name: node.nice_name.clone(),
                    is_reference: node.is_external_reference,
                    file_id: file.id,
                    state: file.state,
                    instance_count: file.instance_count,
                    file_path: file.absolute_path.clone(),
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn node_ref(&self, node_id: NodeId) -> Result<&Node, TexIndexError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| TexIndexError::NodeNotFound(node_id.to_string()))
    }

    /// Id of a node by exact name.
    pub fn node_id(&self, name: &str) -> Result<NodeId, TexIndexError> {
        self.nodes
            .id_of(name)
            .ok_or_else(|| TexIndexError::NodeNotFound(name.to_string()))
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.by_name(name)
    }

    pub fn file(&self, file_id: FileId) -> Option<&FileRecord> {
        self.files.get(file_id)
    }

    /// File row of a node.
    pub fn file_of(&self, name: &str) -> Option<&FileRecord> {
        self.nodes
            .by_name(name)
            .and_then(|node| self.files.get(node.file_id))
    }

    /// Every node sharing the named node's file, the node included.
    pub fn instance_group(&self, name: &str) -> Vec<&Node> {
        self.nodes
            .by_name(name)
            .map(|node| {
                self.nodes
                    .members_of(node.file_id)
                    .into_iter()
                    .filter_map(|id| self.nodes.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// File rows, not counting the row of empty attribute values.
    pub fn file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|row| !row.absolute_path.is_empty())
            .count()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// File rows per state, not counting empty paths.
    pub fn state_counts(&self) -> BTreeMap<FileState, usize> {
        let mut counts = BTreeMap::new();
        for row in self.files.iter().filter(|row| !row.absolute_path.is_empty()) {
            let entry = counts.entry(row.state).or_insert(0usize);
            *entry = entry.saturating_add(1);
        }
        counts
    }

    pub fn tracked_type_names(&self) -> BTreeSet<String> {
        self.config
            .tracked_types
            .iter()
            .map(|t| t.type_name.clone())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Full node/file join in node id order.
    pub fn csv_rows(&self) -> Vec<CsvRow> {
        self.nodes
            .iter()
            .filter_map(|node| {
                self.files.get(node.file_id).map(|file| CsvRow {
                    name: node.name.clone(),
                    type_name: node.type_name.clone(),
                    is_reference: node.is_external_reference,
                    missing: file.state.is_missing(),
                    instance_count: file.instance_count,
                    file_path: file.absolute_path.clone(),
                })
            })
            .collect()
    }

    /// Write the CSV export. Returns the number of rows written.
    pub fn export_csv<O: Write>(&self, out: O) -> Result<usize, TexIndexError> {
        let scene = self.host.scene_name();
        export::write_csv(out, scene.as_deref(), &self.csv_rows())
    }

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------

    /// Check every table invariant.
    pub fn verify_invariants(&self) -> Result<(), TexIndexError> {
        let violation = |msg: String| Err(TexIndexError::InvariantViolation(msg));

        for node in self.nodes.iter() {
            if self.files.get(node.file_id).is_none() {
                return violation(format!("{} points at dead {}", node.name, node.file_id));
            }
            if self.contexts.get(node.context_id).is_none() {
                return violation(format!("{} has no context", node.name));
            }
            if self.nodes.id_of(&node.name) != Some(node.id) {
                return violation(format!("name index out of sync for {}", node.name));
            }
        }
        for file in self.files.iter() {
            if file.instance_count == 0 {
                return violation(format!("{} has no instances", file.id));
            }
            let members = self.nodes.count_for_file(file.id) as u64;
            if members != file.instance_count {
                return violation(format!(
                    "{} counts {} instances but {} nodes point at it",
                    file.id, file.instance_count, members
                ));
            }
            if self.files.id_for_key(&file.normalized_key) != Some(file.id) {
                return violation(format!("key {} is not unique", file.normalized_key));
            }
        }
        if self.nodes.referenced_files().any(|id| self.files.get(id).is_none()) {
            return violation("membership index references a dead file".into());
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FixedPolicy;
    use crate::{MemoryFileSystem, MemoryWatcher, SceneHost, SceneObject};

    const ATTR: &str = "fileTextureName";

    fn build(host: SceneHost, fs: &MemoryFileSystem) -> TextureIndex<SceneHost, MemoryWatcher> {
        TextureIndex::new(
            host,
            MemoryWatcher::new(),
            Box::new(fs.clone()),
            Box::new(FixedPolicy(Propagation::Single)),
            IndexConfig::default(),
        )
        .expect("index")
    }

    fn workspace() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new();
        fs.add_file("/ws/sourceimages/wood.png");
        fs.add_file("/ws/sourceimages/metal.png");
        fs.add_read_only("/ws/sourceimages/stone.png");
        fs
    }

    fn scene() -> SceneHost {
        let mut host = SceneHost::new("/ws");
        host.add_texture("wood", "file", ATTR, "sourceimages/wood.png");
        host.add_texture("wood1", "file", ATTR, "/ws/SourceImages/WOOD.png");
        host.add_texture("metal", "psdFileTex", ATTR, "metal.png");
        host.add_object("lambert1", SceneObject::new("lambert"));
        host
    }

    #[test]
    fn scan_deduplicates_files() {
        let fs = workspace();
        let index = build(scene(), &fs);
        assert_eq!(index.node_count(), 3);
        assert_eq!(index.file_count(), 2);
        assert_eq!(index.instance_group("wood").len(), 2);
        assert_eq!(index.file_of("wood1").map(|f| f.instance_count), Some(2));
        assert_eq!(
            index.file_of("metal").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/metal.png")
        );
        assert_eq!(index.node_by_name("metal").map(|n| n.nice_name.as_str()), Some("PSD"));
        index.verify_invariants().expect("invariants");
        assert_eq!(index.host().pending_events(), 0);
    }

    #[test]
    fn watches_follow_rows() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        assert!(index.watcher().is_watched("/ws/sourceimages/wood.png"));
        index.remove("metal").expect("remove");
        assert!(!index.watcher().is_watched("/ws/sourceimages/metal.png"));
    }

    #[test]
    fn host_events_update_tables() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .add_texture("stone", "file", ATTR, "sourceimages/stone.png");
        index.host_mut().remove_object("wood1");
        assert_eq!(index.pump(IngestMode::Live), 2);
        assert_eq!(index.file_of("stone").map(|f| f.state), Some(FileState::ReadOnly));
        assert_eq!(index.file_of("wood").map(|f| f.instance_count), Some(1));
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn suspended_mode_drops_events_but_not_resets() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index.host_mut().remove_object("wood1");
        assert_eq!(index.pump(IngestMode::Suspended), 0);
        assert_eq!(index.node_count(), 3);

        index.host_mut().reset_document();
        assert_eq!(index.pump(IngestMode::Suspended), 1);
        assert_eq!(index.node_count(), 2);
    }

    #[test]
    fn attribute_event_repoints() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .set_attribute("metal", ATTR, "sourceimages/stone.png")
            .expect("write");
        index.pump(IngestMode::Live);
        assert_eq!(
            index.file_of("metal").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/stone.png")
        );
        assert_eq!(index.file_count(), 2);
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn external_edit_queued_before_repoint_survives() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .set_attribute("metal", ATTR, "sourceimages/stone.png")
            .expect("write");
        index.repoint("wood", "sourceimages/metal.png").expect("repoint");
        assert_eq!(index.deferred_event_count(), 1);

        index.pump(IngestMode::Live);
        assert_eq!(index.deferred_event_count(), 0);
        assert_eq!(
            index.host().get_attribute("metal", ATTR).as_deref(),
            Some("sourceimages/stone.png")
        );
        assert_eq!(
            index.file_of("metal").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/stone.png")
        );
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn index_write_supersedes_queued_edit_of_same_attribute() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .set_attribute("wood", ATTR, "sourceimages/stone.png")
            .expect("write");
        index.repoint("wood", "sourceimages/metal.png").expect("repoint");
        assert_eq!(index.deferred_event_count(), 0);

        index.pump(IngestMode::Live);
        assert_eq!(
            index.host().get_attribute("wood", ATTR).as_deref(),
            Some("sourceimages/metal.png")
        );
        assert_eq!(
            index.file_of("wood").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/metal.png")
        );
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn queued_edit_follows_index_rename() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .set_attribute("metal", ATTR, "sourceimages/stone.png")
            .expect("write");
        assert_eq!(index.rename("metal", "iron").expect("rename"), "iron");

        index.pump(IngestMode::Live);
        assert_eq!(
            index.file_of("iron").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/stone.png")
        );
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn suspended_pump_drops_deferred_events() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index
            .host_mut()
            .set_attribute("metal", ATTR, "sourceimages/stone.png")
            .expect("write");
        index.repoint("wood", "sourceimages/metal.png").expect("repoint");

        assert_eq!(index.pump(IngestMode::Suspended), 0);
        assert_eq!(index.deferred_event_count(), 0);
        assert_eq!(
            index.file_of("metal").map(|f| f.absolute_path.as_str()),
            Some("/ws/sourceimages/metal.png")
        );
    }

    #[test]
    fn releasing_shared_file_refreshes_state() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        fs.add_read_only("/ws/sourceimages/wood.png");
        index.remove("wood1").expect("remove");
        let row = index.file_of("wood").cloned().expect("row kept");
        assert_eq!(row.instance_count, 1);
        assert_eq!(row.state, FileState::ReadOnly);
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn untracked_attribute_is_ignored() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        let applied = index
            .ingest(
                HostEvent::AttributeChanged {
                    name: "metal".into(),
                    attribute: "colorSpace".into(),
                    value: "sRGB".into(),
                },
                IngestMode::Live,
            )
            .expect("ingest");
        assert!(!applied);
    }

    #[test]
    fn propagation_all_moves_siblings() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index.set_policy(Box::new(FixedPolicy(Propagation::All)));
        let changed = index.repoint("wood", "sourceimages/metal.png").expect("repoint");
        assert_eq!(changed, 2);
        assert_eq!(index.file_of("metal").map(|f| f.instance_count), Some(3));
        assert_eq!(
            index.host().get_attribute("wood1", ATTR).as_deref(),
            Some("sourceimages/metal.png")
        );
        assert_eq!(index.file_count(), 1);
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn propagation_single_splits_group() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index.repoint("wood", "sourceimages/metal.png").expect("repoint");
        assert_eq!(index.file_of("wood1").map(|f| f.instance_count), Some(1));
        assert_eq!(index.file_of("metal").map(|f| f.instance_count), Some(2));
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn rejected_host_write_leaves_index_unchanged() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        let before = index.file_of("metal").cloned();
        let files_before = index.files().len();
        index.host_mut().reject_writes("metal");
        assert!(matches!(
            index.repoint("metal", "/ws/sourceimages/new.png"),
            Err(TexIndexError::HostRejected { .. })
        ));
        assert_eq!(index.file_of("metal").cloned(), before);
        assert_eq!(index.files().len(), files_before);
        assert!(!index.is_replaying_file());
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn locked_nodes_refuse_user_changes() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        index.host_mut().set_locked("metal", true);
        assert!(matches!(
            index.repoint("metal", "x.png"),
            Err(TexIndexError::NodeLocked(_))
        ));
        assert!(matches!(
            index.rename("metal", "steel"),
            Err(TexIndexError::NodeLocked(_))
        ));
        assert!(index.node_by_name("metal").is_some());
    }

    #[test]
    fn rename_rules() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        assert!(matches!(
            index.rename("wood1", "wood"),
            Err(TexIndexError::DuplicateName(_))
        ));
        assert_eq!(index.rename("wood1", "2k_oak").expect("rename"), "_2k_oak");
        assert!(index.node_by_name("_2k_oak").is_some());
        assert!(index.node_by_name("wood1").is_none());
        assert!(matches!(
            index.rename("_2k_oak", "  "),
            Err(TexIndexError::InvalidName(_))
        ));
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn rename_keeps_namespace() {
        assert_eq!(
            TextureIndex::<SceneHost, MemoryWatcher>::host_safe_name("set:wood", "oak")
                .expect("name"),
            "set:oak"
        );
        assert_eq!(
            TextureIndex::<SceneHost, MemoryWatcher>::host_safe_name("set:wood", "set:oak")
                .expect("name"),
            "set:oak"
        );
    }

    #[test]
    fn auto_rename_after_repoint() {
        let fs = workspace();
        let config = IndexConfig {
            auto_rename: true,
            ..IndexConfig::default()
        };
        let mut index = TextureIndex::new(
            scene(),
            MemoryWatcher::new(),
            Box::new(fs.clone()),
            Box::new(FixedPolicy(Propagation::Single)),
            config,
        )
        .expect("index");
        index.repoint("metal", "sourceimages/stone.png").expect("repoint");
        assert!(index.node_by_name("stone").is_some());
        assert!(index.host().object_type("stone").is_some());
        index.verify_invariants().expect("invariants");
    }

    #[test]
    fn file_watch_refreshes_state() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        fs.remove("/ws/sourceimages/metal.png");
        let changed = index
            .ingest_watch(
                WatchEvent::FileChanged("/ws/sourceimages/metal.png".into()),
                IngestMode::Live,
            )
            .expect("watch");
        assert!(changed);
        assert_eq!(index.file_of("metal").map(|f| f.state), Some(FileState::Missing));
        assert!(index.watcher().is_watched("/ws/sourceimages"));
    }

    #[test]
    fn auto_reload_replays_without_feedback() {
        let fs = workspace();
        let config = IndexConfig {
            auto_reload: true,
            ..IndexConfig::default()
        };
        let mut index = TextureIndex::new(
            scene(),
            MemoryWatcher::new(),
            Box::new(fs.clone()),
            Box::new(FixedPolicy(Propagation::All)),
            config,
        )
        .expect("index");
        let generation = index.generation();
        index
            .ingest_watch(
                WatchEvent::FileChanged("/ws/sourceimages/wood.png".into()),
                IngestMode::Live,
            )
            .expect("watch");
        assert_eq!(index.host().pending_events(), 0);
        assert_eq!(index.file_of("wood").map(|f| f.instance_count), Some(2));
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn directory_change_finds_new_file() {
        let fs = workspace();
        let mut host = scene();
        host.add_texture("bark", "file", ATTR, "/ws/sourceimages/bark.png");
        let mut index = build(host, &fs);
        assert_eq!(index.file_of("bark").map(|f| f.state), Some(FileState::Missing));

        fs.add_file("/ws/sourceimages/bark.png");
        let changed = index
            .ingest_watch(
                WatchEvent::DirectoryChanged("/ws/sourceimages".into()),
                IngestMode::Live,
            )
            .expect("watch");
        assert!(changed);
        assert_eq!(index.file_of("bark").map(|f| f.state), Some(FileState::Writable));
        assert!(index.watcher().is_watched("/ws/sourceimages/bark.png"));
    }

    #[test]
    fn empty_values_are_not_counted() {
        let fs = workspace();
        let mut host = scene();
        host.add_texture("blank", "file", ATTR, "");
        let index = build(host, &fs);
        assert_eq!(index.node_count(), 4);
        assert_eq!(index.file_count(), 2);
        assert_eq!(index.files().len(), 3);
    }

    #[test]
    fn batch_recomputes_once() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        let before = index.view().recompute_count();
        index
            .batch(|idx| {
                idx.repoint("metal", "sourceimages/stone.png")?;
                idx.repoint("wood", "sourceimages/stone.png")?;
                assert!(idx.view().is_stale());
                Ok(())
            })
            .expect("batch");
        assert_eq!(index.view().recompute_count(), before + 1);
        assert!(!index.is_recompute_suspended());
    }

    #[test]
    fn sort_preserving_reports_positions() {
        let fs = workspace();
        let mut index = build(scene(), &fs);
        let positions = index.sort_preserving(
            Column::Name,
            SortOrder::Descending,
            &["metal".to_string(), "gone".to_string()],
        );
        assert_eq!(positions, vec![Some(2), None]);
    }

    #[test]
    fn csv_export_uses_node_order() {
        let fs = workspace();
        let index = build(scene(), &fs);
        let mut out = Vec::new();
        assert_eq!(index.export_csv(&mut out).expect("export"), 3);
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("Scene UNTITLED\n"));
        assert!(text.contains("metal;psdFileTex;;;1;/ws/sourceimages/metal.png"));
    }
}
