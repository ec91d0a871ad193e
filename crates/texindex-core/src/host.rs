//! # Host Collaborator
//!
//! The host application owns the scene: objects, attributes, references and
//! the selection. The index only uses the query and mutation primitives of
//! the `Host` trait and consumes the `HostEvent`s it queues.
//!
//! `SceneHost` is an in-memory host. It can be deserialized from a scene
//! manifest and queues an event for every mutation, like a live host would
//! fire callbacks.

use crate::TexIndexError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// EVENTS
// =============================================================================

/// A discrete change reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    NodeAdded {
        name: String,
    },
    NodeRemoved {
        name: String,
    },
    NodeRenamed {
        old_name: String,
        new_name: String,
    },
    AttributeChanged {
        name: String,
        attribute: String,
        value: String,
    },
    SelectionChanged {
        selection: Vec<String>,
    },
    /// The document was loaded, cleared, or a reference was unloaded.
    DocumentReset,
}

// =============================================================================
// HOST TRAIT
// =============================================================================

/// Query and mutation primitives consumed from the host application.
pub trait Host {
    /// Names of every object of `type_name`, in a stable order.
    fn objects_of_type(&self, type_name: &str) -> Vec<String>;

    fn object_type(&self, name: &str) -> Option<String>;

    fn get_attribute(&self, name: &str, attribute: &str) -> Option<String>;

    /// Write an attribute. The host may refuse.
    fn set_attribute(&mut self, name: &str, attribute: &str, value: &str)
    -> Result<(), TexIndexError>;

    fn is_locked(&self, name: &str) -> bool;

    /// True if the object comes from an externally loaded sub-scene.
    fn is_referenced(&self, name: &str) -> bool;

    /// Reference scope an object belongs to.
    fn reference_of(&self, name: &str) -> Option<String>;

    /// File a reference scope was loaded from.
    fn reference_file(&self, reference: &str) -> Option<String>;

    /// Rename an object. Returns the name the host actually assigned.
    fn rename(&mut self, name: &str, new_name: &str) -> Result<String, TexIndexError>;

    /// Root directory of the active workspace.
    fn workspace_root(&self) -> String;

    /// Resource subfolder declared by the active workspace, if any.
    fn resource_folder_rule(&self) -> Option<String>;

    /// Name of the open document, `None` when unsaved.
    fn scene_name(&self) -> Option<String>;

    /// Objects fed by `name`.
    fn downstream(&self, name: &str) -> Vec<String>;

    /// Objects feeding `name`.
    fn upstream(&self, name: &str) -> Vec<String>;

    /// Currently selected objects.
    fn selection(&self) -> Vec<String>;

    /// Take every queued event, oldest first.
    fn drain_events(&mut self) -> Vec<HostEvent>;
}

// =============================================================================
// SCENE HOST
// =============================================================================

/// An object of the in-memory scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneObject {
    pub type_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub locked: bool,
    /// Reference scope, for objects loaded from a sub-scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl SceneObject {
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            attributes: BTreeMap::new(),
            locked: false,
            reference: None,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: &str, value: &str) -> Self {
        self.attributes
            .insert(attribute.to_string(), value.to_string());
        self
    }
}

/// In-memory host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneHost {
    #[serde(default)]
    pub scene_name: Option<String>,
    pub workspace_root: String,
    #[serde(default)]
    pub resource_folder: Option<String>,
    #[serde(default)]
    pub objects: BTreeMap<String, SceneObject>,
    /// reference scope -> file it was loaded from
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    /// object -> objects it feeds
    #[serde(default)]
    pub connections: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub selection: Vec<String>,
    #[serde(skip)]
    events: VecDeque<HostEvent>,
    #[serde(skip)]
    rejecting: BTreeSet<String>,
}

impl SceneHost {
    #[must_use]
    pub fn new(workspace_root: &str) -> Self {
        Self {
            workspace_root: workspace_root.to_string(),
            ..Self::default()
        }
    }

    /// Add an object and queue `NodeAdded`.
    pub fn add_object(&mut self, name: &str, object: SceneObject) {
        self.objects.insert(name.to_string(), object);
        self.events.push_back(HostEvent::NodeAdded {
            name: name.to_string(),
        });
    }

    /// Add an object carrying one attribute.
    pub fn add_texture(&mut self, name: &str, type_name: &str, attribute: &str, value: &str) {
        self.add_object(name, SceneObject::new(type_name).with_attribute(attribute, value));
    }

    /// Register a reference scope loaded from `file`.
    pub fn add_reference(&mut self, reference: &str, file: &str) {
        self.references
            .insert(reference.to_string(), file.to_string());
    }

    /// Remove an object and its connections, queueing `NodeRemoved`.
    pub fn remove_object(&mut self, name: &str) -> bool {
        if self.objects.remove(name).is_none() {
            return false;
        }
        self.connections.remove(name);
        for targets in self.connections.values_mut() {
            targets.remove(name);
        }
        self.selection.retain(|selected| selected != name);
        self.events.push_back(HostEvent::NodeRemoved {
            name: name.to_string(),
        });
        true
    }

    /// Add a `from -> to` connection.
    pub fn connect(&mut self, from: &str, to: &str) {
        self.connections
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn set_locked(&mut self, name: &str, locked: bool) {
        if let Some(object) = self.objects.get_mut(name) {
            object.locked = locked;
        }
    }

    /// Make every later write to `name` fail with `HostRejected`.
    pub fn reject_writes(&mut self, name: &str) {
        self.rejecting.insert(name.to_string());
    }

    pub fn accept_writes(&mut self, name: &str) {
        self.rejecting.remove(name);
    }

    /// Replace the selection and queue `SelectionChanged`.
    pub fn select(&mut self, names: &[&str]) {
        self.selection = names.iter().map(|name| (*name).to_string()).collect();
        self.events.push_back(HostEvent::SelectionChanged {
            selection: self.selection.clone(),
        });
    }

    /// Queue `DocumentReset`, as after a load or a reference unload.
    pub fn reset_document(&mut self) {
        self.events.clear();
        self.events.push_back(HostEvent::DocumentReset);
    }

    /// Number of queued events.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// First free name derived from `wanted`: trailing digits are replaced
    /// by the smallest counter that does not collide.
    fn unique_name(&self, wanted: &str, current: &str) -> String {
        if wanted == current || !self.objects.contains_key(wanted) {
            return wanted.to_string();
        }
        let base = wanted.trim_end_matches(|c: char| c.is_ascii_digit());
        (1u64..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !self.objects.contains_key(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }
}

impl Host for SceneHost {
    fn objects_of_type(&self, type_name: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, object)| object.type_name == type_name)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn object_type(&self, name: &str) -> Option<String> {
        self.objects.get(name).map(|object| object.type_name.clone())
    }

    fn get_attribute(&self, name: &str, attribute: &str) -> Option<String> {
        self.objects
            .get(name)
            .and_then(|object| object.attributes.get(attribute).cloned())
    }

    fn set_attribute(
        &mut self,
        name: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), TexIndexError> {
        if self.rejecting.contains(name) {
            return Err(TexIndexError::HostRejected {
                name: name.to_string(),
                reason: "write refused".into(),
            });
        }
        let object = self
            .objects
            .get_mut(name)
            .ok_or_else(|| TexIndexError::NodeNotFound(name.to_string()))?;
        if object.locked {
            return Err(TexIndexError::NodeLocked(name.to_string()));
        }
        object
            .attributes
            .insert(attribute.to_string(), value.to_string());
        self.events.push_back(HostEvent::AttributeChanged {
            name: name.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn is_locked(&self, name: &str) -> bool {
        self.objects.get(name).is_some_and(|object| object.locked)
    }

    fn is_referenced(&self, name: &str) -> bool {
        self.objects
            .get(name)
            .is_some_and(|object| object.reference.is_some())
    }

    fn reference_of(&self, name: &str) -> Option<String> {
        self.objects.get(name).and_then(|object| object.reference.clone())
    }

    fn reference_file(&self, reference: &str) -> Option<String> {
        self.references.get(reference).cloned()
    }

    fn rename(&mut self, name: &str, new_name: &str) -> Result<String, TexIndexError> {
        if self.rejecting.contains(name) {
            return Err(TexIndexError::HostRejected {
                name: name.to_string(),
                reason: "rename refused".into(),
            });
        }
        match self.objects.get(name) {
            None => return Err(TexIndexError::NodeNotFound(name.to_string())),
            Some(object) if object.locked || object.reference.is_some() => {
                return Err(TexIndexError::NodeLocked(name.to_string()));
            }
            Some(_) => {}
        }
        let assigned = self.unique_name(new_name, name);
        if assigned == name {
            return Ok(assigned);
        }
        if let Some(object) = self.objects.remove(name) {
            self.objects.insert(assigned.clone(), object);
        }
        if let Some(targets) = self.connections.remove(name) {
            self.connections.insert(assigned.clone(), targets);
        }
        for targets in self.connections.values_mut() {
            if targets.remove(name) {
                targets.insert(assigned.clone());
            }
        }
        for selected in &mut self.selection {
            if selected == name {
                selected.clone_from(&assigned);
            }
        }
        self.events.push_back(HostEvent::NodeRenamed {
            old_name: name.to_string(),
            new_name: assigned.clone(),
        });
        Ok(assigned)
    }

    fn workspace_root(&self) -> String {
        self.workspace_root.clone()
    }

    fn resource_folder_rule(&self) -> Option<String> {
        self.resource_folder.clone()
    }

    fn scene_name(&self) -> Option<String> {
        self.scene_name.clone()
    }

    fn downstream(&self, name: &str) -> Vec<String> {
        self.connections
            .get(name)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn upstream(&self, name: &str) -> Vec<String> {
        self.connections
            .iter()
            .filter(|(_, targets)| targets.contains(name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    fn selection(&self) -> Vec<String> {
        self.selection.clone()
    }

    fn drain_events(&mut self) -> Vec<HostEvent> {
        self.events.drain(..).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
