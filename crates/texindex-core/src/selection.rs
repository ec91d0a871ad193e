//! # Selection Tracking
//!
//! Volatile set of node names driving the "show only selection" filter.
//! `None` means no filter is active; an empty set means the filter is
//! active and matches nothing.

use std::collections::BTreeSet;

/// Session-local selection filter.
///
/// - Never serialized
/// - Migrated when a node is renamed
/// - Pruned when a node is removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    names: Option<BTreeSet<String>>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter. `None` disables it.
    pub fn set(&mut self, names: Option<BTreeSet<String>>) {
        self.names = names;
    }

    pub fn clear(&mut self) {
        self.names = None;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.names.is_some()
    }

    /// True if no filter is active or `name` is part of it.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        self.names.as_ref().is_none_or(|names| names.contains(name))
    }

    #[must_use]
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        self.names.as_ref()
    }

    /// Follow a rename. Returns true if the old name was held.
    pub fn migrate(&mut self, old_name: &str, new_name: &str) -> bool {
        match self.names.as_mut() {
            Some(names) => {
                if !names.remove(old_name) {
                    return false;
                }
                names.insert(new_name.to_string());
                true
            }
            None => false,
        }
    }

    /// Forget a removed node.
    pub fn prune(&mut self, name: &str) {
        if let Some(names) = self.names.as_mut() {
            names.remove(name);
        }
    }
}
