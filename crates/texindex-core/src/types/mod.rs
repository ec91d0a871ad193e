//! # Core Type Definitions
//!
//! This module contains the row types of the texture index:
//! - Row identifiers (`NodeId`, `FileId`, `ContextId`)
//! - Rows (`Node`, `FileRecord`, `ReferenceContext`)
//! - File access state (`FileState`)
//! - Error types (`TexIndexError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so every table can live in a `BTreeMap`.
//! Counters use saturating arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ROW IDENTIFIERS
// =============================================================================

/// Identifier of a tracked node row.
/// Never reused while the index is alive, not even across a full reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of a deduplicated file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u64);

/// Identifier of a reference context row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

// =============================================================================
// FILE STATE
// =============================================================================

/// Access state of a file on disk.
///
/// Ordered so that sorting by state puts missing files first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Not found, or the path names a directory.
    #[default]
    Missing,
    /// Exists but cannot be written.
    ReadOnly,
    /// Exists and is writable.
    Writable,
}

impl FileState {
    /// Integer code used by the tabular read model: -1, 0 or 1.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Missing => -1,
            Self::ReadOnly => 0,
            Self::Writable => 1,
        }
    }

    #[must_use]
    pub const fn is_missing(self) -> bool {
        matches!(self, Self::Missing)
    }
}

// =============================================================================
// NODE
// =============================================================================

/// One tracked asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Unique display identifier assigned by the host.
    pub name: String,
    /// Host object type.
    pub type_name: String,
    /// Short display label of the type.
    pub nice_name: String,
    /// Unresolved value currently stored on the host object.
    pub raw_attribute: String,
    /// True if the node comes from an externally loaded sub-scene.
    pub is_external_reference: bool,
    pub context_id: ContextId,
    pub file_id: FileId,
}

// =============================================================================
// FILE RECORD
// =============================================================================

/// A deduplicated file resource shared by one or more nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Case-folded, separator-normalized absolute path. Unique across rows.
    pub normalized_key: String,
    /// Resolved path as first seen, normalized but with its case preserved.
    pub absolute_path: String,
    pub state: FileState,
    /// Number of live nodes pointing at this row.
    pub instance_count: u64,
}

impl FileRecord {
    /// Increment the instance count using saturating arithmetic.
    pub fn retain(&mut self) {
        self.instance_count = self.instance_count.saturating_add(1);
    }

    /// Decrement the instance count. Returns the new count.
    pub fn release(&mut self) -> u64 {
        self.instance_count = self.instance_count.saturating_sub(1);
        self.instance_count
    }
}

// =============================================================================
// REFERENCE CONTEXT
// =============================================================================

/// A named root used to resolve relative attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceContext {
    pub id: ContextId,
    /// Unique name. `ROOT` identifies the primary workspace.
    pub name: String,
    pub root_path: String,
    /// Directory, relative to `root_path`, holding loose resources.
    pub resource_subfolder: String,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the texture index.
///
/// - Soft failures leave the index unchanged and are safe to show as warnings
/// - The index never panics; every error is recoverable
#[derive(Debug, Error)]
pub enum TexIndexError {
    /// No live node carries this name.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The host object is locked or externally referenced.
    #[error("Node is locked or referenced: {0}")]
    NodeLocked(String),

    /// The rename target is already held by another live node.
    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// The rename target is empty.
    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    /// Resolution exhausted every rule.
    #[error("File cannot be resolved: {0}")]
    FileUnresolvable(String),

    /// The file watcher refused a path. The index is still consistent.
    #[error("Watch registration failed for {path}: {reason}")]
    WatchRegistrationFailed { path: String, reason: String },

    /// The host refused a write; the mutation was rolled back.
    #[error("Host rejected write on {name}: {reason}")]
    HostRejected { name: String, reason: String },

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A text filter could not be compiled.
    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(String),

    /// A table invariant does not hold.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// A bulk operation was cancelled by the propagation policy.
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl TexIndexError {
    /// True for failures that are reported as warnings rather than errors.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::NodeLocked(_)
                | Self::DuplicateName(_)
                | Self::InvalidName(_)
                | Self::FileUnresolvable(_)
                | Self::WatchRegistrationFailed { .. }
                | Self::HostRejected { .. }
                | Self::Cancelled
        )
    }
}

impl From<std::io::Error> for TexIndexError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
