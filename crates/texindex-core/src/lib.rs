//! # texindex-core
//!
//! In-memory texture reference index for a host scene graph.
//!
//! The index tracks every texture node of a host scene, the file each one
//! points at, and the reference scope it was loaded from. Files are
//! deduplicated by a normalized, case-folded key and carry an instance
//! count; the index stays consistent while the host, the file system and
//! the user mutate things underneath it.
//!
//! ## Layout
//!
//! - `types`, `primitives`: ids, rows, the error enum, constants
//! - `resolver`, `context`: path normalization and multi-rule resolution
//! - `tables`: the node and file tables
//! - `host`, `fs`, `watch`: collaborator seams with in-memory implementations
//! - `policy`, `selection`, `traversal`: propagation prompts and selection
//! - `index`, `bulk`: the orchestrator and its operations
//! - `view`, `export`: sorted read model and CSV output
//!
//! ## Constraints
//!
//! - Single-threaded, no async, no network
//! - `BTreeMap`/`BTreeSet` only, so iteration order is deterministic

// =============================================================================
// MODULES
// =============================================================================

pub mod bulk;
pub mod config;
pub mod context;
pub mod export;
pub mod fs;
pub mod host;
pub mod index;
pub mod policy;
pub mod primitives;
pub mod resolver;
pub mod selection;
pub mod tables;
pub mod traversal;
pub mod types;
pub mod view;
pub mod watch;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ContextId, FileId, FileRecord, FileState, Node, NodeId, ReferenceContext, TexIndexError,
};

// =============================================================================
// RE-EXPORTS: Index
// =============================================================================

pub use config::{IndexConfig, TrackedType};
pub use context::{Discovery, ReferenceContextStore};
pub use index::{IngestMode, TextureIndex};
pub use resolver::{PathResolver, Resolution, ResolveRule};
pub use tables::{FileTable, NodeDraft, NodeTable};

// =============================================================================
// RE-EXPORTS: Collaborators
// =============================================================================

pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use host::{Host, HostEvent, SceneHost, SceneObject};
pub use policy::{
    CachedPolicy, FixedPolicy, Propagation, PropagationPolicy, PropagationPrompt,
    PropagationRequest, PropagationScope,
};
pub use selection::Selection;
pub use watch::{FileWatcher, MemoryWatcher, WatchEvent, WatchLedger};

// =============================================================================
// RE-EXPORTS: Read Model
// =============================================================================

pub use export::{CsvRow, write_csv};
pub use view::{CellValue, Column, FilterTarget, Row, SortOrder, SortedView, TextFilter, ViewFilter};
