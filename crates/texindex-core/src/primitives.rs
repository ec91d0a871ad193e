//! # Index Primitives
//!
//! Fixed constants of the texture index.
//! These are compiled into the binary; the tunable subset is mirrored by
//! `IndexConfig` defaults.

/// Name of the context that resolves paths against the primary workspace.
///
/// Created once when the index is initialised and re-seeded on full reset.
pub const ROOT_CONTEXT: &str = "ROOT";

/// Resource subfolder used when a workspace declares none.
pub const DEFAULT_RESOURCE_SUBFOLDER: &str = "sourceimages";

/// File whose presence marks the root of a workspace.
pub const WORKSPACE_MARKER: &str = "workspace.mel";

/// Maximum number of parent directories walked while looking for a
/// workspace marker.
///
/// - Keeps discovery bounded on deep or cyclic mounts.
pub const MARKER_SEARCH_DEPTH: usize = 32;

/// Maximum size of a workspace marker file read during discovery.
pub const MAX_MARKER_SIZE: u64 = 1024 * 1024;

/// Default lifetime of a time-boxed propagation answer, in seconds.
pub const PROPAGATION_WINDOW_SECS: u64 = 30;

/// Placeholder replaced by the workspace root in source-folder patterns.
pub const WORKSPACE_KEY: &str = "<WORKSPACE>";

/// Default source-folder pattern searched for editable texture sources.
pub const DEFAULT_SOURCE_FOLDER: &str = "<WORKSPACE>/PSD/";

/// Extension of editable texture sources.
pub const SOURCE_EXTENSION: &str = "psd";

/// Host object type whose members group shading networks.
pub const DEFAULT_GROUP_TYPE: &str = "shadingEngine";

/// Maximum traversal depth for selection queries.
///
/// - All traversals must be computationally bounded.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Scene label used by the CSV export when the host document is unsaved.
pub const UNTITLED_SCENE: &str = "Scene UNTITLED";

/// Header line of the CSV export.
pub const CSV_HEADER: &str = "NODE NAME;NODE TYPE;IS REF;MISSING;INSTANCE COUNT;FILE PATH";

/// Field separator of the CSV export.
pub const CSV_SEPARATOR: char = ';';
