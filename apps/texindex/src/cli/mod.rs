//! # texindex CLI Module
//!
//! This module implements the CLI interface for texindex.
//!
//! ## Available Commands
//!
//! - `status` - Show index counts for a scene
//! - `list` - Print the sorted, filtered table
//! - `export` - Write the CSV report
//! - `repoint` - Point a node at another file
//! - `rename` - Rename a node, by default after its file
//! - `match-names` - Rename nodes after their files
//! - `relative` / `absolute` - Rewrite stored paths
//! - `retarget` - Move references into another directory
//! - `copy` - Copy files into the workspace resource folder
//! - `toggle-read-only` - Flip the write permission of files
//! - `reload` - Re-read files in the host
//! - `source` - Find the editable source of a texture
//! - `check` - Verify table invariants
//! - `watch` - Follow file changes on disk until interrupted

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use texindex_core::TexIndexError;

pub use commands::*;

/// Manifest used when neither `--scene` nor `TEXINDEX_SCENE` is set.
pub const DEFAULT_SCENE: &str = "scene.json";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// texindex - texture reference index
///
/// Tracks every file a scene points at, resolves the paths and keeps the
/// references consistent while they are edited.
#[derive(Parser, Debug)]
#[command(name = "texindex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Scene manifest (defaults to $TEXINDEX_SCENE, then scene.json)
    #[arg(short, long, global = true)]
    pub scene: Option<PathBuf>,

    /// Index configuration in TOML (defaults to $TEXINDEX_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// How edits on shared files spread to the other nodes
    #[arg(short, long, global = true, value_enum, default_value_t = PropagateMode::Ask)]
    pub propagate: PropagateMode,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Answer given when a change touches a file shared by several nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PropagateMode {
    /// Prompt on the terminal, remembering the answer per configuration
    Ask,
    /// Apply to every node sharing the file
    All,
    /// Apply to the edited node only
    Single,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show index counts
    Status,

    /// Print the texture table
    List {
        /// Sort column (name, type, ref, state, count, file)
        #[arg(long, default_value = "name")]
        sort: String,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Text filter, `*` and `?` as wildcards
        #[arg(short, long)]
        filter: Option<String>,

        /// Treat the filter as a regular expression
        #[arg(long)]
        regex: bool,

        /// Match the filter against file paths instead of node names
        #[arg(long)]
        by_file: bool,

        /// Only rows whose file is writable
        #[arg(long)]
        writable_only: bool,

        /// Hide nodes loaded from referenced scenes
        #[arg(long)]
        hide_references: bool,

        /// Only nodes not named after their file
        #[arg(long)]
        mismatched_names: bool,

        /// One row per file
        #[arg(long)]
        one_per_file: bool,

        /// Only the host selection
        #[arg(long)]
        selected: bool,

        /// Use long column headers
        #[arg(long)]
        long_headers: bool,
    },

    /// Export the table as CSV
    Export {
        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Point a node at another file
    Repoint {
        /// Node name
        node: String,

        /// New attribute value, absolute or relative
        value: String,
    },

    /// Rename a node
    Rename {
        /// Node name
        node: String,

        /// New name (the file stem when omitted)
        new_name: Option<String>,
    },

    /// Rename nodes after their files
    MatchNames {
        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Store workspace-relative paths
    Relative {
        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Store absolute paths
    Absolute {
        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Point nodes at the same file name in another directory
    Retarget {
        /// Target directory
        #[arg(short, long)]
        dir: String,

        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Copy files into the workspace resource folder
    Copy {
        /// Replace files already present in the resource folder
        #[arg(long)]
        overwrite: bool,

        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Flip the write permission of files
    ToggleReadOnly {
        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Re-read files in the host
    Reload {
        /// Node names (every node when omitted)
        nodes: Vec<String>,
    },

    /// Find the editable source of a texture
    Source {
        /// Node name
        node: String,
    },

    /// Verify table invariants
    Check,

    /// Follow file changes until interrupted
    Watch,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TexIndexError> {
    let args = SceneArgs::from_cli(&cli);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Status) => cmd_status(&args, json_mode),
        Some(Commands::List {
            sort,
            desc,
            filter,
            regex,
            by_file,
            writable_only,
            hide_references,
            mismatched_names,
            one_per_file,
            selected,
            long_headers,
        }) => {
            let options = ListOptions {
                sort,
                descending: desc,
                filter,
                regex,
                by_file,
                writable_only,
                hide_references,
                mismatched_names,
                one_per_file,
                selected,
                long_headers,
            };
            cmd_list(&args, json_mode, &options)
        }
        Some(Commands::Export { output }) => cmd_export(&args, output.as_deref()),
        Some(Commands::Repoint { node, value }) => cmd_repoint(&args, json_mode, &node, &value),
        Some(Commands::Rename { node, new_name }) => {
            cmd_rename(&args, json_mode, &node, new_name.as_deref())
        }
        Some(Commands::MatchNames { nodes }) => cmd_match_names(&args, json_mode, &nodes),
        Some(Commands::Relative { nodes }) => cmd_bulk(&args, json_mode, &nodes, BulkOp::Relative),
        Some(Commands::Absolute { nodes }) => cmd_bulk(&args, json_mode, &nodes, BulkOp::Absolute),
        Some(Commands::Retarget { dir, nodes }) => {
            cmd_bulk(&args, json_mode, &nodes, BulkOp::Retarget(dir))
        }
        Some(Commands::Copy { overwrite, nodes }) => {
            cmd_bulk(&args, json_mode, &nodes, BulkOp::Copy { overwrite })
        }
        Some(Commands::ToggleReadOnly { nodes }) => {
            cmd_bulk(&args, json_mode, &nodes, BulkOp::ToggleReadOnly)
        }
        Some(Commands::Reload { nodes }) => cmd_bulk(&args, json_mode, &nodes, BulkOp::Reload),
        Some(Commands::Source { node }) => cmd_source(&args, json_mode, &node),
        Some(Commands::Check) => cmd_check(&args, json_mode),
        Some(Commands::Watch) => cmd_watch(&args, json_mode).await,
        None => cmd_status(&args, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================
