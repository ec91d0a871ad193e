//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//! Every command loads the scene manifest into an in-memory host, builds an
//! index over the real file system, and writes the manifest back when it
//! edited the scene.

use super::{Cli, DEFAULT_SCENE, PropagateMode};
use crate::manifest;
use crate::watcher::NotifyWatcher;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use texindex_core::{
    CachedPolicy, Column, FileState, FileWatcher, FilterTarget, FixedPolicy, Host, HostEvent,
    IndexConfig, IngestMode, MemoryWatcher, NodeId, OsFileSystem, Propagation, PropagationPolicy,
    PropagationRequest, SceneHost, SortOrder, SortedView, TexIndexError, TextFilter, TextureIndex,
    ViewFilter, export::scene_label,
};
use tokio::sync::mpsc;

// =============================================================================
// SCENE ARGUMENTS
// =============================================================================

/// Inputs shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneArgs {
    pub scene: PathBuf,
    pub config: Option<PathBuf>,
    pub propagate: PropagateMode,
}

impl SceneArgs {
    /// Flags first, then `TEXINDEX_SCENE` / `TEXINDEX_CONFIG`.
    pub fn from_cli(cli: &Cli) -> Self {
        let scene = cli
            .scene
            .clone()
            .or_else(|| std::env::var_os("TEXINDEX_SCENE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENE));
        let config = cli
            .config
            .clone()
            .or_else(|| std::env::var_os("TEXINDEX_CONFIG").map(PathBuf::from));
        Self {
            scene,
            config,
            propagate: cli.propagate,
        }
    }
}

/// Load the configuration, or the defaults when none is given.
pub fn load_config(args: &SceneArgs) -> Result<IndexConfig, TexIndexError> {
    match &args.config {
        Some(path) => IndexConfig::load(path),
        None => Ok(IndexConfig::default()),
    }
}

/// Policy for `mode`. `Ask` caches answers per the configured scope.
pub fn build_policy(mode: PropagateMode, config: &IndexConfig) -> Box<dyn PropagationPolicy> {
    match mode {
        PropagateMode::All => Box::new(FixedPolicy(Propagation::All)),
        PropagateMode::Single => Box::new(FixedPolicy(Propagation::Single)),
        PropagateMode::Ask => Box::new(CachedPolicy::new(
            ask_on_terminal,
            config.propagation_scope,
            Duration::from_secs(config.propagation_window_secs),
        )),
    }
}

fn ask_on_terminal(request: &PropagationRequest<'_>) -> Propagation {
    let others = request.instance_count.saturating_sub(1);
    let choices = if request.cancellable {
        "[a]ll / [s]ingle / [c]ancel"
    } else {
        "[a]ll / [s]ingle"
    };
    eprint!(
        "{} shares {} with {others} other node(s). Apply to {choices}? ",
        request.node, request.file
    );
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return Propagation::Single;
    }
    parse_answer(&answer, request.cancellable)
}

/// Terminal answer to a propagation prompt. Anything unrecognised is
/// `Single`.
pub fn parse_answer(answer: &str, cancellable: bool) -> Propagation {
    match answer.trim().to_ascii_lowercase().as_str() {
        "a" | "all" => Propagation::All,
        "c" | "cancel" if cancellable => Propagation::Cancel,
        _ => Propagation::Single,
    }
}

/// Load the manifest and index it.
pub fn open_index<W: FileWatcher>(
    args: &SceneArgs,
    watcher: W,
) -> Result<TextureIndex<SceneHost, W>, TexIndexError> {
    let config = load_config(args)?;
    let host = manifest::load(&args.scene)?;
    let policy = build_policy(args.propagate, &config);
    TextureIndex::new(host, watcher, Box::new(OsFileSystem), policy, config)
}

/// Write the host back to the manifest.
pub fn save_scene<W: FileWatcher>(
    args: &SceneArgs,
    index: &TextureIndex<SceneHost, W>,
) -> Result<(), TexIndexError> {
    manifest::save(&args.scene, index.host())
}

/// Ids of the named nodes and, if the policy says so, their siblings.
/// An empty list selects every node.
fn select_nodes<W: FileWatcher>(
    index: &mut TextureIndex<SceneHost, W>,
    names: &[String],
) -> Result<Vec<NodeId>, TexIndexError> {
    if names.is_empty() {
        return Ok(index.nodes().iter().map(|node| node.id).collect());
    }
    index.expand_instances(names)
}

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TexIndexError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        TexIndexError::IoError(format!(
            "Invalid output directory '{}': {e}",
            parent.display()
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(TexIndexError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| TexIndexError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Summary printed by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub scene: String,
    pub workspace_root: String,
    pub nodes: usize,
    pub files: usize,
    pub contexts: usize,
    pub missing: usize,
    pub read_only: usize,
    pub writable: usize,
    pub tracked_types: Vec<String>,
}

impl StatusReport {
    pub fn from_index<W: FileWatcher>(index: &TextureIndex<SceneHost, W>) -> Self {
        let states = index.state_counts();
        let count = |state: FileState| states.get(&state).copied().unwrap_or(0);
        Self {
            scene: scene_label(index.host().scene_name().as_deref()),
            workspace_root: index.host().workspace_root(),
            nodes: index.node_count(),
            files: index.file_count(),
            contexts: index.context_count(),
            missing: count(FileState::Missing),
            read_only: count(FileState::ReadOnly),
            writable: count(FileState::Writable),
            tracked_types: index.tracked_type_names().into_iter().collect(),
        }
    }
}

/// Show index counts.
pub fn cmd_status(args: &SceneArgs, json_mode: bool) -> Result<(), TexIndexError> {
    let index = open_index(args, MemoryWatcher::new())?;
    let report = StatusReport::from_index(&index);

    if json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("texindex Status");
    println!("===============");
    println!("Scene:     {}", report.scene);
    println!("Workspace: {}", report.workspace_root);
    println!();
    println!("Nodes:     {}", report.nodes);
    println!("Files:     {}", report.files);
    println!("Contexts:  {}", report.contexts);
    println!();
    println!("Missing:   {}", report.missing);
    println!("Read-only: {}", report.read_only);
    println!("Writable:  {}", report.writable);
    println!("Types:     {}", report.tracked_types.join(", "));

    Ok(())
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// Table options of `list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort: String,
    pub descending: bool,
    pub filter: Option<String>,
    pub regex: bool,
    pub by_file: bool,
    pub writable_only: bool,
    pub hide_references: bool,
    pub mismatched_names: bool,
    pub one_per_file: bool,
    pub selected: bool,
    pub long_headers: bool,
}

impl ListOptions {
    /// Sort key and view filter described by these options.
    pub fn view_settings(&self) -> Result<(Column, SortOrder, ViewFilter), TexIndexError> {
        let column: Column = self.sort.parse()?;
        let order = if self.descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        let target = if self.by_file {
            FilterTarget::File
        } else {
            FilterTarget::Name
        };
        let text = match &self.filter {
            Some(pattern) if self.regex => Some(TextFilter::regex(pattern, target)?),
            Some(pattern) => Some(TextFilter::wildcard(pattern, target)?),
            None => None,
        };
        let filter = ViewFilter {
            writable_only: self.writable_only,
            hide_references: self.hide_references,
            mismatched_names_only: self.mismatched_names,
            one_per_file: self.one_per_file,
            selection_only: self.selected,
            pinned: None,
            text,
        };
        Ok((column, order, filter))
    }
}

/// Print the texture table.
pub fn cmd_list(
    args: &SceneArgs,
    json_mode: bool,
    options: &ListOptions,
) -> Result<(), TexIndexError> {
    let (column, order, filter) = options.view_settings()?;
    let mut index = open_index(args, MemoryWatcher::new())?;

    if options.selected {
        let selection = index.host().selection();
        index.ingest(HostEvent::SelectionChanged { selection }, IngestMode::Live)?;
    }
    index.set_filter(filter);
    index.set_sort(column, order);
    let view = index.view();

    if json_mode {
        print_json(&view.rows());
        return Ok(());
    }

    let headers = SortedView::headers(options.long_headers);
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    let mut lines = Vec::with_capacity(view.row_count());
    for row in view.rows() {
        let cells: Vec<String> = Column::ALL.iter().map(|c| row.cell(*c).to_string()).collect();
        for (width, cell) in widths.iter_mut().zip(&cells) {
            *width = (*width).max(cell.chars().count());
        }
        lines.push(cells);
    }

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let header: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    println!("{}", render(&header));
    for cells in &lines {
        println!("{}", render(cells));
    }
    println!();
    println!("{} of {} node(s)", view.row_count(), index.node_count());

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write the CSV report to `output`, or to stdout.
pub fn cmd_export(args: &SceneArgs, output: Option<&Path>) -> Result<(), TexIndexError> {
    let index = open_index(args, MemoryWatcher::new())?;

    match output {
        Some(path) => {
            let validated = validate_output_path(path)?;
            let file = std::fs::File::create(&validated)?;
            let rows = index.export_csv(std::io::BufWriter::new(file))?;
            println!("Exported {rows} row(s) to {}", validated.display());
        }
        None => {
            index.export_csv(std::io::stdout().lock())?;
        }
    }

    Ok(())
}

// =============================================================================
// EDIT COMMANDS
// =============================================================================

/// Point a node at another file.
pub fn cmd_repoint(
    args: &SceneArgs,
    json_mode: bool,
    node: &str,
    value: &str,
) -> Result<(), TexIndexError> {
    let mut index = open_index(args, MemoryWatcher::new())?;
    let propagated = index.repoint(node, value)?;
    save_scene(args, &index)?;

    let file = index
        .file_of(node)
        .map(|f| f.absolute_path.clone())
        .unwrap_or_default();
    if json_mode {
        print_json(&serde_json::json!({
            "node": node,
            "value": value,
            "file": file,
            "propagated": propagated,
        }));
    } else {
        println!("{node} -> {file}");
        if propagated > 0 {
            println!("Also updated {propagated} node(s) sharing the previous file");
        }
    }

    Ok(())
}

/// Rename a node, after its file when no name is given.
pub fn cmd_rename(
    args: &SceneArgs,
    json_mode: bool,
    node: &str,
    new_name: Option<&str>,
) -> Result<(), TexIndexError> {
    let mut index = open_index(args, MemoryWatcher::new())?;
    let assigned = match new_name {
        Some(name) => index.rename(node, name)?,
        None => {
            let id = index.node_id(node)?;
            index.rename_after_file(id)?
        }
    };
    save_scene(args, &index)?;

    if json_mode {
        print_json(&serde_json::json!({ "old_name": node, "new_name": assigned }));
    } else {
        println!("{node} -> {assigned}");
    }

    Ok(())
}

/// Rename each node after its file.
pub fn cmd_match_names(
    args: &SceneArgs,
    json_mode: bool,
    nodes: &[String],
) -> Result<(), TexIndexError> {
    let mut index = open_index(args, MemoryWatcher::new())?;
    let ids = select_nodes(&mut index, nodes)?;
    let renamed = index.rename_nodes_after_files(&ids)?;
    if !renamed.is_empty() {
        save_scene(args, &index)?;
    }

    if json_mode {
        let pairs: Vec<_> = renamed
            .iter()
            .map(|(old, new)| serde_json::json!({ "old_name": old, "new_name": new }))
            .collect();
        print_json(&pairs);
    } else {
        for (old, new) in &renamed {
            println!("{old} -> {new}");
        }
        println!("Renamed {} node(s)", renamed.len());
    }

    Ok(())
}

// =============================================================================
// BULK COMMANDS
// =============================================================================

/// Operations applied to a set of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOp {
    Relative,
    Absolute,
    Retarget(String),
    Copy { overwrite: bool },
    ToggleReadOnly,
    Reload,
}

impl BulkOp {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
            Self::Retarget(_) => "retarget",
            Self::Copy { .. } => "copy",
            Self::ToggleReadOnly => "toggle-read-only",
            Self::Reload => "reload",
        }
    }

    /// True if the operation edits attribute values.
    fn edits_scene(&self) -> bool {
        !matches!(self, Self::ToggleReadOnly | Self::Reload)
    }

    fn apply<W: FileWatcher>(
        &self,
        index: &mut TextureIndex<SceneHost, W>,
        ids: &[NodeId],
    ) -> Result<usize, TexIndexError> {
        match self {
            Self::Relative => index.convert_to_relative(ids),
            Self::Absolute => index.convert_to_absolute(ids),
            Self::Retarget(dir) => index.retarget_directory(ids, dir),
            Self::Copy { overwrite } => index.copy_to_workspace(ids, *overwrite),
            Self::ToggleReadOnly => index.toggle_read_only(ids),
            Self::Reload => index.reload_files(ids),
        }
    }
}

/// Apply `op` to the named nodes, every node when none are named.
pub fn cmd_bulk(
    args: &SceneArgs,
    json_mode: bool,
    nodes: &[String],
    op: BulkOp,
) -> Result<(), TexIndexError> {
    let mut index = open_index(args, MemoryWatcher::new())?;
    let ids = select_nodes(&mut index, nodes)?;
    let changed = op.apply(&mut index, &ids)?;
    if changed > 0 && op.edits_scene() {
        save_scene(args, &index)?;
    }

    if json_mode {
        print_json(&serde_json::json!({
            "operation": op.label(),
            "selected": ids.len(),
            "changed": changed,
        }));
    } else {
        println!("{}: {changed} of {} node(s) changed", op.label(), ids.len());
    }

    Ok(())
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// Find the editable source of a texture.
pub fn cmd_source(args: &SceneArgs, json_mode: bool, node: &str) -> Result<(), TexIndexError> {
    let index = open_index(args, MemoryWatcher::new())?;
    let source = index.source_file_of(node)?;

    if json_mode {
        print_json(&serde_json::json!({ "node": node, "source": source }));
    } else {
        match source {
            Some(path) => println!("{path}"),
            None => println!("No source file found for {node}"),
        }
    }

    Ok(())
}

/// Verify table invariants.
pub fn cmd_check(args: &SceneArgs, json_mode: bool) -> Result<(), TexIndexError> {
    let index = open_index(args, MemoryWatcher::new())?;
    index.verify_invariants()?;

    if json_mode {
        print_json(&serde_json::json!({
            "consistent": true,
            "nodes": index.node_count(),
            "files": index.file_count(),
        }));
    } else {
        println!(
            "OK: {} node(s), {} file(s), {} watch target(s)",
            index.node_count(),
            index.file_count(),
            index.watches().len()
        );
    }

    Ok(())
}

// =============================================================================
// WATCH COMMAND
// =============================================================================

/// Follow file changes until interrupted.
pub async fn cmd_watch(args: &SceneArgs, json_mode: bool) -> Result<(), TexIndexError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = NotifyWatcher::new(tx)?;
    let mut index = open_index(args, watcher)?;

    println!(
        "Watching {} file(s) through {} target(s). Press Ctrl+C to stop",
        index.file_count(),
        index.watches().len()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match index.ingest_watch(event.clone(), IngestMode::Live) {
                    Ok(true) => {
                        if json_mode {
                            println!("{}", serde_json::to_string(&event).unwrap_or_default());
                        } else {
                            println!("changed: {event:?}");
                        }
                    }
                    Ok(false) => {}
                    Err(e) if e.is_soft() => tracing::warn!(error = %e, "watch event skipped"),
                    Err(e) => return Err(e),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    let report = StatusReport::from_index(&index);
    if json_mode {
        print_json(&report);
    } else {
        println!(
            "Stopped. {} missing, {} read-only, {} writable",
            report.missing, report.read_only, report.writable
        );
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
