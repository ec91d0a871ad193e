//! # Sorted View
//!
//! A derived, filtered and ordered projection of the node table, consumed
//! by a table-like presentation layer.
//!
//! ## Filtering
//!
//! All predicates are AND-combined. Cheap flag checks run first, the text
//! pattern last. Instance collapsing (one row per file) runs after sorting
//! so the representative of a file is its first row in display order.
//!
//! ## Stability
//!
//! Row positions are not stable across a recompute. Callers that need to
//! keep a cursor look rows up again by node name.

use crate::{FileId, FileState, NodeId, PathResolver, Selection, TexIndexError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// COLUMNS & CELLS
// =============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    #[default]
    Name,
    Type,
    IsReference,
    FileState,
    InstanceCount,
    ResolvedFile,
}

impl Column {
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Type,
        Self::IsReference,
        Self::FileState,
        Self::InstanceCount,
        Self::ResolvedFile,
    ];

    /// Short header label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Node Name",
            Self::Type => "Type",
            Self::IsReference => "R",
            Self::FileState => "W",
            Self::InstanceCount => "#",
            Self::ResolvedFile => "File",
        }
    }

    /// Header label used in menus and tooltips.
    #[must_use]
    pub const fn long_label(self) -> &'static str {
        match self {
            Self::Name => "Node Name",
            Self::Type => "Type",
            Self::IsReference => "Reference",
            Self::FileState => "Writable",
            Self::InstanceCount => "# Instance Count",
            Self::ResolvedFile => "File",
        }
    }
}

impl FromStr for Column {
    type Err = TexIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "type" => Ok(Self::Type),
            "ref" | "reference" => Ok(Self::IsReference),
            "state" | "writable" => Ok(Self::FileState),
            "count" | "instances" => Ok(Self::InstanceCount),
            "file" | "path" => Ok(Self::ResolvedFile),
            other => Err(TexIndexError::InvalidConfig(format!("unknown column: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Typed value of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Flag(bool),
    State(FileState),
    Count(u64),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Flag(flag) => f.write_str(if *flag { "R" } else { "" }),
            Self::State(state) => write!(f, "{}", state.code()),
            Self::Count(count) => write!(f, "{count}"),
        }
    }
}

// =============================================================================
// ROWS
// =============================================================================

/// One node joined with its file row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub node_id: NodeId,
    pub name: String,
    pub type_name: String,
    pub nice_name: String,
    pub is_reference: bool,
    pub file_id: FileId,
    pub state: FileState,
    pub instance_count: u64,
    pub file_path: String,
}

impl Row {
    #[must_use]
    pub fn cell(&self, column: Column) -> CellValue {
        match column {
            Column::Name => CellValue::Text(self.name.clone()),
            Column::Type => CellValue::Text(self.nice_name.clone()),
            Column::IsReference => CellValue::Flag(self.is_reference),
            Column::FileState => CellValue::State(self.state),
            Column::InstanceCount => CellValue::Count(self.instance_count),
            Column::ResolvedFile => CellValue::Text(self.file_path.clone()),
        }
    }

    fn compare(&self, other: &Self, column: Column) -> Ordering {
        let primary = match column {
            Column::Name => cmp_text(&self.name, &other.name),
            Column::Type => cmp_text(&self.nice_name, &other.nice_name),
            Column::IsReference => self.is_reference.cmp(&other.is_reference),
            Column::FileState => self.state.cmp(&other.state),
            Column::InstanceCount => self.instance_count.cmp(&other.instance_count),
            Column::ResolvedFile => cmp_text(&self.file_path, &other.file_path),
        };
        primary
            .then_with(|| cmp_text(&self.name, &other.name))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }

    /// True if the node is named after its file.
    ///
    /// Compares the node name without namespace and the file stem, both
    /// without trailing digits.
    #[must_use]
    pub fn name_matches_file(&self) -> bool {
        let node_token = self
            .name
            .rsplit(':')
            .next()
            .unwrap_or(&self.name)
            .trim_end_matches(|c: char| c.is_ascii_digit());
        let file_token = PathResolver::file_stem(&self.file_path)
            .trim_end_matches(|c: char| c.is_ascii_digit());
        node_token == file_token
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

// =============================================================================
// FILTERS
// =============================================================================

/// Which column a text filter looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTarget {
    #[default]
    Name,
    File,
}

/// Case-insensitive text match on a node name or resolved path.
#[derive(Debug, Clone)]
pub struct TextFilter {
    pattern: Regex,
    target: FilterTarget,
}

impl TextFilter {
    /// Substring match where `*` and `?` act as wildcards.
    pub fn wildcard(text: &str, target: FilterTarget) -> Result<Self, TexIndexError> {
        let mut pattern = String::new();
        for c in text.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        Self::regex(&pattern, target)
    }

    /// Unanchored regular expression.
    pub fn regex(pattern: &str, target: FilterTarget) -> Result<Self, TexIndexError> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| TexIndexError::InvalidPattern(e.to_string()))?;
        Ok(Self { pattern, target })
    }

    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self.target {
            FilterTarget::Name => self.pattern.is_match(&row.name),
            FilterTarget::File => self.pattern.is_match(&row.file_path),
        }
    }
}

/// Predicates applied by the view. The default admits every row.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub writable_only: bool,
    pub hide_references: bool,
    /// Hide nodes already named after their file.
    pub mismatched_names_only: bool,
    /// Keep only the first row of each file.
    pub one_per_file: bool,
    /// Restrict to the selection tracked by the index.
    pub selection_only: bool,
    /// Restrict to an explicit set of node names.
    pub pinned: Option<BTreeSet<String>>,
    pub text: Option<TextFilter>,
}

impl ViewFilter {
    /// Row-local predicates. `one_per_file` is applied separately.
    #[must_use]
    pub fn admits(&self, row: &Row, selection: &Selection) -> bool {
        if self.writable_only && row.state != FileState::Writable {
            return false;
        }
        if self.hide_references && row.is_reference {
            return false;
        }
        if self
            .pinned
            .as_ref()
            .is_some_and(|pinned| !pinned.contains(&row.name))
        {
            return false;
        }
        if self.selection_only && !selection.admits(&row.name) {
            return false;
        }
        if self.mismatched_names_only && row.name_matches_file() {
            return false;
        }
        self.text.as_ref().is_none_or(|text| text.matches(row))
    }
}

// =============================================================================
// SORTED VIEW
// =============================================================================

/// Ordered, filtered rows plus the state needed to rebuild them.
#[derive(Debug, Clone, Default)]
pub struct SortedView {
    column: Column,
    order: SortOrder,
    filter: ViewFilter,
    rows: Vec<Row>,
    stale: bool,
    recomputes: u64,
}

impl SortedView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    /// Change the sort key. Takes effect on the next recompute.
    pub fn sort(&mut self, column: Column, order: SortOrder) {
        self.column = column;
        self.order = order;
        self.stale = true;
    }

    /// Replace the filter. Takes effect on the next recompute.
    pub fn filter(&mut self, filter: ViewFilter) {
        self.filter = filter;
        self.stale = true;
    }

    #[must_use]
    pub fn current_filter(&self) -> &ViewFilter {
        &self.filter
    }

    #[must_use]
    pub fn sort_key(&self) -> (Column, SortOrder) {
        (self.column, self.order)
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of rebuilds so far.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Rebuild from freshly projected rows.
    pub fn recompute(&mut self, rows: impl IntoIterator<Item = Row>, selection: &Selection) {
        let (column, order) = self.sort_key();
        let mut kept: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.filter.admits(row, selection))
            .collect();
        kept.sort_by(|a, b| {
            let ordering = a.compare(b, column);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        if self.filter.one_per_file {
            let mut seen = BTreeSet::new();
            kept.retain(|row| seen.insert(row.file_id));
        }
        self.rows = kept;
        self.stale = false;
        self.recomputes = self.recomputes.saturating_add(1);
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: Column) -> Option<CellValue> {
        self.rows.get(row).map(|r| r.cell(column))
    }

    /// Header labels in column order.
    #[must_use]
    pub fn headers(long: bool) -> Vec<&'static str> {
        Column::ALL
            .iter()
            .map(|c| if long { c.long_label() } else { c.label() })
            .collect()
    }

    /// Current position of a node, looked up by name.
    #[must_use]
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.name == name)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, name: &str, file: u64, path: &str, state: FileState, count: u64) -> Row {
        Row {
            node_id: NodeId(id),
            name: name.into(),
            type_name: "file".into(),
            nice_name: "FILE".into(),
            is_reference: name.contains(':'),
            file_id: FileId(file),
            state,
            instance_count: count,
            file_path: path.into(),
        }
    }

    fn sample() -> Vec<Row> {
        vec![
            row(0, "wood", 0, "/t/wood.png", FileState::Writable, 2),
            row(1, "wood1", 0, "/t/wood.png", FileState::Writable, 2),
            row(2, "Brick", 1, "/t/brick_dif.png", FileState::ReadOnly, 1),
            row(3, "chair:metal", 2, "/lib/metal.png", FileState::Missing, 1),
        ]
    }

    fn names(view: &SortedView) -> Vec<&str> {
        view.rows().iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn sorts_by_name_case_insensitively() {
        let mut view = SortedView::new();
        assert!(view.is_stale());
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["Brick", "chair:metal", "wood", "wood1"]);
        assert!(!view.is_stale());
    }

    #[test]
    fn sorts_by_state_descending_with_name_tiebreak() {
        let mut view = SortedView::new();
        view.sort(Column::FileState, SortOrder::Descending);
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["wood1", "wood", "Brick", "chair:metal"]);
    }

    #[test]
    fn flag_filters() {
        let mut view = SortedView::new();
        view.filter(ViewFilter {
            writable_only: true,
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["wood", "wood1"]);

        view.filter(ViewFilter {
            hide_references: true,
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(view.row_count(), 3);
    }

    #[test]
    fn mismatched_names() {
        let mut view = SortedView::new();
        view.filter(ViewFilter {
            mismatched_names_only: true,
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["Brick"]);
    }

    #[test]
    fn one_row_per_file_after_sort() {
        let mut view = SortedView::new();
        view.sort(Column::Name, SortOrder::Descending);
        view.filter(ViewFilter {
            one_per_file: true,
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["wood1", "chair:metal", "Brick"]);
    }

    #[test]
    fn text_filters() {
        let mut view = SortedView::new();
        view.filter(ViewFilter {
            text: Some(TextFilter::wildcard("W*D", FilterTarget::Name).expect("pattern")),
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["wood", "wood1"]);

        view.filter(ViewFilter {
            text: Some(TextFilter::regex(r"^/lib/", FilterTarget::File).expect("pattern")),
            ..ViewFilter::default()
        });
        view.recompute(sample(), &Selection::new());
        assert_eq!(names(&view), vec!["chair:metal"]);

        assert!(matches!(
            TextFilter::regex("(", FilterTarget::Name),
            Err(TexIndexError::InvalidPattern(_))
        ));
    }

    #[test]
    fn wildcard_escapes_regex_syntax() {
        let filter = TextFilter::wildcard("wood.png", FilterTarget::File).expect("pattern");
        let mut probe = row(9, "x", 9, "/t/woodXpng", FileState::Missing, 1);
        assert!(!filter.matches(&probe));
        probe.file_path = "/t/WOOD.png".into();
        assert!(filter.matches(&probe));
    }

    #[test]
    fn pinned_and_selection() {
        let mut selection = Selection::new();
        selection.set(Some(BTreeSet::from(["wood".to_string(), "Brick".to_string()])));
        let mut view = SortedView::new();
        view.filter(ViewFilter {
            selection_only: true,
            pinned: Some(BTreeSet::from(["wood".to_string(), "wood1".to_string()])),
            ..ViewFilter::default()
        });
        view.recompute(sample(), &selection);
        assert_eq!(names(&view), vec!["wood"]);
    }

    #[test]
    fn read_model() {
        let mut view = SortedView::new();
        view.recompute(sample(), &Selection::new());
        assert_eq!(
            SortedView::headers(false),
            vec!["Node Name", "Type", "R", "W", "#", "File"]
        );
        assert_eq!(SortedView::headers(true)[4], "# Instance Count");
        assert_eq!(view.cell(0, Column::FileState), Some(CellValue::State(FileState::ReadOnly)));
        assert_eq!(view.cell(1, Column::IsReference).map(|c| c.to_string()), Some("R".into()));
        assert_eq!(view.cell(9, Column::Name), None);
        assert_eq!(view.position_of("wood1"), Some(3));
        assert_eq!(view.recompute_count(), 1);
    }

    #[test]
    fn columns_parse() {
        assert_eq!("STATE".parse::<Column>().expect("column"), Column::FileState);
        assert!("bogus".parse::<Column>().is_err());
    }
}
