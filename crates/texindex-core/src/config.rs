//! # Index Configuration
//!
//! `IndexConfig` holds the tunable behaviour of the index: which host types
//! are tracked, how workspaces are discovered and which automatic reactions
//! are enabled. It is loaded from TOML; every field has a default.
//!
//! ```toml
//! auto_reload = true
//! propagation_scope = "session"
//!
//! [[tracked_types]]
//! type_name = "file"
//! nice_name = "FILE"
//! attribute = "fileTextureName"
//! ```

use crate::TexIndexError;
use crate::policy::PropagationScope;
use crate::primitives::{
    DEFAULT_GROUP_TYPE, DEFAULT_RESOURCE_SUBFOLDER, DEFAULT_SOURCE_FOLDER, MARKER_SEARCH_DEPTH,
    PROPAGATION_WINDOW_SECS, WORKSPACE_MARKER,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Maximum size of a configuration file.
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// TRACKED TYPE
// =============================================================================

/// A host object type indexed by the texture index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedType {
    pub type_name: String,
    /// Display label. Empty falls back to `type_name`.
    #[serde(default)]
    pub nice_name: String,
    /// Attribute holding the file path.
    pub attribute: String,
}

impl TrackedType {
    #[must_use]
    pub fn new(type_name: &str, nice_name: &str, attribute: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            nice_name: nice_name.to_string(),
            attribute: attribute.to_string(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        if self.nice_name.is_empty() {
            &self.type_name
        } else {
            &self.nice_name
        }
    }
}

// =============================================================================
// INDEX CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub tracked_types: Vec<TrackedType>,
    /// Resource subfolder used when a workspace declares none.
    pub resource_subfolder: String,
    /// File name marking a workspace root.
    pub workspace_marker: String,
    /// Parent levels walked while looking for `workspace_marker`.
    pub marker_search_depth: usize,
    /// Source-folder pattern, `<WORKSPACE>` standing for the workspace root.
    pub source_folder: String,
    /// Host type grouping shading networks, used by selection queries.
    pub group_type: String,
    /// Re-read files in the host when they change on disk.
    pub auto_reload: bool,
    /// Rename nodes after their file when repointed.
    pub auto_rename: bool,
    pub propagation_scope: PropagationScope,
    /// Lifetime of a time-boxed propagation answer.
    pub propagation_window_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tracked_types: vec![
                TrackedType::new("file", "FILE", "fileTextureName"),
                TrackedType::new("psdFileTex", "PSD", "fileTextureName"),
                TrackedType::new("mentalrayTexture", "MRT", "fileTextureName"),
            ],
            resource_subfolder: DEFAULT_RESOURCE_SUBFOLDER.to_string(),
            workspace_marker: WORKSPACE_MARKER.to_string(),
            marker_search_depth: MARKER_SEARCH_DEPTH,
            source_folder: DEFAULT_SOURCE_FOLDER.to_string(),
            group_type: DEFAULT_GROUP_TYPE.to_string(),
            auto_reload: false,
            auto_rename: false,
            propagation_scope: PropagationScope::Ask,
            propagation_window_secs: PROPAGATION_WINDOW_SECS,
        }
    }
}

impl IndexConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, TexIndexError> {
        let config: Self =
            toml::from_str(source).map_err(|e| TexIndexError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, TexIndexError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_SIZE {
            return Err(TexIndexError::InvalidConfig(format!(
                "{} exceeds {MAX_CONFIG_SIZE} bytes",
                path.display()
            )));
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), TexIndexError> {
        if self.tracked_types.is_empty() {
            return Err(TexIndexError::InvalidConfig(
                "at least one tracked type is required".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for tracked in &self.tracked_types {
            if tracked.type_name.trim().is_empty() {
                return Err(TexIndexError::InvalidConfig("empty type name".into()));
            }
            if tracked.attribute.trim().is_empty() {
                return Err(TexIndexError::InvalidConfig(format!(
                    "type {} has an empty attribute name",
                    tracked.type_name
                )));
            }
            if !seen.insert(tracked.type_name.as_str()) {
                return Err(TexIndexError::InvalidConfig(format!(
                    "type {} is tracked twice",
                    tracked.type_name
                )));
            }
        }
        if self.workspace_marker.trim().is_empty() {
            return Err(TexIndexError::InvalidConfig("empty workspace marker".into()));
        }
        if self.marker_search_depth == 0 {
            return Err(TexIndexError::InvalidConfig(
                "marker_search_depth must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn tracked(&self, type_name: &str) -> Option<&TrackedType> {
        self.tracked_types.iter().find(|t| t.type_name == type_name)
    }

    /// Attribute holding the file path for `type_name`, if tracked.
    #[must_use]
    pub fn attribute_for(&self, type_name: &str) -> Option<&str> {
        self.tracked(type_name).map(|t| t.attribute.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = IndexConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.attribute_for("psdFileTex"), Some("fileTextureName"));
        assert_eq!(config.attribute_for("mesh"), None);
        assert_eq!(config.resource_subfolder, "sourceimages");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = IndexConfig::from_toml_str(
            r#"
            auto_reload = true
            propagation_scope = "session"
            "#,
        )
        .expect("parse");
        assert!(config.auto_reload);
        assert_eq!(config.propagation_scope, PropagationScope::Session);
        assert_eq!(config.tracked_types.len(), 3);
        assert_eq!(config.propagation_window_secs, 30);
    }

    #[test]
    fn nice_name_falls_back_to_type() {
        let config = IndexConfig::from_toml_str(
            r#"
            [[tracked_types]]
            type_name = "aiImage"
            attribute = "filename"
            "#,
        )
        .expect("parse");
        let tracked = config.tracked("aiImage").expect("tracked");
        assert_eq!(tracked.label(), "aiImage");
        assert!(config.tracked("file").is_none());
    }

    #[test]
    fn rejects_duplicates_and_empty_attributes() {
        let dup = r#"
            [[tracked_types]]
            type_name = "file"
            attribute = "a"
            [[tracked_types]]
            type_name = "file"
            attribute = "b"
        "#;
        assert!(matches!(
            IndexConfig::from_toml_str(dup),
            Err(TexIndexError::InvalidConfig(_))
        ));

        let empty = r#"
            [[tracked_types]]
            type_name = "file"
            attribute = " "
        "#;
        assert!(matches!(
            IndexConfig::from_toml_str(empty),
            Err(TexIndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            IndexConfig::from_toml_str("auto_reload = maybe"),
            Err(TexIndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "auto_rename = true").expect("write");
        let config = IndexConfig::load(file.path()).expect("load");
        assert!(config.auto_rename);
    }
}
