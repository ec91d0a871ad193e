//! # Scene Manifests
//!
//! A JSON file describing a scene: workspace root, objects with their
//! attributes, references and connections. It stands in for a live host.
//!
//! ```json
//! {
//!   "scene_name": "/proj/scenes/shot.ma",
//!   "workspace_root": "/proj",
//!   "objects": {
//!     "wood": { "type_name": "file", "attributes": { "fileTextureName": "sourceimages/wood.png" } }
//!   }
//! }
//! ```

use std::path::Path;
use texindex_core::{SceneHost, TexIndexError};

/// Maximum manifest size (64 MB).
const MAX_MANIFEST_SIZE: u64 = 64 * 1024 * 1024;

/// Parse a manifest from JSON text.
pub fn from_json(source: &str) -> Result<SceneHost, TexIndexError> {
    serde_json::from_str(source)
        .map_err(|e| TexIndexError::SerializationError(format!("scene manifest: {e}")))
}

/// Read and parse a manifest file.
pub fn load(path: &Path) -> Result<SceneHost, TexIndexError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TexIndexError::IoError(format!("{}: {e}", path.display())))?;
    if metadata.len() > MAX_MANIFEST_SIZE {
        return Err(TexIndexError::SerializationError(format!(
            "{} is {} bytes, limit is {MAX_MANIFEST_SIZE}",
            path.display(),
            metadata.len()
        )));
    }
    let source = std::fs::read_to_string(path)?;
    let host = from_json(&source)?;
    tracing::debug!(
        path = %path.display(),
        objects = host.objects.len(),
        "scene manifest loaded"
    );
    Ok(host)
}

/// Write a manifest back, pretty-printed.
pub fn save(path: &Path, host: &SceneHost) -> Result<(), TexIndexError> {
    let text = serde_json::to_string_pretty(host)
        .map_err(|e| TexIndexError::SerializationError(e.to_string()))?;
    std::fs::write(path, text)?;
    tracing::debug!(path = %path.display(), "scene manifest saved");
    Ok(())
}
