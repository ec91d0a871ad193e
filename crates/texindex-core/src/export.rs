//! # CSV Export
//!
//! Full join of nodes and files written as `;`-separated text:
//!
//! ```text
//! scene.ma
//! NODE NAME;NODE TYPE;IS REF;MISSING;INSTANCE COUNT;FILE PATH
//! tex1;file;;;2;/proj/sourceimages/wood.png
//! ```
//!
//! Flags are written as `True` or left empty.

use crate::primitives::{CSV_HEADER, CSV_SEPARATOR, UNTITLED_SCENE};
use crate::{PathResolver, TexIndexError};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One exported line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRow {
    pub name: String,
    pub type_name: String,
    pub is_reference: bool,
    pub missing: bool,
    pub instance_count: u64,
    pub file_path: String,
}

impl CsvRow {
    fn record(&self) -> [String; 6] {
        let flag = |on: bool| if on { "True".to_string() } else { String::new() };
        [
            self.name.clone(),
            self.type_name.clone(),
            flag(self.is_reference),
            flag(self.missing),
            self.instance_count.to_string(),
            self.file_path.clone(),
        ]
    }
}

/// First line of the export: the scene file name.
#[must_use]
pub fn scene_label(scene: Option<&str>) -> String {
    match scene.map(PathResolver::basename) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNTITLED_SCENE.to_string(),
    }
}

/// Write the export. Returns the number of data rows.
pub fn write_csv<W: Write>(
    writer: W,
    scene: Option<&str>,
    rows: &[CsvRow],
) -> Result<usize, TexIndexError> {
    let mut out = csv::WriterBuilder::new()
        .delimiter(CSV_SEPARATOR as u8)
        .flexible(true)
        .from_writer(writer);

    out.write_record([scene_label(scene)]).map_err(csv_error)?;
    out.write_record(CSV_HEADER.split(CSV_SEPARATOR))
        .map_err(csv_error)?;
    for row in rows {
        out.write_record(row.record()).map_err(csv_error)?;
    }
    out.flush()?;
    Ok(rows.len())
}

fn csv_error(err: csv::Error) -> TexIndexError {
    TexIndexError::SerializationError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, missing: bool) -> CsvRow {
        CsvRow {
            name: name.into(),
            type_name: "file".into(),
            is_reference: name.contains(':'),
            missing,
            instance_count: 1,
            file_path: format!("/proj/{name}.png"),
        }
    }

    #[test]
    fn layout() {
        let mut buffer = Vec::new();
        let written = write_csv(
            &mut buffer,
            Some("/proj/scenes/shot.ma"),
            &[row("tex1", false), row("chair:tex", true)],
        )
        .expect("export");
        assert_eq!(written, 2);
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "shot.ma",
                "NODE NAME;NODE TYPE;IS REF;MISSING;INSTANCE COUNT;FILE PATH",
                "tex1;file;;;1;/proj/tex1.png",
                "chair:tex;file;True;True;1;/proj/chair:tex.png",
            ]
        );
    }

    #[test]
    fn untitled_scene() {
        assert_eq!(scene_label(None), "Scene UNTITLED");
        assert_eq!(scene_label(Some("")), "Scene UNTITLED");
    }

    #[test]
    fn separators_in_values_are_quoted() {
        let mut buffer = Vec::new();
        let mut odd = row("tex1", false);
        odd.file_path = "/proj/a;b.png".into();
        write_csv(&mut buffer, None, &[odd]).expect("export");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("\"/proj/a;b.png\""));
    }
}
