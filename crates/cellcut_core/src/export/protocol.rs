//! INI-style protocol text consumed by the sorting instrument.
//!
//! Stage coordinates are written with four decimals; colours as lowercase
//! palette names; wells as `A01`..`H12`.

use crate::export::document::{ExportError, ExportResult, ProtocolDocument, ProtocolEntry};
use log::info;
use std::path::Path;

/// Renders `document` as protocol text. Output is deterministic and every
/// line, including the last, ends with `\n`.
pub fn serialize(document: &ProtocolDocument) -> String {
    let image = &document.image;
    let mut lines = vec![
        "[IMAGE]".to_string(),
        format!("FILE = \"{}\"", quoted_safe(&image.file_name)),
        format!("WIDTH = {}", image.width),
        format!("HEIGHT = {}", image.height),
        format!("FORMAT = \"{}\"", image.format.as_str()),
        String::new(),
        "[IMAGING_LAYOUT]".to_string(),
        "PositionOnly = 1".to_string(),
        "AfterBefore = \"01\"".to_string(),
        format!("Points = {}", document.entries.len()),
    ];
    lines.extend(
        document
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| format!("P_{} = \"{}\"", index + 1, point_value(entry))),
    );

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn point_value(entry: &ProtocolEntry) -> String {
    let stage = &entry.stage_box;
    format!(
        "{}; {}; {}; {};{};{};",
        coordinate(stage.min_x),
        coordinate(stage.min_y),
        coordinate(stage.max_x),
        coordinate(stage.max_y),
        entry.color,
        entry.well
    )
}

fn coordinate(value: f64) -> String {
    let text = format!("{value:.4}");
    if text == "-0.0000" {
        "0.0000".to_string()
    } else {
        text
    }
}

fn quoted_safe(value: &str) -> String {
    value
        .chars()
        .filter(|ch| *ch != '"' && *ch != '\n' && *ch != '\r')
        .collect()
}

impl ProtocolDocument {
    pub fn to_protocol_text(&self) -> String {
        serialize(self)
    }

    /// Writes the protocol text to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> ExportResult<()> {
        std::fs::write(path, serialize(self)).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "event=protocol_written module=export status=ok points={}",
            self.entries.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{coordinate, quoted_safe, serialize};
    use crate::export::document::{ImageFormat, ImageMetadata, ProtocolDocument};

    #[test]
    fn coordinates_use_four_decimals_without_negative_zero() {
        assert_eq!(coordinate(1.23456), "1.2346");
        assert_eq!(coordinate(-0.00001), "0.0000");
        assert_eq!(coordinate(-2.5), "-2.5000");
    }

    #[test]
    fn empty_document_still_has_both_sections() {
        let document = ProtocolDocument {
            image: ImageMetadata {
                file_name: "empty.png".to_string(),
                width: 64,
                height: 48,
                format: ImageFormat::Png,
            },
            entries: Vec::new(),
        };
        assert_eq!(
            serialize(&document),
            "[IMAGE]\nFILE = \"empty.png\"\nWIDTH = 64\nHEIGHT = 48\nFORMAT = \"PNG\"\n\n\
             [IMAGING_LAYOUT]\nPositionOnly = 1\nAfterBefore = \"01\"\nPoints = 0\n"
        );
    }

    #[test]
    fn file_name_drops_quotes_and_newlines() {
        assert_eq!(quoted_safe("a\"b\nc.tif"), "abc.tif");
    }
}
