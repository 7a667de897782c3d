//! Note export to JSON, Markdown, and plain text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{Database, NOTE_COLUMNS};
use crate::error::{DictationError, DictationResult};
use crate::models::Note;

const TEXT_SEPARATOR_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed array of full note records
    Json,
    /// One `##` section per note, separated by horizontal rules
    Markdown,
    /// One bracketed block per note, separated by a line of `=`
    Text,
}

impl FromStr for ExportFormat {
    type Err = DictationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "txt" | "text" => Ok(ExportFormat::Text),
            _ => Err(DictationError::UnsupportedExportFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Text => "text",
        };
        write!(f, "{}", name)
    }
}

fn format_timestamp(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}

/// Render notes in the given format, in the order given.
pub fn render_notes(notes: &[Note], format: ExportFormat) -> DictationResult<String> {
    let output = match format {
        ExportFormat::Json => serde_json::to_string_pretty(notes)?,
        ExportFormat::Markdown => {
            let sections: Vec<String> = notes
                .iter()
                .map(|note| {
                    format!(
                        "## {}\n\n{}\n",
                        format_timestamp(note.timestamp),
                        note.formatted_text
                    )
                })
                .collect();
            format!("# Transcriptions\n\n{}", sections.join("\n---\n\n"))
        }
        ExportFormat::Text => {
            let separator = format!("\n{}\n\n", "=".repeat(TEXT_SEPARATOR_WIDTH));
            notes
                .iter()
                .map(|note| {
                    format!(
                        "[{}]\n{}\n",
                        format_timestamp(note.timestamp),
                        note.formatted_text
                    )
                })
                .collect::<Vec<_>>()
                .join(&separator)
        }
    };
    Ok(output)
}

impl Database {
    /// Fetch the given notes ordered by ascending timestamp.
    ///
    /// Unknown ids are skipped.
    pub fn get_notes_by_ids(&self, note_ids: &[i64]) -> DictationResult<Vec<Note>> {
        if note_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; note_ids.len()].join(",");
        let query = format!(
            "SELECT {} FROM notes n WHERE n.id IN ({}) ORDER BY n.timestamp ASC, n.id ASC",
            NOTE_COLUMNS, placeholders
        );
        let mut stmt = self.connection().prepare(&query)?;
        let notes = stmt
            .query_map(rusqlite::params_from_iter(note_ids.iter()), Database::row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Export the selected notes as a single document.
    pub fn export_notes(&self, note_ids: &[i64], format: ExportFormat) -> DictationResult<String> {
        let notes = self.get_notes_by_ids(note_ids)?;
        tracing::info!("Exporting {} notes as {}", notes.len(), format);
        render_notes(&notes, format)
    }
}
