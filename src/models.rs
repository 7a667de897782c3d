//! Data models for the dictation core.
//!
//! This module defines the persisted entities (Note, Tag, DictionaryEntry)
//! and the input shapes used to create and modify them. All ids are SQLite
//! integer row ids; all times are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};

/// Formatting profile assigned to notes when the caller does not name one
pub const DEFAULT_FORMATTING_PROFILE: &str = "standard";

/// Default display color for newly created tags
pub const DEFAULT_TAG_COLOR: &str = "#6b7280";

/// A persisted transcription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned id, monotonically increasing and never reused
    pub id: i64,
    /// Unedited transcription
    pub raw_text: String,
    /// Post-processed text (may equal `raw_text`)
    pub formatted_text: String,
    /// Caller-supplied capture time, used for chronological ordering
    pub timestamp: i64,
    /// Formatting profile label
    pub formatting_profile: String,
    pub is_favorite: bool,
    /// Persistence time, set once at insert
    pub created_at: i64,
}

/// Fields required to insert a new note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub raw_text: String,
    pub formatted_text: String,
    pub timestamp: i64,
    /// Falls back to the store's default profile when `None`
    pub formatting_profile: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl NewNote {
    /// Create a note whose raw and formatted text are identical
    pub fn new(text: impl Into<String>, timestamp: i64) -> Self {
        let text = text.into();
        Self {
            raw_text: text.clone(),
            formatted_text: text,
            timestamp,
            formatting_profile: None,
            is_favorite: false,
        }
    }

    /// Set a formatted variant distinct from the raw text
    pub fn with_formatted(mut self, formatted_text: impl Into<String>) -> Self {
        self.formatted_text = formatted_text.into();
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.formatting_profile = Some(profile.into());
        self
    }

    pub fn favorite(mut self) -> Self {
        self.is_favorite = true;
        self
    }
}

/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteUpdate {
    pub raw_text: Option<String>,
    pub formatted_text: Option<String>,
    pub formatting_profile: Option<String>,
    pub is_favorite: Option<bool>,
}

impl NoteUpdate {
    /// Check if the update touches any indexed text column
    pub fn changes_text(&self) -> bool {
        self.raw_text.is_some() || self.formatted_text.is_some()
    }

    /// Check if the update has nothing to write
    pub fn is_empty(&self) -> bool {
        !self.changes_text() && self.formatting_profile.is_none() && self.is_favorite.is_none()
    }
}

/// Structured listing filters.
///
/// All present conditions are combined with AND; within `tags` a note
/// matches if it carries any of the listed names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFilters {
    pub is_favorite: Option<bool>,
    /// Inclusive lower bound on `timestamp`
    pub start_date: Option<i64>,
    /// Inclusive upper bound on `timestamp`
    pub end_date: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// A tag with its display color and usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    /// Unique (case-insensitive) name
    pub name: String,
    pub color: String,
    /// Number of notes currently carrying the tag
    pub usage_count: i64,
    pub created_at: i64,
}

/// Aggregate counts over the store, computed fresh on each call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStats {
    pub total: i64,
    pub favorites: i64,
    pub tags: i64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// A spoken-phrase replacement rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: i64,
    /// Unique phrase to look for
    pub spoken_phrase: String,
    /// Literal text substituted for the phrase
    pub replacement: String,
    pub is_case_sensitive: bool,
    pub is_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields required to create a dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDictionaryEntry {
    pub spoken_phrase: String,
    pub replacement: String,
    #[serde(default)]
    pub is_case_sensitive: bool,
}

impl NewDictionaryEntry {
    pub fn new(spoken_phrase: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            spoken_phrase: spoken_phrase.into(),
            replacement: replacement.into(),
            is_case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.is_case_sensitive = true;
        self
    }
}

/// Partial update of a dictionary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntryUpdate {
    pub spoken_phrase: Option<String>,
    pub replacement: Option<String>,
    pub is_case_sensitive: Option<bool>,
    pub is_enabled: Option<bool>,
}
