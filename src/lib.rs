//! DictationCore - local-first storage and search for dictated transcriptions.
//!
//! This library provides:
//! - Data models (Note, Tag, DictionaryEntry)
//! - Schema versioning and migrations (SQLite)
//! - Note storage with a transactionally maintained full-text index
//! - Hybrid query parsing (`budget tag:work fav:true date:week`) and search
//! - Backup, restore, and export
//! - A phrase replacement dictionary
//! - Configuration management
//!
//! # Feature Flags
//!
//! - `desktop`: Resolve the default data directory through the platform
//!   conventions. Without it, callers must pass a directory explicitly.

pub mod config;
pub mod database;
pub mod dictionary;
pub mod error;
pub mod export;
pub mod models;
pub mod schema;
pub mod search;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, StoreOptions};
pub use database::Database;
pub use error::{DictationError, DictationResult};
pub use export::ExportFormat;
pub use models::{
    DictionaryEntry, DictionaryEntryUpdate, NewDictionaryEntry, NewNote, Note, NoteFilters,
    NoteStats, NoteUpdate, Tag,
};
pub use search::{parse_query, ParsedQuery, SearchFilters, SearchResponse};
