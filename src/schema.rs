//! Schema creation and version upgrades.
//!
//! The schema version is the SQLite `user_version` header field. Each
//! migration step runs in its own transaction together with the version
//! bump, so a failed step never leaves a partially-applied version behind.

use rusqlite::Connection;

use crate::error::{DictationError, DictationResult};

/// Schema version this build expects
pub const SCHEMA_VERSION: i64 = 3;

/// Notes table, the derived search index, and the listing indexes.
const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_text TEXT NOT NULL,
    formatted_text TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    formatting_profile TEXT NOT NULL DEFAULT 'standard',
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- Standalone FTS table keyed by rowid = notes.id. Kept in step with
-- `notes` by the store's transactional dual-writes.
CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
    raw_text,
    formatted_text,
    tokenize = 'unicode61'
);

CREATE INDEX IF NOT EXISTS idx_notes_timestamp ON notes(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_notes_favorite ON notes(is_favorite, timestamp DESC);
"#;

/// Tags and the note/tag association.
const MIGRATION_V2: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    color TEXT NOT NULL,
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS note_tags (
    note_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (note_id, tag_id),
    FOREIGN KEY (note_id) REFERENCES notes (id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_tags_usage ON tags(usage_count DESC);
-- Reverse index for finding notes by tag
CREATE INDEX IF NOT EXISTS idx_note_tags_tag ON note_tags(tag_id, note_id);
"#;

/// Phrase replacement dictionary.
const MIGRATION_V3: &str = r#"
CREATE TABLE IF NOT EXISTS dictionary_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    spoken_phrase TEXT NOT NULL UNIQUE,
    replacement TEXT NOT NULL,
    is_case_sensitive INTEGER NOT NULL DEFAULT 0,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dictionary_enabled ON dictionary_entries(is_enabled);
"#;

/// Ordered migration steps; index `i` upgrades to version `i + 1`.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "notes and search index", MIGRATION_V1),
    (2, "tags", MIGRATION_V2),
    (3, "dictionary", MIGRATION_V3),
];

/// Read the persisted schema version (0 for a fresh file).
pub fn current_version(conn: &Connection) -> DictationResult<i64> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Bring the schema up to `SCHEMA_VERSION`.
///
/// Safe to call on every open: returns the number of steps applied, which
/// is zero when the schema is already current.
pub fn migrate(conn: &mut Connection) -> DictationResult<usize> {
    let current = current_version(conn)?;

    if current > SCHEMA_VERSION {
        return Err(DictationError::Migration {
            version: current,
            message: format!(
                "database schema is newer than supported version {}",
                SCHEMA_VERSION
            ),
        });
    }

    let mut applied = 0;
    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        apply_step(conn, version, sql).map_err(|e| DictationError::Migration {
            version,
            message: e.to_string(),
        })?;
        tracing::info!("Applied schema migration v{} ({})", version, name);
        applied += 1;
    }

    Ok(applied)
}

fn apply_step(conn: &mut Connection, version: i64, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()
}
