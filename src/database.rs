//! Database operations for the dictation core.
//!
//! This module owns the SQLite connection and provides note CRUD, tag
//! management, search-index maintenance, and the store lifecycle
//! (backup, restore, vacuum, close).
//!
//! Every note mutation that touches text also rewrites the matching
//! `notes_fts` row inside the same transaction, so the primary table and the
//! search index can never be observed out of step.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::config::{Config, StoreOptions};
use crate::error::{DictationError, DictationResult};
use crate::models::{
    NewNote, Note, NoteFilters, NoteStats, NoteUpdate, Tag, DEFAULT_TAG_COLOR,
};
use crate::schema;
use crate::validation::{
    validate_date_range, validate_formatting_profile, validate_tag_name,
};

/// Column list shared by every query that materializes a `Note`
pub(crate) const NOTE_COLUMNS: &str =
    "n.id, n.raw_text, n.formatted_text, n.timestamp, n.formatting_profile, n.is_favorite, n.created_at";

/// Current time as Unix epoch milliseconds
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Append a suffix to the file name of `path` (`notes.db` -> `notes.db.backup`).
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Remove the WAL and shared-memory sidecars of a database file, if present.
fn remove_sidecars(path: &Path) {
    for suffix in ["-wal", "-shm"] {
        let sidecar = with_suffix(path, suffix);
        if sidecar.exists() {
            if let Err(e) = fs::remove_file(&sidecar) {
                tracing::warn!("Failed to remove {:?}: {}", sidecar, e);
            }
        }
    }
}

/// Check that `path` holds an intact SQLite database.
fn verify_backup(path: &Path) -> DictationResult<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let result: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(DictationError::database_op(format!(
            "backup failed integrity check: {}",
            result
        )));
    }
    Ok(())
}

/// Append WHERE conditions for structured filters to a note query.
///
/// Conditions refer to the notes table through the alias `n`.
pub(crate) fn push_filter_conditions(
    filters: &NoteFilters,
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    if let Some(favorite) = filters.is_favorite {
        conditions.push("n.is_favorite = ?".to_string());
        params.push(Box::new(favorite));
    }

    if let Some(start) = filters.start_date {
        conditions.push("n.timestamp >= ?".to_string());
        params.push(Box::new(start));
    }

    if let Some(end) = filters.end_date {
        conditions.push("n.timestamp <= ?".to_string());
        params.push(Box::new(end));
    }

    // Any listed tag matches (OR within the tag filter)
    if !filters.tags.is_empty() {
        let placeholders = vec!["?"; filters.tags.len()].join(",");
        conditions.push(format!(
            r#"EXISTS (
                SELECT 1 FROM note_tags nt
                JOIN tags t ON t.id = nt.tag_id
                WHERE nt.note_id = n.id AND t.name IN ({})
            )"#,
            placeholders
        ));
        for tag in &filters.tags {
            params.push(Box::new(tag.clone()));
        }
    }
}

/// Append `LIMIT ? OFFSET ?` for the filter's pagination window.
pub(crate) fn push_pagination(
    filters: &NoteFilters,
    query: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    // SQLite treats a negative LIMIT as "no limit"
    let limit = filters.limit.map(i64::from).unwrap_or(-1);
    query.push_str(" LIMIT ? OFFSET ?");
    params.push(Box::new(limit));
    params.push(Box::new(i64::from(filters.offset)));
}

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Connection,
    /// Backing file, `None` for in-memory stores
    path: Option<PathBuf>,
    options: StoreOptions,
}

impl Database {
    /// Open (or create) the store at `db_path` with default options
    pub fn new<P: AsRef<Path>>(db_path: P) -> DictationResult<Self> {
        Self::open(db_path, StoreOptions::default())
    }

    /// Open (or create) the store at `db_path`.
    ///
    /// Migration failures are fatal: a store that cannot be brought to the
    /// current schema is never returned.
    pub fn open<P: AsRef<Path>>(db_path: P, options: StoreOptions) -> DictationResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Self::open_connection(&path)?;
        Ok(Self {
            conn,
            path: Some(path),
            options,
        })
    }

    /// Open the store described by a loaded configuration
    pub fn from_config(config: &Config) -> DictationResult<Self> {
        Self::open(config.database_file(), config.store_options())
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> DictationResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn,
            path: None,
            options: StoreOptions::default(),
        })
    }

    fn open_connection(path: &Path) -> DictationResult<Connection> {
        let mut conn = Connection::open(path)?;

        // WAL lets readers proceed while the single writer commits
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        schema::migrate(&mut conn)?;
        Ok(conn)
    }

    /// Get the underlying connection (for advanced operations)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Path of the sibling backup file
    pub fn backup_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(|p| with_suffix(p, &self.options.backup_suffix))
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Persisted schema version
    pub fn schema_version(&self) -> DictationResult<i64> {
        schema::current_version(&self.conn)
    }

    pub(crate) fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            raw_text: row.get(1)?,
            formatted_text: row.get(2)?,
            timestamp: row.get(3)?,
            formatting_profile: row.get(4)?,
            is_favorite: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Insert a note and its search index entry; returns the new id.
    pub fn insert_note(&self, note: &NewNote) -> DictationResult<i64> {
        let profile = match &note.formatting_profile {
            Some(profile) => {
                validate_formatting_profile(profile)?;
                profile.as_str()
            }
            None => self.options.default_formatting_profile.as_str(),
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO notes (raw_text, formatted_text, timestamp, formatting_profile, is_favorite, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                note.raw_text,
                note.formatted_text,
                note.timestamp,
                profile,
                note.is_favorite,
                now_millis()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO notes_fts (rowid, raw_text, formatted_text) VALUES (?, ?, ?)",
            params![id, note.raw_text, note.formatted_text],
        )?;
        tx.commit()?;

        tracing::debug!("Inserted note {}", id);
        Ok(id)
    }

    /// Get a note by id
    pub fn get_note(&self, note_id: i64) -> DictationResult<Option<Note>> {
        let query = format!("SELECT {} FROM notes n WHERE n.id = ?", NOTE_COLUMNS);
        let note = self
            .conn
            .query_row(&query, [note_id], Self::row_to_note)
            .optional()?;
        Ok(note)
    }

    /// List notes newest first under the given filters
    pub fn list_notes(&self, filters: &NoteFilters) -> DictationResult<Vec<Note>> {
        validate_date_range(filters.start_date, filters.end_date)?;

        let mut query = format!("SELECT {} FROM notes n", NOTE_COLUMNS);
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_filter_conditions(filters, &mut conditions, &mut params);

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY n.timestamp DESC, n.id DESC");
        push_pagination(filters, &mut query, &mut params);

        let mut stmt = self.conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let notes = stmt
            .query_map(params_refs.as_slice(), Self::row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Apply the provided fields to a note.
    ///
    /// Unknown ids are a silent no-op; returns whether a row was changed.
    pub fn update_note(&self, note_id: i64, update: &NoteUpdate) -> DictationResult<bool> {
        if let Some(profile) = &update.formatting_profile {
            validate_formatting_profile(profile)?;
        }
        if update.is_empty() {
            return Ok(false);
        }

        let mut assignments = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(raw) = &update.raw_text {
            assignments.push("raw_text = ?");
            params.push(Box::new(raw.clone()));
        }
        if let Some(formatted) = &update.formatted_text {
            assignments.push("formatted_text = ?");
            params.push(Box::new(formatted.clone()));
        }
        if let Some(profile) = &update.formatting_profile {
            assignments.push("formatting_profile = ?");
            params.push(Box::new(profile.clone()));
        }
        if let Some(favorite) = update.is_favorite {
            assignments.push("is_favorite = ?");
            params.push(Box::new(favorite));
        }
        params.push(Box::new(note_id));

        let query = format!("UPDATE notes SET {} WHERE id = ?", assignments.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(&query, params_refs.as_slice())?;
        if updated > 0 && update.changes_text() {
            Self::reindex_note(&tx, note_id)?;
        }
        tx.commit()?;

        Ok(updated > 0)
    }

    /// Rewrite the search index entry of one note from the primary table.
    fn reindex_note(conn: &Connection, note_id: i64) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM notes_fts WHERE rowid = ?", [note_id])?;
        conn.execute(
            r#"
            INSERT INTO notes_fts (rowid, raw_text, formatted_text)
            SELECT id, raw_text, formatted_text FROM notes WHERE id = ?
            "#,
            [note_id],
        )?;
        Ok(())
    }

    /// Delete a note, its index entry, and its tag associations.
    ///
    /// Unknown ids are a silent no-op; returns whether a row was removed.
    pub fn delete_note(&self, note_id: i64) -> DictationResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            UPDATE tags SET usage_count = MAX(usage_count - 1, 0)
            WHERE id IN (SELECT tag_id FROM note_tags WHERE note_id = ?)
            "#,
            [note_id],
        )?;
        // note_tags rows go with the note via ON DELETE CASCADE
        let deleted = tx.execute("DELETE FROM notes WHERE id = ?", [note_id])?;
        tx.execute("DELETE FROM notes_fts WHERE rowid = ?", [note_id])?;
        tx.commit()?;

        if deleted > 0 {
            tracing::debug!("Deleted note {}", note_id);
        }
        Ok(deleted > 0)
    }

    /// Flip the favorite flag; returns the new value, `None` if the note is missing.
    pub fn toggle_favorite(&self, note_id: i64) -> DictationResult<Option<bool>> {
        let state = self
            .conn
            .query_row(
                "UPDATE notes SET is_favorite = NOT is_favorite WHERE id = ? RETURNING is_favorite",
                [note_id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(state)
    }

    /// Total number of notes in the store
    pub fn count_notes(&self) -> DictationResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Aggregate counts, computed fresh on every call
    pub fn get_stats(&self) -> DictationResult<NoteStats> {
        let stats = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM notes),
                (SELECT COUNT(*) FROM notes WHERE is_favorite = 1),
                (SELECT COUNT(*) FROM tags),
                (SELECT MIN(timestamp) FROM notes),
                (SELECT MAX(timestamp) FROM notes)
            "#,
            [],
            |row| {
                Ok(NoteStats {
                    total: row.get(0)?,
                    favorites: row.get(1)?,
                    tags: row.get(2)?,
                    oldest_timestamp: row.get(3)?,
                    newest_timestamp: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    // =========================================================================
    // Search index maintenance
    // =========================================================================

    /// Number of entries in the search index
    pub fn search_index_count(&self) -> DictationResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes_fts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Rebuild the whole search index from the notes table.
    pub fn rebuild_search_index(&self) -> DictationResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM notes_fts", [])?;
        let indexed = tx.execute(
            r#"
            INSERT INTO notes_fts (rowid, raw_text, formatted_text)
            SELECT id, raw_text, formatted_text FROM notes
            "#,
            [],
        )?;
        tx.commit()?;

        tracing::info!("Rebuilt search index ({} notes)", indexed);
        Ok(indexed)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            usage_count: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Create a tag, or return the id of the existing tag with that name.
    pub fn create_tag(&self, name: &str, color: Option<&str>) -> DictationResult<i64> {
        validate_tag_name(name)?;

        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO tags (name, color, usage_count, created_at)
            VALUES (?, ?, 0, ?)
            "#,
            params![name, color.unwrap_or(DEFAULT_TAG_COLOR), now_millis()],
        )?;

        let id = self
            .conn
            .query_row("SELECT id FROM tags WHERE name = ?", [name], |row| row.get(0))?;
        Ok(id)
    }

    /// Get a tag by id
    pub fn get_tag(&self, tag_id: i64) -> DictationResult<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, usage_count, created_at FROM tags WHERE id = ?",
                [tag_id],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    /// Get a tag by name (case-insensitive)
    pub fn get_tag_by_name(&self, name: &str) -> DictationResult<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, usage_count, created_at FROM tags WHERE name = ?",
                [name],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    /// All tags, most used first
    pub fn get_all_tags(&self) -> DictationResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, color, usage_count, created_at FROM tags
            ORDER BY usage_count DESC, name ASC
            "#,
        )?;
        let tags = stmt
            .query_map([], Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Delete a tag and its associations; returns whether it existed
    pub fn delete_tag(&self, tag_id: i64) -> DictationResult<bool> {
        let deleted = self.conn.execute("DELETE FROM tags WHERE id = ?", [tag_id])?;
        Ok(deleted > 0)
    }

    /// Associate a tag with a note.
    ///
    /// Returns whether an association was created; a no-op when it already
    /// exists or when either id is unknown.
    pub fn add_tag_to_note(&self, note_id: i64, tag_id: i64) -> DictationResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO note_tags (note_id, tag_id, created_at)
            SELECT ?1, ?2, ?3
            WHERE EXISTS (SELECT 1 FROM notes WHERE id = ?1)
              AND EXISTS (SELECT 1 FROM tags WHERE id = ?2)
            "#,
            params![note_id, tag_id, now_millis()],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?",
                [tag_id],
            )?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    /// Tag a note by tag name, creating the tag when needed
    pub fn tag_note(&self, note_id: i64, tag_name: &str) -> DictationResult<bool> {
        let tag_id = self.create_tag(tag_name, None)?;
        self.add_tag_to_note(note_id, tag_id)
    }

    /// Remove a tag from a note; returns whether an association was removed
    pub fn remove_tag_from_note(&self, note_id: i64, tag_id: i64) -> DictationResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM note_tags WHERE note_id = ? AND tag_id = ?",
            params![note_id, tag_id],
        )?;
        if removed > 0 {
            tx.execute(
                "UPDATE tags SET usage_count = MAX(usage_count - 1, 0) WHERE id = ?",
                [tag_id],
            )?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Tags attached to a note, by name
    pub fn get_note_tags(&self, note_id: i64) -> DictationResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.name, t.color, t.usage_count, t.created_at
            FROM tags t
            JOIN note_tags nt ON nt.tag_id = t.id
            WHERE nt.note_id = ?
            ORDER BY t.name ASC
            "#,
        )?;
        let tags = stmt
            .query_map([note_id], Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Snapshot the live store to its backup path.
    ///
    /// Uses `VACUUM INTO`, which produces a consistent copy even while the
    /// store is open, then renames it over any previous backup. Failures are
    /// logged and reported as `false`; they never interrupt the caller.
    pub fn backup(&self) -> bool {
        match self.try_backup() {
            Ok(Some(path)) => {
                tracing::info!("Backed up database to {:?}", path);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Database backup failed: {}", e);
                false
            }
        }
    }

    fn try_backup(&self) -> DictationResult<Option<PathBuf>> {
        let backup_path = match self.backup_path() {
            Some(path) => path,
            None => return Ok(None),
        };

        let staging = with_suffix(&backup_path, ".tmp");
        if staging.exists() {
            fs::remove_file(&staging)?;
        }

        self.conn.execute(
            "VACUUM INTO ?",
            params![staging.to_string_lossy().to_string()],
        )?;
        fs::rename(&staging, &backup_path)?;

        Ok(Some(backup_path))
    }

    /// Replace the live store with its backup.
    ///
    /// The backup is integrity-checked first; a missing or unreadable backup
    /// returns `false` without touching the live store. Otherwise the
    /// connection is closed, the backup copied over the live file, and the
    /// store reopened. If the reopen still fails after a retry the handle is
    /// left on an empty in-memory placeholder and must be discarded.
    pub fn restore(&mut self) -> bool {
        let (path, backup_path) = match (self.path.clone(), self.backup_path()) {
            (Some(path), Some(backup_path)) => (path, backup_path),
            _ => return false,
        };

        if !backup_path.exists() {
            tracing::warn!("No backup found at {:?}", backup_path);
            return false;
        }
        if let Err(e) = verify_backup(&backup_path) {
            tracing::warn!("Refusing to restore from {:?}: {}", backup_path, e);
            return false;
        }

        let placeholder = match Connection::open_in_memory() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Restore aborted: {}", e);
                return false;
            }
        };
        let live = std::mem::replace(&mut self.conn, placeholder);
        if let Err((_, e)) = live.close() {
            tracing::warn!("Closing database before restore failed: {}", e);
        }

        // A stale WAL would be replayed on top of the restored file
        remove_sidecars(&path);
        let copied = fs::copy(&backup_path, &path);

        if let Err(e) = self.reopen(&path) {
            tracing::error!("{}", e);
            return false;
        }

        match copied {
            Ok(_) => {
                tracing::info!("Restored database from {:?}", backup_path);
                true
            }
            Err(e) => {
                tracing::warn!("Restore from {:?} failed: {}", backup_path, e);
                false
            }
        }
    }

    /// Reopen the live file, retrying once.
    fn reopen(&mut self, path: &Path) -> DictationResult<()> {
        let conn = match Self::open_connection(path) {
            Ok(conn) => conn,
            Err(first) => {
                tracing::warn!("Reopening {:?} failed, retrying: {}", path, first);
                Self::open_connection(path).map_err(|e| {
                    DictationError::database_op(format!(
                        "reopening {:?} after restore failed: {}",
                        path, e
                    ))
                })?
            }
        };
        self.conn = conn;
        Ok(())
    }

    /// Compact the search index and the database file.
    pub fn vacuum(&self) -> DictationResult<()> {
        self.conn
            .execute("INSERT INTO notes_fts (notes_fts) VALUES ('optimize')", [])?;
        self.conn.execute_batch("VACUUM;")?;
        tracing::info!("Vacuumed database");
        Ok(())
    }

    /// Back up (when configured) and close the database connection
    pub fn close(self) -> DictationResult<()> {
        if self.options.backup_on_close {
            self.backup();
        }
        self.conn
            .close()
            .map_err(|(_, e)| DictationError::Database(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn insert(db: &Database, text: &str, timestamp: i64) -> i64 {
        db.insert_note(&NewNote::new(text, timestamp)).unwrap()
    }

    fn fts_text(db: &Database, note_id: i64) -> Option<(String, String)> {
        db.connection()
            .query_row(
                "SELECT raw_text, formatted_text FROM notes_fts WHERE rowid = ?",
                [note_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .unwrap()
    }

    #[test]
    fn test_create_database() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.list_notes(&NoteFilters::default()).unwrap().is_empty());
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
        assert!(db.path().is_none());
        assert!(db.backup_path().is_none());
    }

    #[test]
    fn test_insert_and_get_note() {
        let db = Database::new_in_memory().unwrap();
        let before = now_millis();
        let id = db
            .insert_note(&NewNote::new("um hello there", 1_000).with_formatted("Hello there."))
            .unwrap();

        let note = db.get_note(id).unwrap().unwrap();
        assert_eq!(note.raw_text, "um hello there");
        assert_eq!(note.formatted_text, "Hello there.");
        assert_eq!(note.timestamp, 1_000);
        assert_eq!(note.formatting_profile, "standard");
        assert!(!note.is_favorite);
        assert!(note.created_at >= before);

        assert_eq!(
            fts_text(&db, id),
            Some(("um hello there".to_string(), "Hello there.".to_string()))
        );
    }

    #[test]
    fn test_get_missing_note_is_none() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.get_note(42).unwrap().is_none());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let db = Database::new_in_memory().unwrap();
        let first = insert(&db, "one", 1);
        let second = insert(&db, "two", 2);
        assert!(second > first);

        db.delete_note(second).unwrap();
        let third = insert(&db, "three", 3);
        assert!(third > second);
    }

    #[test]
    fn test_update_note_partial_fields() {
        let db = Database::new_in_memory().unwrap();
        let id = insert(&db, "original", 1);
        let created_at = db.get_note(id).unwrap().unwrap().created_at;

        let update = NoteUpdate {
            formatted_text: Some("Edited.".to_string()),
            ..Default::default()
        };
        assert!(db.update_note(id, &update).unwrap());

        let note = db.get_note(id).unwrap().unwrap();
        assert_eq!(note.raw_text, "original");
        assert_eq!(note.formatted_text, "Edited.");
        assert_eq!(note.created_at, created_at);
        assert_eq!(
            fts_text(&db, id),
            Some(("original".to_string(), "Edited.".to_string()))
        );

        let update = NoteUpdate {
            formatting_profile: Some("email".to_string()),
            is_favorite: Some(true),
            ..Default::default()
        };
        assert!(db.update_note(id, &update).unwrap());
        let note = db.get_note(id).unwrap().unwrap();
        assert_eq!(note.formatting_profile, "email");
        assert!(note.is_favorite);
        assert_eq!(note.formatted_text, "Edited.");
    }

    #[test]
    fn test_update_and_delete_missing_are_noops() {
        let db = Database::new_in_memory().unwrap();
        let id = insert(&db, "keep me", 1);
        let before = db.get_stats().unwrap();

        let update = NoteUpdate {
            raw_text: Some("changed".to_string()),
            is_favorite: Some(true),
            ..Default::default()
        };
        assert!(!db.update_note(999_999, &update).unwrap());
        assert!(!db.delete_note(999_999).unwrap());
        assert_eq!(db.toggle_favorite(999_999).unwrap(), None);

        assert_eq!(db.get_stats().unwrap(), before);
        assert_eq!(db.search_index_count().unwrap(), 1);
        assert_eq!(db.get_note(id).unwrap().unwrap().raw_text, "keep me");
    }

    #[test]
    fn test_delete_note_removes_index_and_tags() {
        let db = Database::new_in_memory().unwrap();
        let id = insert(&db, "to delete", 1);
        db.tag_note(id, "work").unwrap();
        assert_eq!(db.get_tag_by_name("work").unwrap().unwrap().usage_count, 1);

        assert!(db.delete_note(id).unwrap());
        assert!(db.get_note(id).unwrap().is_none());
        assert!(fts_text(&db, id).is_none());

        let links: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM note_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 0);
        assert_eq!(db.get_tag_by_name("work").unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn test_toggle_favorite() {
        let db = Database::new_in_memory().unwrap();
        let id = insert(&db, "fav", 1);
        assert_eq!(db.toggle_favorite(id).unwrap(), Some(true));
        assert!(db.get_note(id).unwrap().unwrap().is_favorite);
        assert_eq!(db.toggle_favorite(id).unwrap(), Some(false));
        assert!(!db.get_note(id).unwrap().unwrap().is_favorite);
    }

    #[test]
    fn test_list_notes_filters_and_order() {
        let db = Database::new_in_memory().unwrap();
        let a = insert(&db, "a", 100);
        let b = db.insert_note(&NewNote::new("b", 200).favorite()).unwrap();
        let c = insert(&db, "c", 300);
        db.tag_note(a, "work").unwrap();
        db.tag_note(c, "home").unwrap();

        let all = db.list_notes(&NoteFilters::default()).unwrap();
        let ids: Vec<i64> = all.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![c, b, a]);

        let favorites = db
            .list_notes(&NoteFilters {
                is_favorite: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, b);

        // Inclusive bounds
        let ranged = db
            .list_notes(&NoteFilters {
                start_date: Some(200),
                end_date: Some(300),
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<i64> = ranged.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![c, b]);

        // Any listed tag matches
        let tagged = db
            .list_notes(&NoteFilters {
                tags: vec!["work".to_string(), "home".to_string()],
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<i64> = tagged.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![c, a]);

        let paged = db
            .list_notes(&NoteFilters {
                limit: Some(1),
                offset: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, b);
    }

    #[test]
    fn test_list_notes_tag_filter_is_case_insensitive() {
        let db = Database::new_in_memory().unwrap();
        let id = insert(&db, "x", 1);
        db.tag_note(id, "Work").unwrap();

        let tagged = db
            .list_notes(&NoteFilters {
                tags: vec!["work".to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);
    }

    #[test]
    fn test_list_notes_rejects_inverted_range() {
        let db = Database::new_in_memory().unwrap();
        let result = db.list_notes(&NoteFilters {
            start_date: Some(10),
            end_date: Some(5),
            ..Default::default()
        });
        assert!(matches!(result, Err(DictationError::Validation { .. })));
    }

    #[test]
    fn test_stats() {
        let db = Database::new_in_memory().unwrap();
        assert_eq!(db.get_stats().unwrap(), NoteStats::default());

        let a = insert(&db, "a", 10);
        db.insert_note(&NewNote::new("b", 20).favorite()).unwrap();
        db.tag_note(a, "work").unwrap();
        db.tag_note(a, "idea").unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.favorites, 1);
        assert_eq!(stats.tags, 2);
        assert_eq!(stats.oldest_timestamp, Some(10));
        assert_eq!(stats.newest_timestamp, Some(20));
    }

    #[test]
    fn test_tags() {
        let db = Database::new_in_memory().unwrap();
        let work = db.create_tag("work", Some("#ff0000")).unwrap();
        assert_eq!(db.create_tag("WORK", None).unwrap(), work);
        assert!(db.create_tag("two words", None).is_err());

        let note = insert(&db, "x", 1);
        assert!(db.add_tag_to_note(note, work).unwrap());
        assert!(!db.add_tag_to_note(note, work).unwrap());
        assert!(!db.add_tag_to_note(999, work).unwrap());
        assert!(!db.add_tag_to_note(note, 999).unwrap());

        let tag = db.get_tag(work).unwrap().unwrap();
        assert_eq!(tag.color, "#ff0000");
        assert_eq!(tag.usage_count, 1);
        assert_eq!(db.get_note_tags(note).unwrap().len(), 1);

        assert!(db.remove_tag_from_note(note, work).unwrap());
        assert!(!db.remove_tag_from_note(note, work).unwrap());
        assert_eq!(db.get_tag(work).unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn test_delete_tag_cascades() {
        let db = Database::new_in_memory().unwrap();
        let note = insert(&db, "x", 1);
        db.tag_note(note, "work").unwrap();
        let tag = db.get_tag_by_name("work").unwrap().unwrap();

        assert!(db.delete_tag(tag.id).unwrap());
        assert!(db.get_note_tags(note).unwrap().is_empty());
        assert!(db.get_note(note).unwrap().is_some());
        assert!(!db.delete_tag(tag.id).unwrap());
    }

    #[test]
    fn test_get_all_tags_ordered_by_usage() {
        let db = Database::new_in_memory().unwrap();
        let a = insert(&db, "a", 1);
        let b = insert(&db, "b", 2);
        db.tag_note(a, "rare").unwrap();
        db.tag_note(a, "common").unwrap();
        db.tag_note(b, "common").unwrap();

        let names: Vec<String> = db
            .get_all_tags()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["common", "rare"]);
    }

    #[test]
    fn test_rebuild_search_index() {
        let db = Database::new_in_memory().unwrap();
        insert(&db, "one", 1);
        insert(&db, "two", 2);
        db.connection().execute("DELETE FROM notes_fts", []).unwrap();
        assert_eq!(db.search_index_count().unwrap(), 0);

        assert_eq!(db.rebuild_search_index().unwrap(), 2);
        assert_eq!(db.search_index_count().unwrap(), 2);
    }

    #[test]
    fn test_long_dictation_is_stored_and_searchable() {
        let db = Database::new_in_memory().unwrap();
        let text = format!("{}zeppelin", "word ".repeat(30_000));
        assert!(text.chars().count() > 100_000);

        let id = db.insert_note(&NewNote::new(text.clone(), 1)).unwrap();
        assert_eq!(db.get_note(id).unwrap().unwrap().raw_text, text);

        let none = crate::search::SearchFilters::default();
        let found = db.search("zeppelin", &none, None, 0).unwrap();
        assert_eq!(found.results.len(), 1);
        assert_eq!(found.results[0].id, id);

        let longer = format!("{} airship", text);
        let update = NoteUpdate {
            formatted_text: Some(longer.clone()),
            ..Default::default()
        };
        assert!(db.update_note(id, &update).unwrap());
        assert_eq!(db.get_note(id).unwrap().unwrap().formatted_text, longer);
        assert_eq!(db.search("airship", &none, None, 0).unwrap().results.len(), 1);
    }

    #[test]
    fn test_open_file_database_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("notes.db");

        let db = Database::new(&path).unwrap();
        let id = insert(&db, "persisted", 1);
        drop(db);

        let db = Database::new(&path).unwrap();
        assert_eq!(db.get_note(id).unwrap().unwrap().raw_text, "persisted");
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_backup_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let mut db = Database::new(&path).unwrap();

        let kept = insert(&db, "before backup", 1);
        assert!(db.backup());
        let backup_path = db.backup_path().unwrap();
        assert!(backup_path.exists());
        assert_eq!(backup_path, temp_dir.path().join("notes.db.backup"));

        let lost = insert(&db, "after backup", 2);
        db.delete_note(kept).unwrap();

        assert!(db.restore());
        assert!(db.get_note(kept).unwrap().is_some());
        assert!(db.get_note(lost).unwrap().is_none());
        assert_eq!(db.search_index_count().unwrap(), 1);

        // The store keeps working after a restore
        insert(&db, "after restore", 3);
        assert_eq!(db.count_notes().unwrap(), 2);
    }

    #[test]
    fn test_backup_overwrites_previous() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let mut db = Database::new(&path).unwrap();

        insert(&db, "one", 1);
        assert!(db.backup());
        insert(&db, "two", 2);
        assert!(db.backup());

        insert(&db, "three", 3);
        assert!(db.restore());
        assert_eq!(db.count_notes().unwrap(), 2);
    }

    #[test]
    fn test_restore_without_backup_fails_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = Database::new(temp_dir.path().join("notes.db")).unwrap();
        let id = insert(&db, "still here", 1);

        assert!(!db.restore());
        assert!(db.get_note(id).unwrap().is_some());
    }

    #[test]
    fn test_failed_backup_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let db = Database::new(&path).unwrap();
        let id = insert(&db, "keep working", 1);

        // A directory in the way makes the final rename fail
        fs::create_dir(db.backup_path().unwrap()).unwrap();

        assert!(!db.backup());
        assert!(db.get_note(id).unwrap().is_some());
        db.close().unwrap();
    }

    #[test]
    fn test_restore_rejects_corrupt_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let mut db = Database::new(&path).unwrap();
        let id = insert(&db, "live data", 1);

        fs::write(db.backup_path().unwrap(), "not a database ".repeat(100)).unwrap();

        assert!(!db.restore());
        assert_eq!(db.get_note(id).unwrap().unwrap().raw_text, "live data");
        insert(&db, "still writable", 2);
        assert_eq!(db.count_notes().unwrap(), 2);
    }

    #[test]
    fn test_in_memory_backup_and_restore_are_noops() {
        let mut db = Database::new_in_memory().unwrap();
        assert!(!db.backup());
        assert!(!db.restore());
    }

    #[test]
    fn test_close_takes_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let db = Database::new(&path).unwrap();
        insert(&db, "x", 1);
        db.close().unwrap();

        assert!(temp_dir.path().join("notes.db.backup").exists());
    }

    #[test]
    fn test_close_without_backup_option() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.db");
        let options = StoreOptions {
            backup_on_close: false,
            ..Default::default()
        };
        let db = Database::open(&path, options).unwrap();
        db.close().unwrap();

        assert!(!temp_dir.path().join("notes.db.backup").exists());
    }

    #[test]
    fn test_from_config_uses_default_profile() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(Some(temp_dir.path().to_path_buf())).unwrap();
        config.set_default_formatting_profile("casual").unwrap();

        let db = Database::from_config(&config).unwrap();
        let id = insert(&db, "x", 1);
        assert_eq!(db.get_note(id).unwrap().unwrap().formatting_profile, "casual");
    }

    #[test]
    fn test_vacuum() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("notes.db")).unwrap();
        let id = insert(&db, "x", 1);
        db.vacuum().unwrap();
        assert!(db.get_note(id).unwrap().is_some());
    }
}
