//! Phrase replacement dictionary.
//!
//! Entries map a spoken phrase to literal replacement text. Replacements
//! are applied longest phrase first so that a phrase which is a prefix of
//! another ("kleene star" vs "kleene star closure") never pre-empts it.

use regex::{NoExpand, RegexBuilder};
use rusqlite::{ffi, params, OptionalExtension, Row};

use crate::database::{now_millis, Database};
use crate::error::{DictationError, DictationResult};
use crate::models::{DictionaryEntry, DictionaryEntryUpdate, NewDictionaryEntry};
use crate::validation::{validate_replacement, validate_spoken_phrase};

const ENTRY_COLUMNS: &str =
    "id, spoken_phrase, replacement, is_case_sensitive, is_enabled, created_at, updated_at";

/// Map a UNIQUE violation on `spoken_phrase` to `DuplicatePhrase`.
fn map_unique_violation(err: rusqlite::Error, phrase: &str) -> DictationError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DictationError::DuplicatePhrase(phrase.to_string())
        }
        other => DictationError::Database(other),
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<DictionaryEntry> {
    Ok(DictionaryEntry {
        id: row.get(0)?,
        spoken_phrase: row.get(1)?,
        replacement: row.get(2)?,
        is_case_sensitive: row.get(3)?,
        is_enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Apply entries to `text`, longest phrase first.
///
/// Disabled entries are skipped. Case-sensitive entries are literal
/// substring replacements; the rest match case-insensitively with the
/// phrase escaped, and the replacement is inserted verbatim.
pub fn apply_entries(text: &str, entries: &[DictionaryEntry]) -> DictationResult<String> {
    let mut ordered: Vec<&DictionaryEntry> = entries.iter().filter(|e| e.is_enabled).collect();
    ordered.sort_by(|a, b| {
        b.spoken_phrase
            .chars()
            .count()
            .cmp(&a.spoken_phrase.chars().count())
            .then_with(|| a.spoken_phrase.cmp(&b.spoken_phrase))
    });

    let mut result = text.to_string();
    for entry in ordered {
        if entry.spoken_phrase.is_empty() {
            continue;
        }
        if entry.is_case_sensitive {
            result = result.replace(&entry.spoken_phrase, &entry.replacement);
        } else {
            let pattern = RegexBuilder::new(&regex::escape(&entry.spoken_phrase))
                .case_insensitive(true)
                .build()?;
            result = pattern
                .replace_all(&result, NoExpand(&entry.replacement))
                .into_owned();
        }
    }
    Ok(result)
}

impl Database {
    /// Add a dictionary entry, returning its id.
    ///
    /// A phrase that already exists yields `DuplicatePhrase`.
    pub fn add_dictionary_entry(&self, entry: &NewDictionaryEntry) -> DictationResult<i64> {
        validate_spoken_phrase(&entry.spoken_phrase)?;
        validate_replacement(&entry.replacement)?;

        let now = now_millis();
        self.connection()
            .execute(
                r#"
                INSERT INTO dictionary_entries
                    (spoken_phrase, replacement, is_case_sensitive, is_enabled, created_at, updated_at)
                VALUES (?1, ?2, ?3, 1, ?4, ?4)
                "#,
                params![entry.spoken_phrase, entry.replacement, entry.is_case_sensitive, now],
            )
            .map_err(|e| map_unique_violation(e, &entry.spoken_phrase))?;

        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_dictionary_entry(&self, entry_id: i64) -> DictationResult<Option<DictionaryEntry>> {
        let query = format!("SELECT {} FROM dictionary_entries WHERE id = ?", ENTRY_COLUMNS);
        let entry = self
            .connection()
            .query_row(&query, [entry_id], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// All entries, longest phrase first
    pub fn list_dictionary_entries(&self) -> DictationResult<Vec<DictionaryEntry>> {
        self.query_entries(false)
    }

    fn query_entries(&self, enabled_only: bool) -> DictationResult<Vec<DictionaryEntry>> {
        let filter = if enabled_only {
            "WHERE is_enabled = 1"
        } else {
            ""
        };
        let query = format!(
            "SELECT {} FROM dictionary_entries {} ORDER BY LENGTH(spoken_phrase) DESC, spoken_phrase",
            ENTRY_COLUMNS, filter
        );
        let mut stmt = self.connection().prepare(&query)?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Apply the provided fields to an entry.
    ///
    /// Returns false for unknown ids or an empty update.
    pub fn update_dictionary_entry(
        &self,
        entry_id: i64,
        update: &DictionaryEntryUpdate,
    ) -> DictationResult<bool> {
        let mut sets = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(phrase) = &update.spoken_phrase {
            validate_spoken_phrase(phrase)?;
            sets.push("spoken_phrase = ?");
            params.push(Box::new(phrase.clone()));
        }
        if let Some(replacement) = &update.replacement {
            validate_replacement(replacement)?;
            sets.push("replacement = ?");
            params.push(Box::new(replacement.clone()));
        }
        if let Some(case_sensitive) = update.is_case_sensitive {
            sets.push("is_case_sensitive = ?");
            params.push(Box::new(case_sensitive));
        }
        if let Some(enabled) = update.is_enabled {
            sets.push("is_enabled = ?");
            params.push(Box::new(enabled));
        }

        if sets.is_empty() {
            return Ok(false);
        }

        sets.push("updated_at = ?");
        params.push(Box::new(now_millis()));
        params.push(Box::new(entry_id));

        let query = format!(
            "UPDATE dictionary_entries SET {} WHERE id = ?",
            sets.join(", ")
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let changed = self
            .connection()
            .execute(&query, params_refs.as_slice())
            .map_err(|e| {
                map_unique_violation(e, update.spoken_phrase.as_deref().unwrap_or_default())
            })?;
        Ok(changed > 0)
    }

    /// Flip an entry's enabled flag, returning the new value
    pub fn toggle_dictionary_entry(&self, entry_id: i64) -> DictationResult<Option<bool>> {
        let enabled = self
            .connection()
            .query_row(
                r#"
                UPDATE dictionary_entries
                SET is_enabled = 1 - is_enabled, updated_at = ?1
                WHERE id = ?2
                RETURNING is_enabled
                "#,
                params![now_millis(), entry_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled)
    }

    pub fn delete_dictionary_entry(&self, entry_id: i64) -> DictationResult<bool> {
        let deleted = self
            .connection()
            .execute("DELETE FROM dictionary_entries WHERE id = ?", [entry_id])?;
        Ok(deleted > 0)
    }

    /// Apply every enabled entry to `text`
    pub fn apply_replacements(&self, text: &str) -> DictationResult<String> {
        let entries = self.query_entries(true)?;
        apply_entries(text, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(phrase: &str, replacement: &str, case_sensitive: bool) -> DictionaryEntry {
        DictionaryEntry {
            id: 0,
            spoken_phrase: phrase.to_string(),
            replacement: replacement.to_string(),
            is_case_sensitive: case_sensitive,
            is_enabled: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_longest_phrase_wins() {
        let entries = vec![
            entry("Kleene Star", "K*", false),
            entry("Kleene Star closure", "K*-closure", false),
        ];
        let result = apply_entries("the kleene star closure property", &entries).unwrap();
        assert_eq!(result, "the K*-closure property");

        let result = apply_entries("a kleene star here", &entries).unwrap();
        assert_eq!(result, "a K* here");
    }

    #[test]
    fn test_case_sensitive_is_literal() {
        let entries = vec![entry("GPU", "graphics card", true)];
        let result = apply_entries("GPU and gpu", &entries).unwrap();
        assert_eq!(result, "graphics card and gpu");
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let entries = vec![
            entry("c++ (lang)", "C++", false),
            entry("dollar", "$1 and $name", false),
        ];
        let result = apply_entries("I like C++ (Lang) and cxx (lang)", &entries).unwrap();
        assert_eq!(result, "I like C++ and cxx (lang)");

        let result = apply_entries("one dollar", &entries).unwrap();
        assert_eq!(result, "one $1 and $name");
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let mut disabled = entry("hello", "bye", false);
        disabled.is_enabled = false;
        let result = apply_entries("hello world", &[disabled]).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_dictionary_crud() {
        let db = Database::new_in_memory().unwrap();
        let id = db
            .add_dictionary_entry(&NewDictionaryEntry::new("kleene star", "K*"))
            .unwrap();

        let stored = db.get_dictionary_entry(id).unwrap().unwrap();
        assert_eq!(stored.spoken_phrase, "kleene star");
        assert_eq!(stored.replacement, "K*");
        assert!(stored.is_enabled);
        assert!(!stored.is_case_sensitive);
        assert_eq!(stored.created_at, stored.updated_at);

        let update = DictionaryEntryUpdate {
            replacement: Some("K-star".to_string()),
            is_case_sensitive: Some(true),
            ..Default::default()
        };
        assert!(db.update_dictionary_entry(id, &update).unwrap());
        let stored = db.get_dictionary_entry(id).unwrap().unwrap();
        assert_eq!(stored.replacement, "K-star");
        assert!(stored.is_case_sensitive);
        assert_eq!(stored.spoken_phrase, "kleene star");

        assert_eq!(db.toggle_dictionary_entry(id).unwrap(), Some(false));
        assert_eq!(db.toggle_dictionary_entry(id).unwrap(), Some(true));

        assert!(db.delete_dictionary_entry(id).unwrap());
        assert!(db.get_dictionary_entry(id).unwrap().is_none());
        assert!(!db.delete_dictionary_entry(id).unwrap());
    }

    #[test]
    fn test_missing_entries_are_noops() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.get_dictionary_entry(42).unwrap().is_none());
        assert_eq!(db.toggle_dictionary_entry(42).unwrap(), None);
        let update = DictionaryEntryUpdate {
            replacement: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!db.update_dictionary_entry(42, &update).unwrap());
        assert!(!db
            .update_dictionary_entry(42, &DictionaryEntryUpdate::default())
            .unwrap());
    }

    #[test]
    fn test_duplicate_phrase_is_recoverable() {
        let db = Database::new_in_memory().unwrap();
        db.add_dictionary_entry(&NewDictionaryEntry::new("gpu", "GPU"))
            .unwrap();
        let other = db
            .add_dictionary_entry(&NewDictionaryEntry::new("cpu", "CPU"))
            .unwrap();

        let err = db
            .add_dictionary_entry(&NewDictionaryEntry::new("gpu", "graphics"))
            .unwrap_err();
        assert!(matches!(err, DictationError::DuplicatePhrase(ref p) if p == "gpu"));
        assert!(err.is_recoverable());

        let rename = DictionaryEntryUpdate {
            spoken_phrase: Some("gpu".to_string()),
            ..Default::default()
        };
        let err = db.update_dictionary_entry(other, &rename).unwrap_err();
        assert!(matches!(err, DictationError::DuplicatePhrase(_)));
        assert_eq!(db.list_dictionary_entries().unwrap().len(), 2);
    }

    #[test]
    fn test_only_unique_violations_are_duplicates() {
        let unique = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_UNIQUE),
            None,
        );
        assert!(matches!(
            map_unique_violation(unique, "gpu"),
            DictationError::DuplicatePhrase(_)
        ));

        let not_null = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_NOTNULL),
            None,
        );
        let err = map_unique_violation(not_null, "gpu");
        assert!(matches!(err, DictationError::Database(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_add_rejects_blank_phrase() {
        let db = Database::new_in_memory().unwrap();
        let err = db
            .add_dictionary_entry(&NewDictionaryEntry::new("  ", "x"))
            .unwrap_err();
        assert!(matches!(err, DictationError::Validation { .. }));
    }

    #[test]
    fn test_list_ordered_by_length() {
        let db = Database::new_in_memory().unwrap();
        for phrase in ["ab", "abcd", "abc", "zz"] {
            db.add_dictionary_entry(&NewDictionaryEntry::new(phrase, "x"))
                .unwrap();
        }
        let phrases: Vec<String> = db
            .list_dictionary_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.spoken_phrase)
            .collect();
        assert_eq!(phrases, vec!["abcd", "abc", "ab", "zz"]);
    }

    #[test]
    fn test_apply_replacements_uses_enabled_entries() {
        let db = Database::new_in_memory().unwrap();
        db.add_dictionary_entry(&NewDictionaryEntry::new("kleene star", "K*"))
            .unwrap();
        db.add_dictionary_entry(&NewDictionaryEntry::new("kleene star closure", "K*-closure"))
            .unwrap();
        let off = db
            .add_dictionary_entry(&NewDictionaryEntry::new("property", "prop").case_sensitive())
            .unwrap();
        db.toggle_dictionary_entry(off).unwrap();

        let result = db
            .apply_replacements("the Kleene Star closure property")
            .unwrap();
        assert_eq!(result, "the K*-closure property");
    }
}
