//! Input validation for the dictation core.
//!
//! This module provides validation functions for caller-supplied inputs.
//! Note text is never length-limited; a long dictation is still a record.
//! All validators return DictationError::Validation on failure.

use crate::error::{DictationError, DictationResult};

pub const MAX_SEARCH_QUERY_LENGTH: usize = 500;
pub const MAX_TAG_NAME_LENGTH: usize = 100;
pub const MAX_PHRASE_LENGTH: usize = 200;
pub const MAX_REPLACEMENT_LENGTH: usize = 1_000;
pub const MAX_PROFILE_LENGTH: usize = 64;

fn check_length(value: &str, max: usize, field_name: &str) -> DictationResult<()> {
    let len = value.chars().count();
    if len > max {
        return Err(DictationError::validation(
            field_name,
            format!("cannot exceed {} characters (got {})", max, len),
        ));
    }
    Ok(())
}

/// Validate a formatting profile label.
pub fn validate_formatting_profile(profile: &str) -> DictationResult<()> {
    if profile.trim().is_empty() {
        return Err(DictationError::validation(
            "formatting_profile",
            "cannot be empty or whitespace only",
        ));
    }
    check_length(profile, MAX_PROFILE_LENGTH, "formatting_profile")
}

/// Validate a free-text search query.
pub fn validate_search_query(query: Option<&str>) -> DictationResult<()> {
    if let Some(q) = query {
        check_length(q, MAX_SEARCH_QUERY_LENGTH, "search_query")?;
    }
    Ok(())
}

/// Validate a tag name.
///
/// Tag names must be:
/// - Non-empty
/// - No longer than MAX_TAG_NAME_LENGTH characters
/// - Free of whitespace, so they can be written as a `tag:` directive
pub fn validate_tag_name(name: &str) -> DictationResult<()> {
    if name.is_empty() {
        return Err(DictationError::validation("tag_name", "cannot be empty"));
    }

    check_length(name, MAX_TAG_NAME_LENGTH, "tag_name")?;

    if name.chars().any(char::is_whitespace) {
        return Err(DictationError::validation(
            "tag_name",
            "cannot contain whitespace",
        ));
    }

    Ok(())
}

/// Validate an inclusive timestamp range.
pub fn validate_date_range(start: Option<i64>, end: Option<i64>) -> DictationResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(DictationError::validation(
                "date_range",
                format!("start ({}) is after end ({})", start, end),
            ));
        }
    }
    Ok(())
}

/// Validate a dictionary spoken phrase.
pub fn validate_spoken_phrase(phrase: &str) -> DictationResult<()> {
    if phrase.trim().is_empty() {
        return Err(DictationError::validation(
            "spoken_phrase",
            "cannot be empty or whitespace only",
        ));
    }
    check_length(phrase, MAX_PHRASE_LENGTH, "spoken_phrase")
}

/// Validate a dictionary replacement. Empty replacements delete the phrase.
pub fn validate_replacement(replacement: &str) -> DictationResult<()> {
    check_length(replacement, MAX_REPLACEMENT_LENGTH, "replacement")
}
