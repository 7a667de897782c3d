//! Search functionality for the dictation core.
//!
//! This module provides query parsing and search execution. A raw query
//! such as `budget tag:work fav:true date:week` is split into free text and
//! structured filters; free text goes through the FTS index, filter-only
//! queries go through the plain listing.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::database::{push_filter_conditions, push_pagination, Database, NOTE_COLUMNS};
use crate::error::DictationResult;
use crate::models::{Note, NoteFilters};
use crate::validation::{validate_date_range, validate_search_query};

/// Period named by a `date:` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePeriod {
    Today,
    /// Weeks start on Sunday
    Week,
    Month,
}

impl DatePeriod {
    fn from_directive(value: &str) -> Option<Self> {
        match value {
            "today" => Some(DatePeriod::Today),
            "week" => Some(DatePeriod::Week),
            "month" => Some(DatePeriod::Month),
            _ => None,
        }
    }

    /// First calendar day of the period containing `today`
    pub fn first_day(self, today: NaiveDate) -> NaiveDate {
        match self {
            DatePeriod::Today => today,
            DatePeriod::Week => {
                today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
            }
            DatePeriod::Month => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                .unwrap_or(today),
        }
    }

    /// Start of the period containing `now`, in epoch milliseconds of
    /// `now`'s time zone midnight.
    pub fn start_millis<Tz: TimeZone>(self, now: &DateTime<Tz>) -> i64 {
        let midnight = self
            .first_day(now.date_naive())
            .and_time(NaiveTime::MIN);
        match now.timezone().from_local_datetime(&midnight).earliest() {
            Some(start) => start.timestamp_millis(),
            // Midnight skipped by a DST jump; fall back to UTC midnight
            None => midnight.and_utc().timestamp_millis(),
        }
    }
}

/// Structured filters extracted from or supplied alongside a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Lower-cased tag names; a note matches if it has any of them
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_favorite: Option<bool>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

impl SearchFilters {
    /// Combine parsed and explicit filters.
    ///
    /// Scalar fields present in `explicit` replace the parsed value; tags
    /// from both sides are concatenated.
    pub fn merge(parsed: SearchFilters, explicit: SearchFilters) -> SearchFilters {
        let mut tags = parsed.tags;
        tags.extend(explicit.tags);
        SearchFilters {
            tags,
            is_favorite: explicit.is_favorite.or(parsed.is_favorite),
            start_date: explicit.start_date.or(parsed.start_date),
            end_date: explicit.end_date.or(parsed.end_date),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.is_favorite.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Listing filters for one page of results
    pub fn to_note_filters(&self, limit: Option<u32>, offset: u32) -> NoteFilters {
        NoteFilters {
            is_favorite: self.is_favorite,
            start_date: self.start_date,
            end_date: self.end_date,
            tags: self.tags.clone(),
            limit,
            offset,
        }
    }
}

/// Parsed search input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Free text left after removing directives
    pub search_text: String,
    pub filters: SearchFilters,
}

/// One page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Note>,
    /// Number of notes in the whole store, not the number of matches
    pub total: i64,
    /// `offset + results.len() < total`
    pub has_more: bool,
}

/// Parse a raw query relative to the current local time.
pub fn parse_query(raw_query: &str) -> ParsedQuery {
    parse_query_at(raw_query, &Local::now())
}

/// Parse a raw query, resolving `date:` directives relative to `now`.
///
/// Supports, in any order and case:
/// - `tag:name` or `#name` to add a tag filter (accumulates)
/// - `fav:true` / `fav:false` to filter on the favorite flag
/// - `date:today` / `date:week` / `date:month` to set a start-of-period floor
///
/// Anything else, including malformed directives, stays in the free text.
pub fn parse_query_at<Tz: TimeZone>(raw_query: &str, now: &DateTime<Tz>) -> ParsedQuery {
    let mut filters = SearchFilters::default();
    let mut text_words = Vec::new();

    for word in raw_query.split_whitespace() {
        let lower = word.to_lowercase();

        if let Some(tag) = lower.strip_prefix("tag:").or_else(|| lower.strip_prefix('#')) {
            if !tag.is_empty() {
                filters.tags.push(tag.to_string());
                continue;
            }
        } else if let Some(value) = lower.strip_prefix("fav:") {
            match value {
                "true" => {
                    filters.is_favorite = Some(true);
                    continue;
                }
                "false" => {
                    filters.is_favorite = Some(false);
                    continue;
                }
                _ => {}
            }
        } else if let Some(value) = lower.strip_prefix("date:") {
            if let Some(period) = DatePeriod::from_directive(value) {
                filters.start_date = Some(period.start_millis(now));
                continue;
            }
        }

        text_words.push(word);
    }

    ParsedQuery {
        search_text: text_words.join(" "),
        filters,
    }
}

/// Turn free text into an FTS5 MATCH expression.
///
/// Every token becomes a quoted prefix term and terms are AND-ed. Characters
/// the tokenizer would treat as separators are dropped, so user input can
/// never inject FTS operators. Returns `None` when nothing searchable is left.
pub fn build_match_expression(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let terms: Vec<String> = cleaned
        .split_whitespace()
        .map(|token| format!("\"{}\"*", token))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl Database {
    /// Search with a raw query string plus explicit filters.
    pub fn search(
        &self,
        query: &str,
        explicit: &SearchFilters,
        limit: Option<u32>,
        offset: u32,
    ) -> DictationResult<SearchResponse> {
        validate_search_query(Some(query))?;
        let parsed = parse_query(query);
        self.execute_search(&parsed, explicit, limit, offset)
    }

    /// Search with an already parsed query.
    pub fn execute_search(
        &self,
        parsed: &ParsedQuery,
        explicit: &SearchFilters,
        limit: Option<u32>,
        offset: u32,
    ) -> DictationResult<SearchResponse> {
        let filters = SearchFilters::merge(parsed.filters.clone(), explicit.clone());
        validate_date_range(filters.start_date, filters.end_date)?;
        let note_filters = filters.to_note_filters(limit, offset);

        let results = if parsed.search_text.is_empty() {
            tracing::debug!("Search dispatched to listing: {:?}", filters);
            self.list_notes(&note_filters)?
        } else {
            tracing::debug!(
                "Search dispatched to index: {:?} {:?}",
                parsed.search_text,
                filters
            );
            self.search_index(&parsed.search_text, &note_filters)?
        };

        let total = self.count_notes()?;
        let has_more = i64::from(offset) + (results.len() as i64) < total;

        Ok(SearchResponse {
            results,
            total,
            has_more,
        })
    }

    /// Ranked free-text lookup through the FTS index.
    ///
    /// Ordered by bm25 relevance, then newest first.
    pub fn search_index(&self, text: &str, filters: &NoteFilters) -> DictationResult<Vec<Note>> {
        let expression = match build_match_expression(text) {
            Some(expression) => expression,
            None => return Ok(Vec::new()),
        };

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(expression)];
        let mut conditions = vec!["notes_fts MATCH ?".to_string()];
        push_filter_conditions(filters, &mut conditions, &mut params);

        let mut query = format!(
            r#"
            SELECT {}
            FROM notes_fts
            JOIN notes n ON n.id = notes_fts.rowid
            WHERE {}
            ORDER BY bm25(notes_fts), n.timestamp DESC
            "#,
            NOTE_COLUMNS,
            conditions.join(" AND ")
        );
        push_pagination(filters, &mut query, &mut params);

        let mut stmt = self.connection().prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let notes = stmt
            .query_map(params_refs.as_slice(), Database::row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Most recent notes
    pub fn get_recent(&self, limit: u32) -> DictationResult<Vec<Note>> {
        self.list_notes(&NoteFilters {
            limit: Some(limit),
            ..Default::default()
        })
    }

    /// Favorited notes, newest first
    pub fn get_favorites(&self, limit: Option<u32>) -> DictationResult<Vec<Note>> {
        self.list_notes(&NoteFilters {
            is_favorite: Some(true),
            limit,
            ..Default::default()
        })
    }

    /// Notes captured within an inclusive timestamp range
    pub fn get_by_date_range(&self, start: i64, end: i64) -> DictationResult<Vec<Note>> {
        self.list_notes(&NoteFilters {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        })
    }
}
