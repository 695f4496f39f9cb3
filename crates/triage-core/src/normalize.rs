//! Canonical forms for the identifiers and dates found in the exports.
//!
//! Nothing here fails: malformed input degrades to `None` /
//! [`ParsedDate::Unknown`] and the rules decide what an unknown value means.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::debug;

/// Canonical rendering of a parsed day.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Cell texts that spreadsheet tooling writes for "no value".
const NULL_PLACEHOLDERS: &[&str] = &["nan", "nat", "none", "null", "-"];

// ── ParsedDate / Age ─────────────────────────────────────────────────────────

/// Outcome of [`normalize_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDate {
    Known(NaiveDate),
    Unknown,
}

/// Whole days elapsed since a date, or unknown when the date was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    Days(i64),
    Unknown,
}

impl Age {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Age::Unknown)
    }

    /// `true` when the age is unknown or strictly greater than `cutoff`.
    pub fn is_stale(&self, cutoff: i64) -> bool {
        match self {
            Age::Days(d) => *d > cutoff,
            Age::Unknown => true,
        }
    }
}

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Strip the trailing `.0` that numeric-to-text coercion leaves on order ids.
///
/// ```
/// use triage_core::normalize::normalize_order_id;
///
/// assert_eq!(normalize_order_id("12345.0"), "12345");
/// assert_eq!(normalize_order_id("12345"), "12345");
/// ```
pub fn normalize_order_id(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Trim a join-key cell; blanks and null placeholders become `None`.
pub fn normalize_key(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if is_placeholder(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || NULL_PLACEHOLDERS.iter().any(|p| value.eq_ignore_ascii_case(p))
}

// ── Dates ────────────────────────────────────────────────────────────────────

/// Parse a day-first `dd/mm/yyyy` or `dd.mm.yyyy` date.
///
/// Anything else, including a `" | "`-joined list of several dates, is
/// [`ParsedDate::Unknown`].
pub fn normalize_date(raw: &str) -> ParsedDate {
    let trimmed = raw.trim();
    if is_placeholder(trimmed) {
        return ParsedDate::Unknown;
    }

    let normalised = trimmed.replace('.', "/");
    match NaiveDate::parse_from_str(&normalised, DATE_FORMAT) {
        Ok(date) => ParsedDate::Known(date),
        Err(_) => {
            debug!("unparseable date \"{}\" treated as unknown", trimmed);
            ParsedDate::Unknown
        }
    }
}

/// Whole calendar days between `date` and `today` (negative for future dates).
pub fn day_age(parsed: ParsedDate, today: NaiveDate) -> Age {
    match parsed {
        ParsedDate::Known(date) => Age::Days((today - date).num_days()),
        ParsedDate::Unknown => Age::Unknown,
    }
}

/// Parse an analysis timestamp and return the calendar day it falls on.
///
/// Accepts RFC 3339 (the day is taken in the timestamp's own offset), naive
/// ISO date-times, plain ISO dates and day-first `dd/mm/yyyy` or
/// `dd.mm.yyyy` dates with an optional `HH:MM[:SS]` time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if is_placeholder(s) {
        return None;
    }

    let normalised = match s.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => s.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.date_naive());
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    // Day-first, as spreadsheet date cells and Excel-exported CSVs carry it.
    let day_first = s.replace('.', "/");
    const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
    for fmt in DAY_FIRST_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&day_first, fmt) {
            return Some(naive.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&day_first, DATE_FORMAT) {
        return Some(date);
    }

    debug!("could not parse analysis timestamp \"{}\"", s);
    None
}

/// Render an analysis timestamp as the canonical `dd/mm/yyyy` string.
pub fn format_analysis_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|d| d.format(DATE_FORMAT).to_string())
}

// ── Text matching ────────────────────────────────────────────────────────────

/// Case-insensitive whole-word search for `CONF` in an order status.
pub fn has_confirmation_token(status: &str) -> bool {
    static CONF: OnceLock<Regex> = OnceLock::new();
    CONF.get_or_init(|| Regex::new(r"(?i)\bCONF\b").expect("regex is valid"))
        .is_match(status)
}

/// `true` when `haystack` contains `needle`, ignoring case.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Export artifact rows such as `See more (12)` in the insights list.
pub fn is_see_more_artifact(value: &str) -> bool {
    static SEE_MORE: OnceLock<Regex> = OnceLock::new();
    SEE_MORE
        .get_or_init(|| Regex::new(r"(?i)See\s*more").expect("regex is valid"))
        .is_match(value)
}

// ── Tests ────────────────────────────────────────────────────────────────────
