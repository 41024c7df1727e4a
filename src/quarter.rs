//! Quarter label parsing and ordering.
//!
//! Agents and data vendors label fiscal quarters in many shapes ("Q2 2025",
//! "2025Q2", "Q2-2025", ISO timestamps, epoch milliseconds from dataframe
//! exports, or a quarter mentioned inside a sentence). Everything is normalized
//! to the canonical `"Q<1-4> <YYYY>"` form. Tokens that cannot be understood are
//! passed through unchanged rather than rejected.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

fn quarter_then_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Q([1-4])\s*[-_/ ]?\s*(?:FY\s*)?(\d{4})\b")
            .expect("quarter-year regex must compile")
    })
}

fn year_then_quarter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{4})\s*[-_/ ]?\s*Q([1-4])\b").expect("year-quarter regex must compile")
    })
}

fn quarter_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Q[1-4].*\d{4}|\d{4}.*Q[1-4]").expect("quarter-like regex must compile")
    })
}

/// A parsed fiscal quarter. Ordering is chronological: year first, then quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuarterKey {
    pub year: i32,
    pub quarter: u32,
}

impl QuarterKey {
    pub fn new(year: i32, quarter: u32) -> Option<Self> {
        if (1..=4).contains(&quarter) {
            Some(Self { year, quarter })
        } else {
            None
        }
    }

    /// The calendar quarter containing `date`.
    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            quarter: date.month0() / 3 + 1,
        }
    }

    /// Parses any supported quarter representation.
    ///
    /// Order of attempts: an explicit `Q#`/year pair in either order, an epoch
    /// timestamp (10 or 13 digits), then generic date parsing.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        parse_quarter_pattern(token)
            .or_else(|| parse_epoch(token))
            .or_else(|| parse_date(token).map(|d| Self::from_date(&d)))
    }

    pub fn sort_key(&self) -> (i32, u32) {
        (self.year, self.quarter)
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{} {}", self.quarter, self.year)
    }
}

fn parse_quarter_pattern(token: &str) -> Option<QuarterKey> {
    if let Some(caps) = quarter_then_year_re().captures(token) {
        let quarter = caps[1].parse().ok()?;
        let year = caps[2].parse().ok()?;
        return QuarterKey::new(year, quarter);
    }
    if let Some(caps) = year_then_quarter_re().captures(token) {
        let year = caps[1].parse().ok()?;
        let quarter = caps[2].parse().ok()?;
        return QuarterKey::new(year, quarter);
    }
    None
}

fn parse_epoch(token: &str) -> Option<QuarterKey> {
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let raw: i64 = token.parse().ok()?;
    let seconds = match token.len() {
        13 => raw / 1000,
        10 => raw,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0).map(|dt| QuarterKey::from_date(&dt))
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(token, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(token, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(token, fmt) {
            return Some(date);
        }
    }

    // Month-only shapes ("2025-06", "June 2025", "Jun 2025") need a day to parse.
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", token), "%Y-%m-%d") {
        return Some(date);
    }
    let with_day = format!("1 {}", token);
    for fmt in ["%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&with_day, fmt) {
            return Some(date);
        }
    }
    None
}

/// Canonical `"Q# YYYY"` label for `token`, or the token unchanged when it
/// cannot be interpreted as a quarter.
pub fn normalize_quarter(token: &str) -> String {
    match QuarterKey::parse(token) {
        Some(key) => key.to_string(),
        None => token.to_string(),
    }
}

/// Canonical label for the calendar quarter containing `date`.
pub fn quarter_label_for_date<D: Datelike>(date: &D) -> String {
    QuarterKey::from_date(date).to_string()
}

/// Chronological sort key. Labels that fail to parse sort first as `(0, 0)`.
pub fn quarter_sort_key(label: &str) -> (i32, u32) {
    QuarterKey::parse(label)
        .map(|key| key.sort_key())
        .unwrap_or((0, 0))
}

/// Stable chronological sort of quarter labels.
pub fn sort_quarter_labels(labels: &mut [String]) {
    labels.sort_by_key(|label| quarter_sort_key(label));
}

/// Loose check used for orientation detection: a `Q1`-`Q4` token and a
/// four-digit year anywhere in the label, in either order.
pub fn looks_like_quarter(token: &str) -> bool {
    quarter_like_re().is_match(token)
}
