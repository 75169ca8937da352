//! Value-level normalization rules.
//!
//! Each function maps one untyped [`RawValue`] to its canonical form. Parsers
//! that can fail return a [`ParseOutcome`] so the degrade-on-malformed policy is
//! an explicit branch at the call site.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::domain::{AgeGroup, Answer, Gender, RawValue, WorkInterference};

/// Result of parsing one raw value
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// The value parsed into its canonical type
    Parsed(T),
    /// The cell was blank, NaN or a missing-value token
    Missing,
    /// The cell held text that does not parse; carries that text
    Malformed(String),
}

impl<T> ParseOutcome<T> {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseOutcome::Malformed(_))
    }
}

const YES_TOKENS: &[&str] = &["yes", "y", "true", "1", "sim", "s"];
const NO_TOKENS: &[&str] = &["no", "n", "false", "0", "não", "nao"];
const MAYBE_TOKENS: &[&str] = &["maybe", "sometimes", "unsure", "don't know", "dont know"];

/// Free-text tokens that mean "no value"
const NULL_TOKENS: &[&str] = &["nan", "none", "na", "n/a"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Header canonicalization: trimmed, lower-case, spaces replaced by underscores
pub fn canonical_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Map a yes/no/maybe answer through the fixed lexicon.
///
/// Anything outside the lexicon, including missing values, is `Unknown`.
pub fn normalize_yes_no(value: &RawValue) -> Answer {
    let Some(text) = value.as_text() else {
        return Answer::Unknown;
    };
    let token = text.trim().to_lowercase();
    let token = token.as_str();
    if YES_TOKENS.contains(&token) {
        Answer::Yes
    } else if NO_TOKENS.contains(&token) {
        Answer::No
    } else if MAYBE_TOKENS.contains(&token) {
        Answer::Maybe
    } else {
        Answer::Unknown
    }
}

pub fn normalize_gender(value: &RawValue) -> Gender {
    let Some(text) = value.as_text() else {
        return Gender::Unknown;
    };
    let letters: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();
    match letters.as_str() {
        "" => Gender::Unknown,
        "male" | "m" | "man" => Gender::Male,
        "female" | "f" | "woman" | "w" => Gender::Female,
        // trans, nonbinary, nb, other and every other non-empty answer
        _ => Gender::Other,
    }
}

/// Parse an age as an integer, truncating fractional numbers
pub fn parse_age(value: &RawValue) -> ParseOutcome<i64> {
    match value {
        RawValue::Null => ParseOutcome::Missing,
        RawValue::Integer(i) => ParseOutcome::Parsed(*i),
        RawValue::Float(f) if f.is_nan() => ParseOutcome::Missing,
        RawValue::Float(f) if f.is_finite() => ParseOutcome::Parsed(f.trunc() as i64),
        RawValue::Float(f) => ParseOutcome::Malformed(f.to_string()),
        RawValue::Boolean(b) => ParseOutcome::Malformed(b.to_string()),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return ParseOutcome::Missing;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return ParseOutcome::Parsed(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => ParseOutcome::Parsed(f.trunc() as i64),
                _ => ParseOutcome::Malformed(s.clone()),
            }
        }
    }
}

pub fn age_group(age: Option<i64>) -> AgeGroup {
    match age {
        None => AgeGroup::Unknown,
        Some(a) if a < 18 => AgeGroup::Child,
        Some(a) if a < 30 => AgeGroup::YoungAdult,
        Some(a) if a < 60 => AgeGroup::Adult,
        Some(_) => AgeGroup::Senior,
    }
}

/// Bucket free-form company size text.
///
/// Text that already carries a range (`-` or `+`) is kept as is. Otherwise every
/// digit in the text is concatenated into one number and bucketed. Text without
/// digits is reported as malformed so the caller can pass it through.
pub fn bucket_employees(value: &RawValue) -> ParseOutcome<String> {
    let Some(text) = value.as_text() else {
        return ParseOutcome::Missing;
    };
    if text.trim().is_empty() {
        return ParseOutcome::Missing;
    }
    if text.contains('-') || text.contains('+') {
        return ParseOutcome::Parsed(text);
    }
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return ParseOutcome::Malformed(text);
    }
    // Overflow only happens for absurdly long digit runs, which are large companies
    let n = digits.parse::<u64>().unwrap_or(u64::MAX);
    let bucket = match n {
        0..=5 => "1-5",
        6..=25 => "6-25",
        26..=100 => "26-100",
        101..=500 => "101-500",
        _ => "500+",
    };
    ParseOutcome::Parsed(bucket.to_string())
}

pub fn normalize_work_interfere(value: &RawValue) -> ParseOutcome<WorkInterference> {
    let Some(text) = value.as_text() else {
        return ParseOutcome::Missing;
    };
    let token = text.trim().to_lowercase();
    if token.is_empty() || NULL_TOKENS.contains(&token.as_str()) {
        return ParseOutcome::Missing;
    }
    match WorkInterference::from_label(&token) {
        Some(w) => ParseOutcome::Parsed(w),
        None => ParseOutcome::Malformed(text),
    }
}

/// Trim free text and collapse missing-value tokens to `None`
pub fn clean_text(value: &RawValue) -> Option<String> {
    let text = value.as_text()?;
    let trimmed = text.trim();
    if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_timestamp(value: &RawValue) -> ParseOutcome<NaiveDateTime> {
    let text = match value {
        RawValue::Null => return ParseOutcome::Missing,
        RawValue::Text(s) => s.trim(),
        other => return ParseOutcome::Malformed(other.as_text().unwrap_or_default()),
    };
    if text.is_empty() || NULL_TOKENS.contains(&text.to_lowercase().as_str()) {
        return ParseOutcome::Missing;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return ParseOutcome::Parsed(dt.naive_utc());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return ParseOutcome::Parsed(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return ParseOutcome::Parsed(dt);
            }
        }
    }
    ParseOutcome::Malformed(text.to_string())
}
