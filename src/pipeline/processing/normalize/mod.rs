use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::domain::{
    AgeGroup, CanonicalRecord, CanonicalTable, RawRecord, RawTable, SurveyAnswer, SurveyColumns,
    WorkInterference, YesNoField,
};

pub mod lexicon;

pub use lexicon::{
    age_group, bucket_employees, canonical_column_name, clean_text, normalize_gender,
    normalize_work_interfere, normalize_yes_no, parse_age, parse_timestamp, ParseOutcome,
};

/// Columns the normalizer derives; a raw column with one of these names would
/// collide with the derived value and is dropped.
const DERIVED_COLUMNS: &[&str] = &[
    "date",
    "hour",
    "age_group",
    "gender_norm",
    "no_employees_bucket",
    "work_interfere_std",
    "risk_score",
    "needs_follow_up",
    "processed_at",
];

/// Output of one normalization pass
#[derive(Debug, Clone)]
pub struct NormalizeReport {
    pub table: CanonicalTable,
    /// Malformed value counts per canonical column name
    pub malformed: BTreeMap<String, usize>,
}

impl NormalizeReport {
    pub fn malformed_total(&self) -> usize {
        self.malformed.values().sum()
    }
}

/// Trait for mapping a raw table onto the canonical survey schema
pub trait Normalizer {
    fn normalize(&self, raw: &RawTable, processed_at: DateTime<Utc>) -> NormalizeReport;
}

/// Source column positions resolved against canonical header names.
/// `None` means the source does not carry the column.
#[derive(Debug, Clone, Default)]
struct RawColumns {
    timestamp: Option<usize>,
    age: Option<usize>,
    gender: Option<usize>,
    country: Option<usize>,
    state: Option<usize>,
    comments: Option<usize>,
    no_employees: Option<usize>,
    work_interfere: Option<usize>,
    answers: Vec<(YesNoField, usize)>,
    extras: Vec<(String, usize)>,
}

impl RawColumns {
    fn resolve(raw: &RawTable) -> Self {
        let mut cols = RawColumns::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (idx, header) in raw.columns.iter().enumerate() {
            let name = canonical_column_name(header);
            if !seen.insert(name.clone()) {
                warn!(column = %header, canonical = %name, "Duplicate column after canonicalization, keeping first");
                continue;
            }

            let slot = match name.as_str() {
                "timestamp" => &mut cols.timestamp,
                "age" => &mut cols.age,
                "gender" => &mut cols.gender,
                "country" => &mut cols.country,
                "state" => &mut cols.state,
                "comments" => &mut cols.comments,
                "no_employees" => &mut cols.no_employees,
                "work_interfere" => &mut cols.work_interfere,
                other => {
                    if let Some(field) = YesNoField::from_label(other) {
                        cols.answers.push((field, idx));
                    } else if is_derived_column(other) {
                        warn!(column = %other, "Source column collides with a derived column, dropping");
                    } else {
                        cols.extras.push((other.to_string(), idx));
                    }
                    continue;
                }
            };
            *slot = Some(idx);
        }

        cols.answers.sort_by_key(|(field, _)| *field);
        cols
    }

    fn presence(&self) -> SurveyColumns {
        SurveyColumns {
            timestamp: self.timestamp.is_some(),
            age: self.age.is_some(),
            gender: self.gender.is_some(),
            country: self.country.is_some(),
            state: self.state.is_some(),
            comments: self.comments.is_some(),
            no_employees: self.no_employees.is_some(),
            work_interfere: self.work_interfere.is_some(),
            answers: self.answers.iter().map(|(field, _)| *field).collect(),
        }
    }
}

fn is_derived_column(name: &str) -> bool {
    DERIVED_COLUMNS.contains(&name)
        || name
            .strip_suffix("_std")
            .and_then(YesNoField::from_label)
            .is_some()
}

/// Default survey normalizer implementing the fixed lexicon rules
#[derive(Debug, Default, Clone)]
pub struct DefaultNormalizer;

impl DefaultNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn normalize_record(
        &self,
        cols: &RawColumns,
        raw: RawRecord<'_>,
        processed_at: DateTime<Utc>,
        malformed: &mut BTreeMap<String, usize>,
    ) -> CanonicalRecord {
        let mut degrade = |column: &str, outcome_text: &str| {
            debug!(column, value = %outcome_text, "Malformed value degraded");
            *malformed.entry(column.to_string()).or_insert(0) += 1;
        };

        let timestamp = match cols.timestamp.map(|i| parse_timestamp(raw.get(i))) {
            Some(ParseOutcome::Parsed(ts)) => Some(ts),
            Some(ParseOutcome::Malformed(text)) => {
                degrade("timestamp", &text);
                None
            }
            Some(ParseOutcome::Missing) | None => None,
        };

        let age = match cols.age.map(|i| parse_age(raw.get(i))) {
            Some(ParseOutcome::Parsed(a)) => Some(a),
            Some(ParseOutcome::Malformed(text)) => {
                degrade("age", &text);
                None
            }
            Some(ParseOutcome::Missing) | None => None,
        };

        let no_employees_raw = cols.no_employees.map(|i| raw.get(i));
        let no_employees_bucket = match no_employees_raw.map(bucket_employees) {
            Some(ParseOutcome::Parsed(bucket)) => Some(bucket),
            // Unbucketable text passes through unchanged
            Some(ParseOutcome::Malformed(text)) => {
                degrade("no_employees", &text);
                Some(text)
            }
            Some(ParseOutcome::Missing) | None => None,
        };

        let work_interfere_raw = cols.work_interfere.map(|i| raw.get(i));
        let work_interfere_std = match work_interfere_raw.map(normalize_work_interfere) {
            Some(ParseOutcome::Parsed(w)) => w,
            Some(ParseOutcome::Malformed(text)) => {
                degrade("work_interfere", &text);
                WorkInterference::Unknown
            }
            Some(ParseOutcome::Missing) | None => WorkInterference::Unknown,
        };

        let answers = cols
            .answers
            .iter()
            .map(|(field, i)| {
                let value = raw.get(*i);
                let answer = SurveyAnswer {
                    raw: value.as_text(),
                    normalized: normalize_yes_no(value),
                };
                (*field, answer)
            })
            .collect();

        let gender_raw = cols.gender.map(|i| raw.get(i));

        CanonicalRecord {
            timestamp,
            date: timestamp.map(|ts| ts.date()),
            hour: timestamp.map(|ts| ts.hour()),
            age,
            age_group: if cols.age.is_some() {
                age_group(age)
            } else {
                AgeGroup::Unknown
            },
            gender: gender_raw.and_then(|v| v.as_text()),
            gender_norm: gender_raw
                .map(normalize_gender)
                .unwrap_or(crate::domain::Gender::Unknown),
            country: cols.country.and_then(|i| clean_text(raw.get(i))),
            state: cols.state.and_then(|i| clean_text(raw.get(i))),
            comments: cols.comments.and_then(|i| clean_text(raw.get(i))),
            answers,
            no_employees: no_employees_raw.and_then(|v| v.as_text()),
            no_employees_bucket,
            work_interfere: work_interfere_raw.and_then(|v| v.as_text()),
            work_interfere_std,
            extras: cols
                .extras
                .iter()
                .map(|(_, i)| raw.get(*i).as_text())
                .collect(),
            risk_score: 0,
            needs_follow_up: false,
            processed_at,
        }
    }
}

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, raw: &RawTable, processed_at: DateTime<Utc>) -> NormalizeReport {
        let cols = RawColumns::resolve(raw);
        let mut malformed = BTreeMap::new();

        let records = raw
            .records()
            .map(|record| self.normalize_record(&cols, record, processed_at, &mut malformed))
            .collect();

        NormalizeReport {
            table: CanonicalTable {
                columns: cols.presence(),
                extra_columns: cols.extras.iter().map(|(name, _)| name.clone()).collect(),
                records,
            },
            malformed,
        }
    }
}

/// Drop exact-duplicate records, keeping the first occurrence of each.
/// Returns the number of records removed.
pub fn deduplicate(table: &mut CanonicalTable) -> usize {
    let before = table.records.len();
    let mut seen: HashSet<CanonicalRecord> = HashSet::with_capacity(before);
    table.records.retain(|record| seen.insert(record.clone()));
    before - table.records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Answer, Gender, RawValue};

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn survey_table() -> RawTable {
        let mut raw = RawTable::new(
            [
                "Timestamp",
                "Age",
                "Gender",
                "Country",
                "treatment",
                "no_employees",
                "work_interfere",
                "Extra Notes",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        raw.push_row(vec![
            text("2014-08-27 11:29:31"),
            RawValue::Integer(15),
            text("Female"),
            text(" Brazil "),
            text("Yes"),
            text("6-25"),
            text("Often"),
            text("first"),
        ]);
        raw.push_row(vec![
            text("not a date"),
            text("45"),
            text("m"),
            text("n/a"),
            text("No"),
            text("40"),
            text("NA"),
            RawValue::Null,
        ]);
        raw.push_row(vec![
            RawValue::Null,
            text("N/A"),
            RawValue::Null,
            RawValue::Null,
            RawValue::Null,
            text("lots"),
            text("constantly"),
            text("third"),
        ]);
        raw
    }

    #[test]
    fn test_normalize_survey_rows() {
        let report = DefaultNormalizer::new().normalize(&survey_table(), Utc::now());
        let table = &report.table;

        assert_eq!(table.len(), 3);
        assert!(table.columns.timestamp && table.columns.age && table.columns.gender);
        assert!(!table.columns.state);
        assert_eq!(table.columns.answers, vec![YesNoField::Treatment]);
        assert_eq!(table.extra_columns, vec!["extra_notes".to_string()]);

        let groups: Vec<AgeGroup> = table.records.iter().map(|r| r.age_group).collect();
        assert_eq!(groups, vec![AgeGroup::Child, AgeGroup::Adult, AgeGroup::Unknown]);

        let first = &table.records[0];
        assert_eq!(first.hour, Some(11));
        assert_eq!(first.country.as_deref(), Some("Brazil"));
        assert_eq!(first.gender_norm, Gender::Female);
        assert_eq!(first.answer(YesNoField::Treatment), Answer::Yes);
        assert_eq!(first.no_employees_bucket.as_deref(), Some("6-25"));
        assert_eq!(first.work_interfere_std, WorkInterference::Often);

        let second = &table.records[1];
        assert_eq!(second.timestamp, None);
        assert_eq!(second.country, None);
        assert_eq!(second.no_employees_bucket.as_deref(), Some("26-100"));
        assert_eq!(second.work_interfere_std, WorkInterference::Unknown);

        let third = &table.records[2];
        assert_eq!(third.answer(YesNoField::Treatment), Answer::Unknown);
        assert_eq!(third.gender_norm, Gender::Unknown);
        assert_eq!(third.no_employees_bucket.as_deref(), Some("lots"));
        assert_eq!(third.extras, vec![Some("third".to_string())]);
    }

    #[test]
    fn test_malformed_values_are_counted_not_fatal() {
        let report = DefaultNormalizer::new().normalize(&survey_table(), Utc::now());
        assert_eq!(report.malformed.get("timestamp"), Some(&1));
        assert_eq!(report.malformed.get("age"), Some(&1));
        assert_eq!(report.malformed.get("no_employees"), Some(&1));
        assert_eq!(report.malformed.get("work_interfere"), Some(&1));
        assert_eq!(report.malformed_total(), 4);
    }

    #[test]
    fn test_absent_age_column_is_structural() {
        let mut raw = RawTable::new(vec!["Gender".to_string()]);
        raw.push_row(vec![text("male")]);
        let report = DefaultNormalizer::new().normalize(&raw, Utc::now());
        assert!(!report.table.columns.age);
        assert_eq!(report.table.records[0].age_group, AgeGroup::Unknown);
        assert!(report.malformed.is_empty());
    }

    #[test]
    fn test_duplicate_and_colliding_headers() {
        let mut raw = RawTable::new(
            ["Age", "age", "age_group", "treatment_std"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        raw.push_row(vec![RawValue::Integer(20), RawValue::Integer(70), text("x"), text("y")]);
        let report = DefaultNormalizer::new().normalize(&raw, Utc::now());
        assert_eq!(report.table.records[0].age, Some(20));
        assert!(report.table.extra_columns.is_empty());
    }

    #[test]
    fn test_deduplicate_is_idempotent() {
        let mut raw = survey_table();
        let first_row = raw.rows[0].clone();
        raw.push_row(first_row);
        let processed_at = Utc::now();
        let mut report = DefaultNormalizer::new().normalize(&raw, processed_at);

        assert_eq!(deduplicate(&mut report.table), 1);
        let count = report.table.len();
        assert_eq!(count, 3);
        assert_eq!(deduplicate(&mut report.table), 0);
        assert_eq!(report.table.len(), count);
    }
}
