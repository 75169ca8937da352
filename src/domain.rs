//! Domain data shapes shared across the bronze, silver and gold layers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Untyped scalar as captured by the bronze layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl RawValue {
    /// Blank cells and NaN floats both count as missing
    pub fn is_null(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Uniform text rendering of the scalar, `None` when missing
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Integer(i) => Some(i.to_string()),
            RawValue::Float(f) if f.is_nan() => None,
            // Debug keeps the trailing ".0" on integral floats
            RawValue::Float(f) => Some(format!("{f:?}")),
            RawValue::Boolean(b) => Some(b.to_string()),
        }
    }
}

/// Rectangular raw dataset: one header, one row of values per respondent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

/// Borrowed view of one row of a [`RawTable`], keyed by header order
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    values: &'a [RawValue],
}

impl<'a> RawRecord<'a> {
    /// Value at a resolved column index; short rows read as missing
    pub fn get(&self, index: usize) -> &'a RawValue {
        static NULL: RawValue = RawValue::Null;
        self.values.get(index).unwrap_or(&NULL)
    }
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }

    pub fn records(&self) -> impl Iterator<Item = RawRecord<'_>> {
        self.rows.iter().map(|values| RawRecord { values })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Inverse of [`Self::as_str`], used when reading silver artifacts back
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Tri-state answer plus an explicit unknown
    Answer {
        Yes => "yes",
        No => "no",
        Maybe => "maybe",
        Unknown => "unknown",
    }
);

labelled_enum!(
    Gender {
        Male => "male",
        Female => "female",
        Other => "other",
        Unknown => "unknown",
    }
);

labelled_enum!(
    AgeGroup {
        Child => "child",
        YoungAdult => "young_adult",
        Adult => "adult",
        Senior => "senior",
        Unknown => "unknown",
    }
);

labelled_enum!(
    WorkInterference {
        Never => "never",
        Rarely => "rarely",
        Sometimes => "sometimes",
        Often => "often",
        Unknown => "unknown",
    }
);

labelled_enum!(
    /// Survey questions answered with yes/no/maybe
    YesNoField {
        SelfEmployed => "self_employed",
        FamilyHistory => "family_history",
        Treatment => "treatment",
        RemoteWork => "remote_work",
        TechCompany => "tech_company",
        Benefits => "benefits",
        CareOptions => "care_options",
        WellnessProgram => "wellness_program",
        SeekHelp => "seek_help",
        Anonymity => "anonymity",
        Leave => "leave",
        MentalHealthConsequence => "mental_health_consequence",
        PhysHealthConsequence => "phys_health_consequence",
        Coworkers => "coworkers",
        Supervisor => "supervisor",
        MentalHealthInterview => "mental_health_interview",
        PhysHealthInterview => "phys_health_interview",
        MentalVsPhysical => "mental_vs_physical",
        ObsConsequence => "obs_consequence",
    }
);

impl YesNoField {
    /// Name of the normalized companion column, e.g. `treatment_std`
    pub fn std_column(&self) -> String {
        format!("{}_std", self.as_str())
    }
}

/// A yes/no survey answer with the source text it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub raw: Option<String>,
    pub normalized: Answer,
}

/// Which source columns were present in the raw dataset.
/// Derived columns are only emitted for present sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyColumns {
    pub timestamp: bool,
    pub age: bool,
    pub gender: bool,
    pub country: bool,
    pub state: bool,
    pub comments: bool,
    pub no_employees: bool,
    pub work_interfere: bool,
    /// Present yes/no questions, in canonical order
    pub answers: Vec<YesNoField>,
}

impl SurveyColumns {
    /// Every known column present
    pub fn all() -> Self {
        Self {
            timestamp: true,
            age: true,
            gender: true,
            country: true,
            state: true,
            comments: true,
            no_employees: true,
            work_interfere: true,
            answers: YesNoField::ALL.to_vec(),
        }
    }

    pub fn has_answer(&self, field: YesNoField) -> bool {
        self.answers.contains(&field)
    }
}

/// One respondent in the canonical (silver) schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub date: Option<NaiveDate>,
    pub hour: Option<u32>,
    pub age: Option<i64>,
    pub age_group: AgeGroup,
    pub gender: Option<String>,
    pub gender_norm: Gender,
    pub country: Option<String>,
    pub state: Option<String>,
    pub comments: Option<String>,
    pub answers: BTreeMap<YesNoField, SurveyAnswer>,
    pub no_employees: Option<String>,
    pub no_employees_bucket: Option<String>,
    pub work_interfere: Option<String>,
    pub work_interfere_std: WorkInterference,
    /// Unrecognized source columns, aligned with [`CanonicalTable::extra_columns`]
    pub extras: Vec<Option<String>>,
    pub risk_score: u8,
    pub needs_follow_up: bool,
    pub processed_at: DateTime<Utc>,
}

impl CanonicalRecord {
    /// Normalized answer, `Unknown` when the question was not asked
    pub fn answer(&self, field: YesNoField) -> Answer {
        self.answers
            .get(&field)
            .map(|a| a.normalized)
            .unwrap_or(Answer::Unknown)
    }
}

/// The canonical record set produced by one silver run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    pub columns: SurveyColumns,
    pub extra_columns: Vec<String>,
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
