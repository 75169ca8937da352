use serde::{Deserialize, Serialize};

use crate::domain::{Answer, CanonicalRecord, CanonicalTable, WorkInterference, YesNoField};

/// Minimum score at which an untreated respondent is flagged for follow-up
pub const FOLLOW_UP_THRESHOLD: u8 = 2;

/// The five binary indicators that make up a risk score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskIndicators {
    pub family_history: bool,
    pub in_treatment: bool,
    pub work_interference: bool,
    pub mental_health_consequence: bool,
    pub phys_health_consequence: bool,
}

impl RiskIndicators {
    pub fn from_record(record: &CanonicalRecord) -> Self {
        Self {
            family_history: record.answer(YesNoField::FamilyHistory) == Answer::Yes,
            in_treatment: record.answer(YesNoField::Treatment) == Answer::Yes,
            work_interference: matches!(
                record.work_interfere_std,
                WorkInterference::Often | WorkInterference::Sometimes
            ),
            mental_health_consequence: record.answer(YesNoField::MentalHealthConsequence)
                == Answer::Yes,
            phys_health_consequence: record.answer(YesNoField::PhysHealthConsequence)
                == Answer::Yes,
        }
    }

    /// Sum of the raised indicators, always within 0..=5
    pub fn score(&self) -> u8 {
        [
            self.family_history,
            self.in_treatment,
            self.work_interference,
            self.mental_health_consequence,
            self.phys_health_consequence,
        ]
        .iter()
        .filter(|flag| **flag)
        .count() as u8
    }

    pub fn needs_follow_up(&self) -> bool {
        self.score() >= FOLLOW_UP_THRESHOLD && !self.in_treatment
    }
}

/// Derives `risk_score` and `needs_follow_up` from normalized answers
#[derive(Debug, Default, Clone)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, record: &CanonicalRecord) -> RiskIndicators {
        RiskIndicators::from_record(record)
    }

    /// Score every record in place
    pub fn apply(&self, table: &mut CanonicalTable) {
        for record in &mut table.records {
            let indicators = self.score(record);
            record.risk_score = indicators.score();
            record.needs_follow_up = indicators.needs_follow_up();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeGroup, Gender, SurveyAnswer};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(answers: &[(YesNoField, Answer)], work: WorkInterference) -> CanonicalRecord {
        let answers: BTreeMap<YesNoField, SurveyAnswer> = answers
            .iter()
            .map(|(field, answer)| {
                (
                    *field,
                    SurveyAnswer {
                        raw: Some(answer.as_str().to_string()),
                        normalized: *answer,
                    },
                )
            })
            .collect();
        CanonicalRecord {
            timestamp: None,
            date: None,
            hour: None,
            age: None,
            age_group: AgeGroup::Unknown,
            gender: None,
            gender_norm: Gender::Unknown,
            country: None,
            state: None,
            comments: None,
            answers,
            no_employees: None,
            no_employees_bucket: None,
            work_interfere: None,
            work_interfere_std: work,
            extras: Vec::new(),
            risk_score: 0,
            needs_follow_up: false,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_all_indicators_raised() {
        let r = record(
            &[
                (YesNoField::FamilyHistory, Answer::Yes),
                (YesNoField::Treatment, Answer::Yes),
                (YesNoField::MentalHealthConsequence, Answer::Yes),
                (YesNoField::PhysHealthConsequence, Answer::Yes),
            ],
            WorkInterference::Often,
        );
        let indicators = RiskScorer::new().score(&r);
        assert_eq!(indicators.score(), 5);
        // Already in treatment
        assert!(!indicators.needs_follow_up());
    }

    #[test]
    fn test_follow_up_requires_untreated_and_threshold() {
        let scorer = RiskScorer::new();

        let untreated = record(
            &[
                (YesNoField::FamilyHistory, Answer::Yes),
                (YesNoField::Treatment, Answer::No),
            ],
            WorkInterference::Sometimes,
        );
        let i = scorer.score(&untreated);
        assert_eq!(i.score(), 2);
        assert!(i.needs_follow_up());

        // Unknown treatment counts as not treated
        let unknown_treatment = record(&[(YesNoField::FamilyHistory, Answer::Yes)], WorkInterference::Often);
        assert!(scorer.score(&unknown_treatment).needs_follow_up());

        let single = record(&[(YesNoField::FamilyHistory, Answer::Yes)], WorkInterference::Rarely);
        assert_eq!(scorer.score(&single).score(), 1);
        assert!(!scorer.score(&single).needs_follow_up());
    }

    #[test]
    fn test_maybe_is_not_a_raised_indicator() {
        let r = record(
            &[
                (YesNoField::FamilyHistory, Answer::Maybe),
                (YesNoField::MentalHealthConsequence, Answer::Maybe),
            ],
            WorkInterference::Never,
        );
        assert_eq!(RiskScorer::new().score(&r).score(), 0);
    }

    #[test]
    fn test_apply_sets_fields_within_bounds() {
        let mut table = CanonicalTable {
            records: vec![
                record(&[], WorkInterference::Unknown),
                record(
                    &[
                        (YesNoField::FamilyHistory, Answer::Yes),
                        (YesNoField::PhysHealthConsequence, Answer::Yes),
                    ],
                    WorkInterference::Unknown,
                ),
            ],
            ..Default::default()
        };
        RiskScorer::new().apply(&mut table);

        for r in &table.records {
            assert!(r.risk_score <= 5);
            assert_eq!(
                r.needs_follow_up,
                r.risk_score >= 2 && r.answer(YesNoField::Treatment) != Answer::Yes
            );
        }
        assert_eq!(table.records[0].risk_score, 0);
        assert_eq!(table.records[1].risk_score, 2);
        assert!(table.records[1].needs_follow_up);
    }
}
