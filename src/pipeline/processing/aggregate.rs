//! Descriptive metrics over one canonical record set.
//!
//! Every output here is a pure, row-order-independent function of the record
//! contents: counts are exact, risk statistics are computed from integer sums,
//! and distribution rows are sorted by (count desc, category asc, null last).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::constants::{
    DESVIO_PADRAO_RISCO, IDADES_FALTANTES, MEDIANA_RISCO, MEDIA_RISCO, TABLE_FALTANTES,
    TAXA_TRATAMENTO, TIMESTAMPS_UNICOS, TOTAL_RESPOSTAS, TOTAL_TRATAMENTOS, TRATAMENTOS_SIM,
};
use crate::domain::{Answer, CanonicalRecord, CanonicalTable, YesNoField};
use crate::pipeline::columnar::silver::silver_columns;

/// A scalar summary value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Null,
}

impl MetricValue {
    pub fn from_count(count: Option<usize>) -> Self {
        count.map_or(MetricValue::Null, |c| MetricValue::Integer(c as i64))
    }

    /// NaN and infinities are not representable downstream and become null
    pub fn from_float(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => MetricValue::Float(v),
            _ => MetricValue::Null,
        }
    }

    /// Uniform text rendering used by the summary artifact and the mirror
    pub fn to_text(&self) -> Option<String> {
        match self {
            MetricValue::Integer(i) => Some(i.to_string()),
            MetricValue::Float(f) => Some(format!("{f:?}")),
            MetricValue::Null => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreatmentStats {
    pub total: u64,
    pub yes: u64,
    /// `yes / total`, `None` when there are no responses
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_respostas: usize,
    pub timestamps_unicos: Option<usize>,
    pub idades_faltantes: Option<usize>,
    pub treatment: Option<TreatmentStats>,
    pub media_risco: Option<f64>,
    pub mediana_risco: Option<f64>,
    pub desvio_padrao_risco: Option<f64>,
}

impl SummaryMetrics {
    /// Named scalar rows in their published order
    pub fn rows(&self) -> Vec<(&'static str, MetricValue)> {
        vec![
            (TOTAL_RESPOSTAS, MetricValue::from_count(Some(self.total_respostas))),
            (TIMESTAMPS_UNICOS, MetricValue::from_count(self.timestamps_unicos)),
            (IDADES_FALTANTES, MetricValue::from_count(self.idades_faltantes)),
            (
                TOTAL_TRATAMENTOS,
                self.treatment
                    .map_or(MetricValue::Null, |t| MetricValue::Integer(t.total as i64)),
            ),
            (
                TRATAMENTOS_SIM,
                self.treatment
                    .map_or(MetricValue::Null, |t| MetricValue::Integer(t.yes as i64)),
            ),
            (
                TAXA_TRATAMENTO,
                MetricValue::from_float(self.treatment.and_then(|t| t.rate)),
            ),
            (MEDIA_RISCO, MetricValue::from_float(self.media_risco)),
            (MEDIANA_RISCO, MetricValue::from_float(self.mediana_risco)),
            (DESVIO_PADRAO_RISCO, MetricValue::from_float(self.desvio_padrao_risco)),
        ]
    }
}

/// Detail tables published in the gold layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetailTable {
    FaixaEtaria,
    Genero,
    TamanhoEmpresa,
    InterferenciaTrabalho,
    Faltantes,
}

impl DetailTable {
    pub const ALL: [DetailTable; 5] = [
        DetailTable::FaixaEtaria,
        DetailTable::Genero,
        DetailTable::TamanhoEmpresa,
        DetailTable::InterferenciaTrabalho,
        DetailTable::Faltantes,
    ];

    /// Value of the `tabela` tag
    pub fn name(&self) -> &'static str {
        match self {
            DetailTable::FaixaEtaria => "faixa_etaria",
            DetailTable::Genero => "genero",
            DetailTable::TamanhoEmpresa => "tamanho_empresa",
            DetailTable::InterferenciaTrabalho => "interferencia_trabalho",
            DetailTable::Faltantes => TABLE_FALTANTES,
        }
    }

    /// Column carrying the category label
    pub fn label_column(&self) -> &'static str {
        match self {
            DetailTable::Faltantes => crate::constants::COL_COLUNA,
            other => other.name(),
        }
    }

    /// Value of the `metrica` column; the missing-value table has none
    pub fn metric_tag(&self) -> Option<&'static str> {
        match self {
            DetailTable::FaixaEtaria => Some("distribuicao_faixa_etaria"),
            DetailTable::Genero => Some("distribuicao_genero"),
            DetailTable::TamanhoEmpresa => Some("distribuicao_tamanho_empresa"),
            DetailTable::InterferenciaTrabalho => Some("interferencia_trabalho"),
            DetailTable::Faltantes => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRow {
    /// `None` counts records where the category itself is missing
    pub category: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionTable {
    pub table: DetailTable,
    pub rows: Vec<DistributionRow>,
}

impl DistributionTable {
    pub fn count_of(&self, category: Option<&str>) -> u64 {
        self.rows
            .iter()
            .find(|r| r.category.as_deref() == category)
            .map_or(0, |r| r.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRow {
    pub column: String,
    /// `null_count / total_count`; NaN for an empty record set
    pub percent_missing: f64,
}

/// All aggregates computed from one canonical record set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub summary: SummaryMetrics,
    /// Distributions for the present source columns, in [`DetailTable::ALL`] order
    pub distributions: Vec<DistributionTable>,
    pub missing: Vec<MissingRow>,
}

impl MetricsSnapshot {
    pub fn distribution(&self, table: DetailTable) -> Option<&DistributionTable> {
        self.distributions.iter().find(|d| d.table == table)
    }

    /// Total number of detail rows across every detail table
    pub fn detail_row_count(&self) -> usize {
        self.distributions.iter().map(|d| d.rows.len()).sum::<usize>() + self.missing.len()
    }
}

pub fn compute_snapshot(table: &CanonicalTable) -> MetricsSnapshot {
    let records = &table.records;
    let columns = &table.columns;

    let mut distributions = Vec::new();
    if columns.age {
        distributions.push(distribution(DetailTable::FaixaEtaria, records, |r| {
            Some(r.age_group.as_str().to_string())
        }));
    }
    if columns.gender {
        distributions.push(distribution(DetailTable::Genero, records, |r| {
            Some(r.gender_norm.as_str().to_string())
        }));
    }
    if columns.no_employees {
        distributions.push(distribution(DetailTable::TamanhoEmpresa, records, |r| {
            r.no_employees_bucket.clone()
        }));
    }
    if columns.work_interfere {
        distributions.push(distribution(DetailTable::InterferenciaTrabalho, records, |r| {
            Some(r.work_interfere_std.as_str().to_string())
        }));
    }

    MetricsSnapshot {
        summary: summarize(table),
        distributions,
        missing: missing_table(table),
    }
}

fn summarize(table: &CanonicalTable) -> SummaryMetrics {
    let records = &table.records;
    let columns = &table.columns;

    let timestamps_unicos = columns.timestamp.then(|| {
        records
            .iter()
            .filter_map(|r| r.timestamp)
            .collect::<HashSet<_>>()
            .len()
    });
    let idades_faltantes = columns
        .age
        .then(|| records.iter().filter(|r| r.age.is_none()).count());

    let treatment = columns.has_answer(YesNoField::Treatment).then(|| {
        let total = records.len() as u64;
        let yes = records
            .iter()
            .filter(|r| r.answer(YesNoField::Treatment) == Answer::Yes)
            .count() as u64;
        TreatmentStats {
            total,
            yes,
            rate: (total > 0).then(|| yes as f64 / total as f64),
        }
    });

    let scores: Vec<u8> = records.iter().map(|r| r.risk_score).collect();
    let (media_risco, mediana_risco, desvio_padrao_risco) = risk_statistics(&scores);

    SummaryMetrics {
        total_respostas: records.len(),
        timestamps_unicos,
        idades_faltantes,
        treatment,
        media_risco,
        mediana_risco,
        desvio_padrao_risco,
    }
}

/// Mean, median and sample standard deviation.
/// All three are `None` for an empty set; the deviation is NaN below two values.
fn risk_statistics(scores: &[u8]) -> (Option<f64>, Option<f64>, Option<f64>) {
    if scores.is_empty() {
        return (None, None, None);
    }
    let n = scores.len() as i128;
    let sum: i128 = scores.iter().map(|s| *s as i128).sum();
    let sum_sq: i128 = scores.iter().map(|s| (*s as i128) * (*s as i128)).sum();

    let mean = sum as f64 / n as f64;

    let mut sorted = scores.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    };

    let std = if n < 2 {
        f64::NAN
    } else {
        // Exact integer numerator keeps the result independent of row order
        let numerator = n * sum_sq - sum * sum;
        (numerator as f64 / (n * (n - 1)) as f64).sqrt()
    };

    (Some(mean), Some(median), Some(std))
}

fn distribution<F>(table: DetailTable, records: &[CanonicalRecord], category: F) -> DistributionTable
where
    F: Fn(&CanonicalRecord) -> Option<String>,
{
    let mut counts: HashMap<Option<String>, u64> = HashMap::new();
    for record in records {
        *counts.entry(category(record)).or_insert(0) += 1;
    }

    let mut rows: Vec<DistributionRow> = counts
        .into_iter()
        .map(|(category, count)| DistributionRow { category, count })
        .collect();
    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| match (&a.category, &b.category) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });

    DistributionTable { table, rows }
}

/// One row per silver column, in silver column order
fn missing_table(table: &CanonicalTable) -> Vec<MissingRow> {
    let total = table.records.len();
    silver_columns(table)
        .into_iter()
        .map(|column| MissingRow {
            percent_missing: column.values.null_count() as f64 / total as f64,
            column: column.name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeGroup, RawTable, RawValue};
    use crate::pipeline::processing::normalize::{deduplicate, DefaultNormalizer, Normalizer};
    use crate::pipeline::processing::risk::RiskScorer;
    use chrono::Utc;
    use rand::seq::SliceRandom;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn canonical(raw: &RawTable) -> CanonicalTable {
        let mut table = DefaultNormalizer::new().normalize(raw, Utc::now()).table;
        RiskScorer::new().apply(&mut table);
        deduplicate(&mut table);
        table
    }

    fn survey() -> RawTable {
        let mut raw = RawTable::new(
            [
                "Timestamp",
                "Age",
                "Gender",
                "State",
                "family_history",
                "treatment",
                "work_interfere",
                "no_employees",
                "mental_health_consequence",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        let rows = [
            ("2014-08-27 11:29:31", "37", "Female", "IL", "No", "Yes", "Often", "6-25", "No"),
            ("2014-08-27 11:29:37", "44", "M", "IN", "No", "No", "Rarely", "More than 1000", "Maybe"),
            ("2014-08-27 11:29:44", "32", "Male", "NA", "No", "No", "Rarely", "6-25", "No"),
            ("2014-08-27 11:29:46", "31", "Male", "NA", "Yes", "Yes", "Often", "26-100", "Yes"),
            ("2014-08-27 11:30:22", "31", "Male", "TX", "No", "No", "Never", "100-500", "No"),
            ("2014-08-27 11:31:22", "33", "Male", "TN", "Yes", "No", "Sometimes", "6-25", "No"),
            ("2014-08-27 11:31:22", "35", "Female", "MI", "Yes", "Yes", "Sometimes", "1-5", "Maybe"),
            ("2014-08-27 11:31:50", "17", "male", "NA", "No", "No", "NA", "", "No"),
        ];
        for (ts, age, gender, state, fam, treat, work, emp, mhc) in rows {
            raw.push_row(vec![
                text(ts),
                text(age),
                text(gender),
                text(state),
                text(fam),
                text(treat),
                text(work),
                text(emp),
                text(mhc),
            ]);
        }
        raw
    }

    #[test]
    fn test_ages_end_to_end() {
        let mut raw = RawTable::new(vec!["Age".to_string()]);
        raw.push_row(vec![RawValue::Integer(15)]);
        raw.push_row(vec![RawValue::Integer(45)]);
        raw.push_row(vec![text("N/A")]);

        let snapshot = compute_snapshot(&canonical(&raw));
        let ages = snapshot.distribution(DetailTable::FaixaEtaria).unwrap();
        assert_eq!(ages.count_of(Some(AgeGroup::Child.as_str())), 1);
        assert_eq!(ages.count_of(Some(AgeGroup::Adult.as_str())), 1);
        assert_eq!(ages.count_of(Some(AgeGroup::Unknown.as_str())), 1);
        assert_eq!(ages.rows.len(), 3);
        assert_eq!(snapshot.summary.idades_faltantes, Some(1));
    }

    #[test]
    fn test_summary_metrics() {
        let snapshot = compute_snapshot(&canonical(&survey()));
        let s = &snapshot.summary;

        assert_eq!(s.total_respostas, 8);
        // Two responses share a timestamp
        assert_eq!(s.timestamps_unicos, Some(7));
        assert_eq!(s.idades_faltantes, Some(0));

        let treatment = s.treatment.unwrap();
        assert_eq!(treatment.total, 8);
        assert_eq!(treatment.yes, 3);
        assert_eq!(treatment.rate, Some(3.0 / 8.0));

        // Scores: 2, 0, 0, 4, 0, 2, 3, 0
        assert_eq!(s.media_risco, Some(11.0 / 8.0));
        assert_eq!(s.mediana_risco, Some(1.0));
        let std = s.desvio_padrao_risco.unwrap();
        assert!((std - (143.0f64 / 56.0).sqrt()).abs() < 1e-12, "{std}");
    }

    #[test]
    fn test_null_category_is_counted() {
        let snapshot = compute_snapshot(&canonical(&survey()));
        let sizes = snapshot.distribution(DetailTable::TamanhoEmpresa).unwrap();
        assert_eq!(sizes.count_of(None), 1);
        assert_eq!(sizes.rows.iter().map(|r| r.count).sum::<u64>(), 8);
        // Null sorts after named categories of equal count
        assert_eq!(sizes.rows.last().unwrap().category, None);
        assert_eq!(sizes.rows[0].category.as_deref(), Some("6-25"));
    }

    #[test]
    fn test_aggregation_is_row_order_invariant() {
        let raw = survey();
        let processed_at = Utc::now();
        let mut table = DefaultNormalizer::new().normalize(&raw, processed_at).table;
        RiskScorer::new().apply(&mut table);
        let baseline = compute_snapshot(&table);

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let mut shuffled = table.clone();
            shuffled.records.shuffle(&mut rng);
            assert_eq!(compute_snapshot(&shuffled), baseline);
        }
    }

    #[test]
    fn test_missing_percentages() {
        let mut raw = RawTable::new(vec!["Age".to_string(), "Comments".to_string()]);
        raw.push_row(vec![RawValue::Integer(20), RawValue::Null]);
        raw.push_row(vec![RawValue::Integer(30), text("nan")]);

        let snapshot = compute_snapshot(&canonical(&raw));
        let percent = |name: &str| {
            snapshot
                .missing
                .iter()
                .find(|m| m.column == name)
                .map(|m| m.percent_missing)
        };
        assert_eq!(percent("comments"), Some(1.0));
        assert_eq!(percent("age"), Some(0.0));
        assert_eq!(percent("age_group"), Some(0.0));
        assert_eq!(percent("gender"), None);
    }

    #[test]
    fn test_absent_columns_yield_null_metrics() {
        let mut raw = RawTable::new(vec!["Country".to_string()]);
        raw.push_row(vec![text("Brazil")]);

        let snapshot = compute_snapshot(&canonical(&raw));
        assert!(snapshot.distributions.is_empty());
        assert_eq!(snapshot.summary.timestamps_unicos, None);
        assert_eq!(snapshot.summary.treatment, None);

        let rows = snapshot.summary.rows();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0], (TOTAL_RESPOSTAS, MetricValue::Integer(1)));
        assert_eq!(rows[3].1, MetricValue::Null);
        // A single score has no sample deviation
        assert_eq!(rows[8].1, MetricValue::Null);
    }

    #[test]
    fn test_empty_set() {
        let table = CanonicalTable {
            columns: crate::domain::SurveyColumns::all(),
            ..Default::default()
        };
        let snapshot = compute_snapshot(&table);
        let treatment = snapshot.summary.treatment.unwrap();
        assert_eq!(treatment.total, 0);
        assert_eq!(treatment.rate, None);
        assert_eq!(snapshot.summary.media_risco, None);
        assert!(snapshot.missing.iter().all(|m| m.percent_missing.is_nan()));
    }

    #[test]
    fn test_metric_value_text() {
        assert_eq!(MetricValue::Integer(3).to_text().as_deref(), Some("3"));
        assert_eq!(MetricValue::Float(2.0).to_text().as_deref(), Some("2.0"));
        assert_eq!(MetricValue::Float(0.375).to_text().as_deref(), Some("0.375"));
        assert_eq!(MetricValue::from_float(Some(f64::NAN)), MetricValue::Null);
        assert_eq!(MetricValue::Null.to_text(), None);
    }
}
