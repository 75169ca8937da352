//! Metrics for the survey pipeline
//!
//! Counters and histograms are recorded through the `metrics` facade and
//! exported with the Prometheus recorder. A batch run has no scrape endpoint,
//! so the rendered exposition text can be written to a textfile at the end.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Silver stage
    SilverRunsSuccess,
    SilverRunsError,
    SilverRunDuration,
    SilverRecordsRead,
    SilverRecordsWritten,
    SilverDuplicatesRemoved,
    SilverMalformedValues,

    // Gold stage
    GoldRunsSuccess,
    GoldRunsError,
    GoldRunDuration,
    GoldRecordsAggregated,
    GoldDetailRows,
    GoldExcerptsSelected,
    GoldStaleArtifacts,

    // Artifact storage
    StorageArtifactsWritten,
    StorageBytesWritten,
    StorageArtifactsRead,
    StorageBytesRead,

    // Relational mirror
    MirrorRowsWritten,
    MirrorRowsFailed,
    MirrorErrors,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SilverRunsSuccess => "survey_silver_runs_success_total",
            MetricName::SilverRunsError => "survey_silver_runs_error_total",
            MetricName::SilverRunDuration => "survey_silver_run_duration_seconds",
            MetricName::SilverRecordsRead => "survey_silver_records_read_total",
            MetricName::SilverRecordsWritten => "survey_silver_records_written_total",
            MetricName::SilverDuplicatesRemoved => "survey_silver_duplicates_removed_total",
            MetricName::SilverMalformedValues => "survey_silver_malformed_values_total",

            MetricName::GoldRunsSuccess => "survey_gold_runs_success_total",
            MetricName::GoldRunsError => "survey_gold_runs_error_total",
            MetricName::GoldRunDuration => "survey_gold_run_duration_seconds",
            MetricName::GoldRecordsAggregated => "survey_gold_records_aggregated_total",
            MetricName::GoldDetailRows => "survey_gold_detail_rows_total",
            MetricName::GoldExcerptsSelected => "survey_gold_excerpts_selected_total",
            MetricName::GoldStaleArtifacts => "survey_gold_stale_artifacts_total",

            MetricName::StorageArtifactsWritten => "survey_storage_artifacts_written_total",
            MetricName::StorageBytesWritten => "survey_storage_bytes_written",
            MetricName::StorageArtifactsRead => "survey_storage_artifacts_read_total",
            MetricName::StorageBytesRead => "survey_storage_bytes_read",

            MetricName::MirrorRowsWritten => "survey_mirror_rows_written_total",
            MetricName::MirrorRowsFailed => "survey_mirror_rows_failed_total",
            MetricName::MirrorErrors => "survey_mirror_errors_total",
        }
    }

    /// Get all metric names as an iterator
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            SilverRunsSuccess,
            SilverRunsError,
            SilverRunDuration,
            SilverRecordsRead,
            SilverRecordsWritten,
            SilverDuplicatesRemoved,
            SilverMalformedValues,
            GoldRunsSuccess,
            GoldRunsError,
            GoldRunDuration,
            GoldRecordsAggregated,
            GoldDetailRows,
            GoldExcerptsSelected,
            GoldStaleArtifacts,
            StorageArtifactsWritten,
            StorageBytesWritten,
            StorageArtifactsRead,
            StorageBytesRead,
            MirrorRowsWritten,
            MirrorRowsFailed,
            MirrorErrors,
        ]
        .into_iter()
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {e}")))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Current exposition text, `None` before [`init`]
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Write the exposition text for a node-exporter style textfile collector
pub fn write_textfile(path: &Path) -> Result<()> {
    let Some(text) = render() else {
        warn!("Metrics recorder not installed, skipping textfile export");
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write then rename so a collector never reads a partial file
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "Metrics textfile written");
    Ok(())
}

// ============================================================================
// Silver Metrics
// ============================================================================

pub mod silver {
    use super::MetricName;

    pub fn run_success(secs: f64) {
        ::metrics::counter!(MetricName::SilverRunsSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::SilverRunDuration.as_str()).record(secs);
    }

    pub fn run_error() {
        ::metrics::counter!(MetricName::SilverRunsError.as_str()).increment(1);
    }

    pub fn records_read(count: usize) {
        ::metrics::counter!(MetricName::SilverRecordsRead.as_str()).increment(count as u64);
    }

    pub fn records_written(count: usize) {
        ::metrics::counter!(MetricName::SilverRecordsWritten.as_str()).increment(count as u64);
    }

    pub fn duplicates_removed(count: usize) {
        ::metrics::counter!(MetricName::SilverDuplicatesRemoved.as_str()).increment(count as u64);
    }

    /// Malformed values degraded to unknown or passed through, by column
    pub fn malformed_values(column: &str, count: usize) {
        ::metrics::counter!(
            MetricName::SilverMalformedValues.as_str(),
            "column" => column.to_string()
        )
        .increment(count as u64);
    }
}

// ============================================================================
// Gold Metrics
// ============================================================================

pub mod gold {
    use super::MetricName;

    pub fn run_success(secs: f64) {
        ::metrics::counter!(MetricName::GoldRunsSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::GoldRunDuration.as_str()).record(secs);
    }

    pub fn run_error() {
        ::metrics::counter!(MetricName::GoldRunsError.as_str()).increment(1);
    }

    pub fn records_aggregated(count: usize) {
        ::metrics::counter!(MetricName::GoldRecordsAggregated.as_str()).increment(count as u64);
    }

    pub fn detail_rows(count: usize) {
        ::metrics::counter!(MetricName::GoldDetailRows.as_str()).increment(count as u64);
    }

    pub fn excerpts_selected(count: usize) {
        ::metrics::counter!(MetricName::GoldExcerptsSelected.as_str()).increment(count as u64);
    }

    pub fn stale_artifact() {
        ::metrics::counter!(MetricName::GoldStaleArtifacts.as_str()).increment(1);
    }
}

// ============================================================================
// Storage Metrics
// ============================================================================

pub mod storage {
    use super::MetricName;

    pub fn artifact_written(bucket: &str, bytes: usize) {
        ::metrics::counter!(
            MetricName::StorageArtifactsWritten.as_str(),
            "bucket" => bucket.to_string()
        )
        .increment(1);
        ::metrics::histogram!(MetricName::StorageBytesWritten.as_str()).record(bytes as f64);
    }

    pub fn artifact_read(bucket: &str, bytes: usize) {
        ::metrics::counter!(
            MetricName::StorageArtifactsRead.as_str(),
            "bucket" => bucket.to_string()
        )
        .increment(1);
        ::metrics::histogram!(MetricName::StorageBytesRead.as_str()).record(bytes as f64);
    }
}

// ============================================================================
// Mirror Metrics
// ============================================================================

pub mod mirror {
    use super::MetricName;

    pub fn rows_written(table: &str, count: usize) {
        ::metrics::counter!(
            MetricName::MirrorRowsWritten.as_str(),
            "table" => table.to_string()
        )
        .increment(count as u64);
    }

    pub fn row_failed(table: &str) {
        ::metrics::counter!(
            MetricName::MirrorRowsFailed.as_str(),
            "table" => table.to_string()
        )
        .increment(1);
    }

    pub fn mirror_error() {
        ::metrics::counter!(MetricName::MirrorErrors.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.iter().all(|n| n.starts_with("survey_")));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        silver::records_read(3);
        gold::stale_artifact();
        mirror::row_failed("metrics_details");
    }

    #[test]
    fn test_write_textfile_without_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.prom");
        if render().is_none() {
            write_textfile(&path).unwrap();
            assert!(!path.exists());
        }
    }
}
