//! Artifact naming and selection for the versioned bucket layout.
//!
//! Keys follow `<prefix><artifact-name>_<token>.<ext>` and are never reused.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{PARQUET_EXT, RUN_TOKEN_FORMAT};
use crate::error::{PipelineError, Result};

static BUCKET_NAME: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,255}$"));

/// UTC timestamp identifying one run's artifact set, e.g. `20240131T235959Z`.
///
/// Tokens have one-second resolution. A second run that starts within the
/// same second produces the same keys and is refused with `ArtifactExists`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunToken(String);

impl RunToken {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        RunToken(instant.format(RUN_TOKEN_FORMAT).to_string())
    }

    pub fn parse(token: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(token, RUN_TOKEN_FORMAT)
            .map(|_| RunToken(token.to_string()))
            .map_err(|_| PipelineError::InvalidIdentifier(format!("run token '{token}'")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn artifact_key(prefix: &str, artifact: &str, token: &RunToken, ext: &str) -> String {
    format!("{prefix}{artifact}_{token}.{ext}")
}

/// Extract and validate a bucket name from `name`, `name/path` or `scheme://name/path`
pub fn extract_bucket_name(value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(PipelineError::InvalidIdentifier(
            "bucket value is empty".to_string(),
        ));
    }

    let without_scheme = match value.split_once("://") {
        Some((_, rest)) => rest,
        None => value,
    };
    let bucket = without_scheme
        .split_once('/')
        .map_or(without_scheme, |(name, _)| name);

    let pattern = BUCKET_NAME
        .as_ref()
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    if !pattern.is_match(bucket) {
        return Err(PipelineError::InvalidIdentifier(format!(
            "invalid bucket name '{bucket}' extracted from '{value}'"
        )));
    }
    Ok(bucket.to_string())
}

/// Listing entry for one stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl ArtifactMeta {
    pub fn is_parquet(&self) -> bool {
        self.key
            .to_lowercase()
            .ends_with(&format!(".{PARQUET_EXT}"))
    }

    /// Recency order: modification time, then key
    fn recency(&self) -> (DateTime<Utc>, &str) {
        (self.last_modified, self.key.as_str())
    }

    pub fn is_older_than(&self, other: &ArtifactMeta) -> bool {
        self.recency() < other.recency()
    }
}

/// Most recently modified parquet artifact; ties go to the greatest key
pub fn select_latest(artifacts: &[ArtifactMeta]) -> Option<&ArtifactMeta> {
    artifacts
        .iter()
        .filter(|a| a.is_parquet())
        .max_by(|a, b| a.recency().cmp(&b.recency()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(key: &str, secs: i64) -> ArtifactMeta {
        ArtifactMeta {
            key: key.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).unwrap(),
            size: 1,
        }
    }

    #[test]
    fn test_extract_bucket_name() {
        assert_eq!(extract_bucket_name("s3://my-bucket/path/file").unwrap(), "my-bucket");
        assert_eq!(extract_bucket_name("raw").unwrap(), "raw");
        assert_eq!(extract_bucket_name("silver/survey/data.parquet").unwrap(), "silver");
        assert_eq!(extract_bucket_name("s3://gold").unwrap(), "gold");
        assert_eq!(extract_bucket_name("my_bucket.v2").unwrap(), "my_bucket.v2");
    }

    #[test]
    fn test_extract_bucket_name_rejects_invalid() {
        assert!(matches!(extract_bucket_name(""), Err(PipelineError::InvalidIdentifier(_))));
        assert!(matches!(extract_bucket_name("s3:///path"), Err(PipelineError::InvalidIdentifier(_))));
        assert!(matches!(extract_bucket_name("bad bucket"), Err(PipelineError::InvalidIdentifier(_))));
        assert!(matches!(extract_bucket_name(&"a".repeat(256)), Err(PipelineError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_run_token_and_artifact_key() {
        let token = RunToken::at(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());
        assert_eq!(token.as_str(), "20240131T235959Z");
        assert_eq!(
            artifact_key("survey/", "data_silver", &token, "parquet"),
            "survey/data_silver_20240131T235959Z.parquet"
        );
        assert_eq!(RunToken::parse("20240131T235959Z").unwrap(), token);
        assert!(RunToken::parse("2024-01-31").is_err());
    }

    #[test]
    fn test_select_latest_by_time_then_key() {
        let artifacts = vec![
            meta("survey/a.parquet", 100),
            meta("survey/c.parquet", 200),
            meta("survey/b.parquet", 200),
            meta("survey/z.csv", 300),
            meta("survey/D.PARQUET", 50),
        ];
        assert_eq!(select_latest(&artifacts).unwrap().key, "survey/c.parquet");
        assert!(artifacts[0].is_older_than(&artifacts[1]));
        assert!(artifacts[2].is_older_than(&artifacts[1]));
        assert!(artifacts[4].is_parquet());
    }

    #[test]
    fn test_select_latest_none_without_parquet() {
        assert!(select_latest(&[meta("survey/z.csv", 1)]).is_none());
        assert!(select_latest(&[]).is_none());
    }
}
