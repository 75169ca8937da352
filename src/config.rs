use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::pipeline::processing::comments::{DEFAULT_EXCERPT_LIMIT, DEFAULT_MIN_CHARS};
use crate::pipeline::storage::extract_bucket_name;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub buckets: BucketConfig,
    pub layout: LayoutConfig,
    pub mirror: MirrorConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible service such as MinIO
    #[default]
    S3,
    /// Buckets are directories under `local_root`
    Local,
    /// Process-local store, for tests and dry runs
    Memory,
}

impl FromStr for StorageBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(PipelineError::Config(format!("unknown storage backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub allow_http: bool,
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            region: "us-east-1".to_string(),
            allow_http: false,
            local_root: PathBuf::from("data"),
        }
    }
}

/// Bucket identifiers; `name`, `name/path` and `s3://name/path` are accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub raw: String,
    pub silver: String,
    pub gold: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            raw: "raw".to_string(),
            silver: "silver".to_string(),
            gold: "gold".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub raw_prefix: String,
    /// Explicit raw object to read; skips source discovery
    pub source_key: Option<String>,
    /// Raw object preferred during discovery when it exists
    pub preferred_source_key: Option<String>,
    pub silver_prefix: String,
    pub gold_prefix: String,
    pub excerpt_limit: usize,
    pub excerpt_min_chars: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            raw_prefix: "survey/".to_string(),
            source_key: None,
            preferred_source_key: Some("survey/data.parquet".to_string()),
            silver_prefix: "survey/".to_string(),
            gold_prefix: "survey/".to_string(),
            excerpt_limit: DEFAULT_EXCERPT_LIMIT,
            excerpt_min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub database_path: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: PathBuf::from("metrics.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_dir: PathBuf,
    /// Prometheus textfile written at the end of each run
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            metrics_textfile: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the full configuration: TOML file, then `.env`, then `SURVEY_*`
    /// environment variables. Without an explicit path a missing
    /// `config.toml` falls back to defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::load(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override individual fields from `SURVEY_*` variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SURVEY_STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = lookup("SURVEY_S3_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = lookup("SURVEY_S3_ACCESS_KEY") {
            self.storage.access_key_id = Some(v);
        }
        if let Some(v) = lookup("SURVEY_S3_SECRET_KEY") {
            self.storage.secret_access_key = Some(v);
        }
        if let Some(v) = lookup("SURVEY_S3_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = lookup("SURVEY_S3_ALLOW_HTTP") {
            self.storage.allow_http = parse_bool("SURVEY_S3_ALLOW_HTTP", &v)?;
        }
        if let Some(v) = lookup("SURVEY_LOCAL_ROOT") {
            self.storage.local_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("SURVEY_BUCKET_RAW") {
            self.buckets.raw = v;
        }
        if let Some(v) = lookup("SURVEY_BUCKET_SILVER") {
            self.buckets.silver = v;
        }
        if let Some(v) = lookup("SURVEY_BUCKET_GOLD") {
            self.buckets.gold = v;
        }
        if let Some(v) = lookup("SURVEY_RAW_PREFIX") {
            self.layout.raw_prefix = v;
        }
        if let Some(v) = lookup("SURVEY_SOURCE_KEY") {
            self.layout.source_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("SURVEY_SILVER_PREFIX") {
            self.layout.silver_prefix = v;
        }
        if let Some(v) = lookup("SURVEY_GOLD_PREFIX") {
            self.layout.gold_prefix = v;
        }
        if let Some(v) = lookup("SURVEY_MIRROR_ENABLED") {
            self.mirror.enabled = parse_bool("SURVEY_MIRROR_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SURVEY_DATABASE_PATH") {
            self.mirror.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SURVEY_LOG_DIR") {
            self.observability.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SURVEY_METRICS_TEXTFILE") {
            self.observability.metrics_textfile = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Reduce bucket identifiers to validated bucket names
    pub fn validate(&mut self) -> Result<()> {
        self.buckets.raw = extract_bucket_name(&self.buckets.raw)?;
        self.buckets.silver = extract_bucket_name(&self.buckets.silver)?;
        self.buckets.gold = extract_bucket_name(&self.buckets.gold)?;
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.buckets.raw, "raw");
        assert_eq!(config.layout.silver_prefix, "survey/");
        assert_eq!(config.layout.excerpt_limit, 200);
        assert_eq!(config.layout.excerpt_min_chars, 5);
        assert!(config.mirror.enabled);
        assert_eq!(config.storage.backend, StorageBackend::S3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [storage]
            backend = "local"
            local_root = "/tmp/lake"

            [buckets]
            gold = "s3://gold-bucket/reports"

            [layout]
            excerpt_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.local_root, PathBuf::from("/tmp/lake"));
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.layout.excerpt_limit, 50);
        assert_eq!(config.layout.gold_prefix, "survey/");
        assert_eq!(config.buckets.silver, "silver");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SURVEY_STORAGE_BACKEND", "memory"),
            ("SURVEY_S3_ENDPOINT", "http://minio:9000"),
            ("SURVEY_BUCKET_SILVER", "s3://silver-x/survey"),
            ("SURVEY_SOURCE_KEY", "survey/data_from_test.parquet"),
            ("SURVEY_MIRROR_ENABLED", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.buckets.silver, "silver-x");
        assert_eq!(config.layout.source_key.as_deref(), Some("survey/data_from_test.parquet"));
        assert!(!config.mirror.enabled);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "SURVEY_STORAGE_BACKEND").then(|| "ftp".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let mut config = PipelineConfig::default();
        config.buckets.raw = String::new();
        assert!(matches!(config.validate(), Err(PipelineError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
