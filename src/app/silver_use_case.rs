use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::ArtifactStorePort;
use crate::config::LayoutConfig;
use crate::constants::{PARQUET_EXT, SILVER_ARTIFACT};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::columnar::raw::batch_to_raw_table;
use crate::pipeline::columnar::silver::encode_silver;
use crate::pipeline::columnar::ParquetCodec;
use crate::pipeline::processing::normalize::{deduplicate, DefaultNormalizer, Normalizer};
use crate::pipeline::processing::risk::RiskScorer;
use crate::pipeline::storage::{artifact_key, select_latest, ArtifactMeta, RunToken};

/// Where the silver stage reads from and writes to
#[derive(Debug, Clone)]
pub struct SilverSettings {
    pub raw_prefix: String,
    pub source_key: Option<String>,
    pub preferred_source_key: Option<String>,
    pub silver_prefix: String,
}

impl From<&LayoutConfig> for SilverSettings {
    fn from(layout: &LayoutConfig) -> Self {
        Self {
            raw_prefix: layout.raw_prefix.clone(),
            source_key: layout.source_key.clone(),
            preferred_source_key: layout.preferred_source_key.clone(),
            silver_prefix: layout.silver_prefix.clone(),
        }
    }
}

/// Result of one silver run
#[derive(Debug, Clone)]
pub struct SilverOutcome {
    pub token: RunToken,
    pub source_key: String,
    pub artifact: ArtifactMeta,
    pub records_read: usize,
    pub records_written: usize,
    pub duplicates_removed: usize,
    pub malformed_values: usize,
}

/// Use case for turning the latest raw dataset into a silver artifact
pub struct SilverUseCase {
    raw_store: Arc<dyn ArtifactStorePort>,
    silver_store: Arc<dyn ArtifactStorePort>,
    normalizer: Box<dyn Normalizer + Send + Sync>,
    scorer: RiskScorer,
    codec: ParquetCodec,
    settings: SilverSettings,
}

impl SilverUseCase {
    pub fn new(
        raw_store: Arc<dyn ArtifactStorePort>,
        silver_store: Arc<dyn ArtifactStorePort>,
        normalizer: Box<dyn Normalizer + Send + Sync>,
        settings: SilverSettings,
    ) -> Result<Self> {
        Ok(Self {
            raw_store,
            silver_store,
            normalizer,
            scorer: RiskScorer::new(),
            codec: ParquetCodec::new()?,
            settings,
        })
    }

    /// Create a use case with the default normalizer
    pub fn with_default_normalizer(
        raw_store: Arc<dyn ArtifactStorePort>,
        silver_store: Arc<dyn ArtifactStorePort>,
        settings: SilverSettings,
    ) -> Result<Self> {
        Self::new(raw_store, silver_store, Box::new(DefaultNormalizer::new()), settings)
    }

    /// Pick the raw object to read: the configured key, else the preferred key
    /// when it exists, else the most recent parquet object under the prefix
    async fn resolve_source(&self) -> Result<String> {
        if let Some(key) = &self.settings.source_key {
            return match self.raw_store.head(key).await? {
                Some(_) => Ok(key.clone()),
                None => Err(PipelineError::SourceNotFound {
                    bucket: self.raw_store.bucket().to_string(),
                    prefix: key.clone(),
                }),
            };
        }

        let listed = self.raw_store.list(&self.settings.raw_prefix).await?;
        if let Some(preferred) = &self.settings.preferred_source_key {
            if listed.iter().any(|a| &a.key == preferred) {
                return Ok(preferred.clone());
            }
        }
        select_latest(&listed)
            .map(|a| a.key.clone())
            .ok_or_else(|| PipelineError::SourceNotFound {
                bucket: self.raw_store.bucket().to_string(),
                prefix: self.settings.raw_prefix.clone(),
            })
    }

    #[instrument(skip(self), fields(raw_bucket = %self.raw_store.bucket(), silver_bucket = %self.silver_store.bucket()))]
    pub async fn run(&self) -> Result<SilverOutcome> {
        let started = Instant::now();
        match self.run_inner().await {
            Ok(outcome) => {
                metrics::silver::run_success(started.elapsed().as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                metrics::silver::run_error();
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> Result<SilverOutcome> {
        let source_key = self.resolve_source().await?;
        info!("Using source: {}/{}", self.raw_store.bucket(), source_key);

        let bytes = self.raw_store.get(&source_key).await?;
        info!("Downloaded {} bytes", bytes.len());

        let raw = batch_to_raw_table(&self.codec.read_batch(bytes)?)?;
        info!("Raw table loaded: {} rows, {} columns", raw.len(), raw.columns.len());
        metrics::silver::records_read(raw.len());

        let processed_at = Utc::now();
        let report = self.normalizer.normalize(&raw, processed_at);
        for (column, count) in &report.malformed {
            debug!(column = %column, count, "Malformed values degraded");
            metrics::silver::malformed_values(column, *count);
        }
        let malformed_values = report.malformed_total();
        if malformed_values > 0 {
            warn!("{} malformed values degraded to unknown or passed through", malformed_values);
        }

        let mut table = report.table;
        self.scorer.apply(&mut table);
        let duplicates_removed = deduplicate(&mut table);
        metrics::silver::duplicates_removed(duplicates_removed);
        info!(
            "Transformation complete: {} rows, {} duplicates removed",
            table.len(),
            duplicates_removed
        );

        // Serialize fully before anything becomes visible
        let batch = encode_silver(&table)?;
        let payload = self.codec.write_batch(&batch)?;

        let token = RunToken::now();
        let key = artifact_key(&self.settings.silver_prefix, SILVER_ARTIFACT, &token, PARQUET_EXT);
        let size = payload.len();
        let artifact = self.silver_store.put_new(&key, payload).await?;
        info!("Silver artifact written: {}/{} ({} bytes)", self.silver_store.bucket(), key, size);
        metrics::silver::records_written(table.len());

        Ok(SilverOutcome {
            token,
            source_key,
            artifact,
            records_read: raw.len(),
            records_written: table.len(),
            duplicates_removed,
            malformed_values,
        })
    }
}
