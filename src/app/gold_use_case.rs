use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::app::ports::{ArtifactStorePort, MetricsMirrorPort, MirrorReport};
use crate::config::LayoutConfig;
use crate::constants::{
    CSV_EXT, GOLD_COMMENTS_ARTIFACT, GOLD_DETAIL_ARTIFACT, GOLD_SUMMARY_ARTIFACT, PARQUET_EXT,
};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::columnar::gold::{comments_csv, detail_batch, summary_batch};
use crate::pipeline::columnar::silver::decode_silver;
use crate::pipeline::columnar::ParquetCodec;
use crate::pipeline::processing::aggregate::compute_snapshot;
use crate::pipeline::processing::comments::record_excerpts;
use crate::pipeline::storage::{artifact_key, select_latest, ArtifactMeta, RunToken};

#[derive(Debug, Clone)]
pub struct GoldSettings {
    pub silver_prefix: String,
    pub gold_prefix: String,
    pub excerpt_limit: usize,
    pub excerpt_min_chars: usize,
}

impl From<&LayoutConfig> for GoldSettings {
    fn from(layout: &LayoutConfig) -> Self {
        Self {
            silver_prefix: layout.silver_prefix.clone(),
            gold_prefix: layout.gold_prefix.clone(),
            excerpt_limit: layout.excerpt_limit,
            excerpt_min_chars: layout.excerpt_min_chars,
        }
    }
}

/// Keys published by one gold run
#[derive(Debug, Clone)]
pub struct GoldOutcome {
    pub token: RunToken,
    pub silver_key: String,
    pub summary_key: String,
    pub detail_key: String,
    /// `None` when no comment qualified as an excerpt
    pub comments_key: Option<String>,
    /// `None` when mirroring is disabled or failed
    pub mirror: Option<MirrorReport>,
}

/// Use case for aggregating the latest silver artifact into the gold layer
pub struct GoldUseCase {
    silver_store: Arc<dyn ArtifactStorePort>,
    gold_store: Arc<dyn ArtifactStorePort>,
    mirror: Option<Box<dyn MetricsMirrorPort>>,
    codec: ParquetCodec,
    settings: GoldSettings,
}

impl GoldUseCase {
    pub fn new(
        silver_store: Arc<dyn ArtifactStorePort>,
        gold_store: Arc<dyn ArtifactStorePort>,
        mirror: Option<Box<dyn MetricsMirrorPort>>,
        settings: GoldSettings,
    ) -> Result<Self> {
        Ok(Self {
            silver_store,
            gold_store,
            mirror,
            codec: ParquetCodec::new()?,
            settings,
        })
    }

    /// Run the gold stage. When `expected` is given (the artifact written by
    /// the silver stage of the same run) an older selection is refused.
    #[instrument(skip(self, expected), fields(silver_bucket = %self.silver_store.bucket(), gold_bucket = %self.gold_store.bucket()))]
    pub async fn run(&self, expected: Option<&ArtifactMeta>) -> Result<GoldOutcome> {
        let started = Instant::now();
        match self.run_inner(expected).await {
            Ok(outcome) => {
                metrics::gold::run_success(started.elapsed().as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                metrics::gold::run_error();
                Err(e)
            }
        }
    }

    async fn select_silver(&self, expected: Option<&ArtifactMeta>) -> Result<ArtifactMeta> {
        let listed = self.silver_store.list(&self.settings.silver_prefix).await?;
        let selected = select_latest(&listed)
            .cloned()
            .ok_or_else(|| PipelineError::SourceNotFound {
                bucket: self.silver_store.bucket().to_string(),
                prefix: self.settings.silver_prefix.clone(),
            })?;

        if let Some(expected) = expected {
            if selected.is_older_than(expected) {
                metrics::gold::stale_artifact();
                return Err(PipelineError::StaleArtifact {
                    selected: selected.key,
                    expected: expected.key.clone(),
                });
            }
        }
        Ok(selected)
    }

    async fn run_inner(&self, expected: Option<&ArtifactMeta>) -> Result<GoldOutcome> {
        let silver = self.select_silver(expected).await?;
        info!("Using silver artifact: {}/{}", self.silver_store.bucket(), silver.key);

        let bytes = self.silver_store.get(&silver.key).await?;
        let table = decode_silver(&self.codec.read_batch(bytes)?)?;
        info!("Silver table loaded: {} rows", table.len());
        metrics::gold::records_aggregated(table.len());

        let snapshot = compute_snapshot(&table);
        let excerpts = record_excerpts(
            &table.records,
            self.settings.excerpt_min_chars,
            self.settings.excerpt_limit,
        );
        metrics::gold::detail_rows(snapshot.detail_row_count());
        metrics::gold::excerpts_selected(excerpts.len());

        // Serialize every artifact before the first upload
        let summary = self.codec.write_batch(&summary_batch(&snapshot)?)?;
        let detail = self.codec.write_batch(&detail_batch(&snapshot)?)?;
        let comments = if excerpts.is_empty() {
            None
        } else {
            Some(comments_csv(&excerpts)?)
        };

        let token = RunToken::now();
        let prefix = &self.settings.gold_prefix;
        let summary_key = artifact_key(prefix, GOLD_SUMMARY_ARTIFACT, &token, PARQUET_EXT);
        let detail_key = artifact_key(prefix, GOLD_DETAIL_ARTIFACT, &token, PARQUET_EXT);
        let comments_key = comments
            .as_ref()
            .map(|_| artifact_key(prefix, GOLD_COMMENTS_ARTIFACT, &token, CSV_EXT));

        let mut uploads: Vec<(&str, Bytes)> =
            vec![(summary_key.as_str(), summary), (detail_key.as_str(), detail)];
        if let (Some(key), Some(payload)) = (&comments_key, comments) {
            uploads.push((key.as_str(), payload));
        }
        self.publish(uploads).await?;
        info!(
            "Gold artifacts written to {} with token {}",
            self.gold_store.bucket(),
            token
        );

        let mirror = match &self.mirror {
            Some(mirror) => match mirror.persist(&token, &snapshot).await {
                Ok(report) => {
                    info!(
                        "Mirrored {} summary and {} detail rows ({} failed)",
                        report.summary_rows, report.detail_rows, report.failed_rows
                    );
                    Some(report)
                }
                Err(e) => {
                    error!("Relational mirror failed: {}", e);
                    metrics::mirror::mirror_error();
                    None
                }
            },
            None => None,
        };

        Ok(GoldOutcome {
            token,
            silver_key: silver.key,
            summary_key,
            detail_key,
            comments_key,
            mirror,
        })
    }

    /// Upload in order; on failure remove what this run already published
    async fn publish(&self, uploads: Vec<(&str, Bytes)>) -> Result<()> {
        let mut published: Vec<&str> = Vec::with_capacity(uploads.len());
        for (key, payload) in uploads {
            let size = payload.len();
            match self.gold_store.put_new(key, payload).await {
                Ok(_) => {
                    info!("Wrote {}/{} ({} bytes)", self.gold_store.bucket(), key, size);
                    published.push(key);
                }
                Err(e) => {
                    for done in published {
                        if let Err(cleanup) = self.gold_store.delete(done).await {
                            warn!("Failed to remove partial artifact {}: {}", done, cleanup);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
