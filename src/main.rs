use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use survey_pipeline::app::gold_use_case::{GoldSettings, GoldUseCase};
use survey_pipeline::app::pipeline_runner::PipelineRunner;
use survey_pipeline::app::ports::{ArtifactStorePort, MetricsMirrorPort};
use survey_pipeline::app::silver_use_case::{SilverSettings, SilverUseCase};
use survey_pipeline::config::PipelineConfig;
use survey_pipeline::infra::{build_store, SqliteMetricsMirror};
use survey_pipeline::observability;
use survey_pipeline::pipeline::storage::extract_bucket_name;

#[derive(Parser)]
#[command(name = "survey_pipeline")]
#[command(about = "Mental health survey pipeline: raw to silver to gold")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the latest raw dataset into a new silver artifact
    Silver,
    /// Aggregate the latest silver artifact into the gold layer
    Gold,
    /// Run silver then gold; gold refuses a silver artifact older than this run's
    Run,
    /// Print the bucket name extracted from an identifier
    ExtractBucket {
        /// `name`, `name/path` or `scheme://name/path`
        identifier: String,
    },
}

/// Stages that need configuration, logging and storage
#[derive(Debug, Clone, Copy)]
enum Stage {
    Silver,
    Gold,
    Run,
}

struct Stores {
    raw: Arc<dyn ArtifactStorePort>,
    silver: Arc<dyn ArtifactStorePort>,
    gold: Arc<dyn ArtifactStorePort>,
}

fn build_stores(config: &PipelineConfig) -> anyhow::Result<Stores> {
    Ok(Stores {
        raw: build_store(&config.storage, &config.buckets.raw).context("raw bucket")?,
        silver: build_store(&config.storage, &config.buckets.silver).context("silver bucket")?,
        gold: build_store(&config.storage, &config.buckets.gold).context("gold bucket")?,
    })
}

fn build_mirror(config: &PipelineConfig) -> Option<Box<dyn MetricsMirrorPort>> {
    if !config.mirror.enabled {
        info!("Relational mirror disabled");
        return None;
    }
    match SqliteMetricsMirror::open(&config.mirror.database_path) {
        Ok(mirror) => Some(Box::new(mirror)),
        Err(e) => {
            // The mirror never fails a run; artifacts are still published
            error!(
                "Could not open metrics database {}: {}",
                config.mirror.database_path.display(),
                e
            );
            None
        }
    }
}

fn silver_use_case(config: &PipelineConfig, stores: &Stores) -> anyhow::Result<SilverUseCase> {
    Ok(SilverUseCase::with_default_normalizer(
        stores.raw.clone(),
        stores.silver.clone(),
        SilverSettings::from(&config.layout),
    )?)
}

fn gold_use_case(config: &PipelineConfig, stores: &Stores) -> anyhow::Result<GoldUseCase> {
    Ok(GoldUseCase::new(
        stores.silver.clone(),
        stores.gold.clone(),
        build_mirror(config),
        GoldSettings::from(&config.layout),
    )?)
}

async fn run(stage: Stage, config: &PipelineConfig) -> anyhow::Result<()> {
    match stage {
        Stage::Silver => {
            let stores = build_stores(config)?;
            let outcome = silver_use_case(config, &stores)?.run().await?;
            println!("silver: {}/{}", stores.silver.bucket(), outcome.artifact.key);
            println!("   records read: {}", outcome.records_read);
            println!("   records written: {}", outcome.records_written);
            println!("   duplicates removed: {}", outcome.duplicates_removed);
            println!("   malformed values: {}", outcome.malformed_values);
        }
        Stage::Gold => {
            let stores = build_stores(config)?;
            let outcome = gold_use_case(config, &stores)?.run(None).await?;
            println!("gold run {} from {}", outcome.token, outcome.silver_key);
            println!("   summary: {}", outcome.summary_key);
            println!("   detail: {}", outcome.detail_key);
            if let Some(key) = &outcome.comments_key {
                println!("   comments: {}", key);
            }
        }
        Stage::Run => {
            let stores = build_stores(config)?;
            let runner = PipelineRunner::new(
                silver_use_case(config, &stores)?,
                gold_use_case(config, &stores)?,
            );
            let outcome = runner.run().await?;
            println!("silver: {}", outcome.silver.artifact.key);
            println!("gold run {}", outcome.gold.token);
            println!("   summary: {}", outcome.gold.summary_key);
            println!("   detail: {}", outcome.gold.detail_key);
            if let Some(key) = &outcome.gold.comments_key {
                println!("   comments: {}", key);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let stage = match cli.command {
        Commands::Silver => Stage::Silver,
        Commands::Gold => Stage::Gold,
        Commands::Run => Stage::Run,
        // Pure helper: no configuration, logging or storage needed
        Commands::ExtractBucket { identifier } => {
            println!("{}", extract_bucket_name(&identifier)?);
            return Ok(());
        }
    };

    let config = PipelineConfig::resolve(cli.config.as_deref()).context("loading configuration")?;
    observability::init_logging(&config.observability.log_dir)?;
    observability::init_metrics()?;

    let result = run(stage, &config).await;
    if let Err(e) = &result {
        error!("Pipeline run failed: {:#}", e);
    }

    if let Some(path) = &config.observability.metrics_textfile {
        if let Err(e) = observability::write_textfile(path) {
            warn!("Failed to write metrics textfile {}: {}", path.display(), e);
        }
    }
    result
}
