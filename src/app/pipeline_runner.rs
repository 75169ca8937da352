use tracing::{info, instrument};

use crate::app::gold_use_case::{GoldOutcome, GoldUseCase};
use crate::app::silver_use_case::{SilverOutcome, SilverUseCase};
use crate::error::Result;

/// Outcome of a full silver then gold run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub silver: SilverOutcome,
    pub gold: GoldOutcome,
}

/// Runs both stages in order. Gold is bound to the artifact the silver stage
/// just produced and refuses anything older.
pub struct PipelineRunner {
    silver: SilverUseCase,
    gold: GoldUseCase,
}

impl PipelineRunner {
    pub fn new(silver: SilverUseCase, gold: GoldUseCase) -> Self {
        Self { silver, gold }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let silver = self.silver.run().await?;
        info!(
            "Silver stage produced {} ({} records)",
            silver.artifact.key, silver.records_written
        );

        let gold = self.gold.run(Some(&silver.artifact)).await?;
        info!("Gold stage published run {}", gold.token);

        Ok(PipelineOutcome { silver, gold })
    }
}
