use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{PipelineError, Result};

const DEFAULT_DIRECTIVE: &str = "survey_pipeline=info";

/// Initializes the logging system with both console and file output.
///
/// The file layer writes JSON lines to a daily rolling `pipeline.log` under
/// `log_dir`. `RUST_LOG` adds to the default `survey_pipeline=info` directive.
pub fn init_logging(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(log_dir, "pipeline.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let directive = DEFAULT_DIRECTIVE
        .parse()
        .map_err(|e| PipelineError::Config(format!("invalid log directive: {e}")))?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("logging already initialized: {e}")))?;

    // Keep the guard alive for the whole process so logs are flushed on exit
    std::mem::forget(guard);
    Ok(())
}
