use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No eligible source artifact found in {bucket}/{prefix}")]
    SourceNotFound { bucket: String, prefix: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Object store error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("Artifact already exists: {0} (run tokens have one-second resolution; retry later)")]
    ArtifactExists(String),

    #[error("Silver artifact {selected} is older than {expected} produced by this run")]
    StaleArtifact { selected: String, expected: String },

    #[error("Relational persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
