use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::pipeline::processing::aggregate::MetricsSnapshot;
use crate::pipeline::storage::{ArtifactMeta, RunToken};

/// Versioned artifact storage for one bucket
#[async_trait]
pub trait ArtifactStorePort: Send + Sync {
    /// Validated bucket name this store writes to
    fn bucket(&self) -> &str;

    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactMeta>>;

    async fn head(&self, key: &str) -> Result<Option<ArtifactMeta>>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Create a new object; fails with `ArtifactExists` instead of overwriting
    async fn put_new(&self, key: &str, bytes: Bytes) -> Result<ArtifactMeta>;

    /// Remove an object published by a run that later failed
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Outcome of mirroring one snapshot into the relational store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub summary_rows: usize,
    pub detail_rows: usize,
    pub failed_rows: usize,
}

#[async_trait]
pub trait MetricsMirrorPort: Send + Sync {
    /// Persist every summary metric and detail row tagged with `token`.
    /// Individual row failures are counted in the report, not returned.
    async fn persist(&self, token: &RunToken, snapshot: &MetricsSnapshot) -> Result<MirrorReport>;
}
