//! `ArtifactStorePort` over any `object_store` backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutMode, PutOptions};
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::ports::ArtifactStorePort;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::storage::{extract_bucket_name, ArtifactMeta};

/// One bucket of an object store
pub struct ObjectStoreArtifacts {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreArtifacts {
    /// `bucket` accepts any identifier form understood by `extract_bucket_name`
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str) -> Result<Self> {
        Ok(Self {
            store,
            bucket: extract_bucket_name(bucket)?,
        })
    }

    fn meta(object: ObjectMeta) -> ArtifactMeta {
        ArtifactMeta {
            key: object.location.to_string(),
            last_modified: object.last_modified,
            size: object.size as u64,
        }
    }

    /// Existence check then plain put, for backends without conditional writes
    async fn put_if_absent(&self, path: &Path, bytes: Bytes) -> Result<()> {
        match self.store.head(path).await {
            Ok(_) => Err(PipelineError::ArtifactExists(path.to_string())),
            Err(object_store::Error::NotFound { .. }) => {
                self.store.put(path, bytes.into()).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ArtifactStorePort for ObjectStoreArtifacts {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactMeta>> {
        // object_store prefixes match whole path segments, so list the
        // enclosing directory and filter on the raw string prefix
        let dir = match prefix.rfind('/') {
            Some(idx) => Some(Path::from(&prefix[..idx])),
            None => None,
        };
        let objects: Vec<ObjectMeta> = self.store.list(dir.as_ref()).try_collect().await?;
        let mut listed: Vec<ArtifactMeta> = objects
            .into_iter()
            .map(Self::meta)
            .filter(|a| a.key.starts_with(prefix))
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        debug!("Listed {} objects under {}/{}", listed.len(), self.bucket, prefix);
        Ok(listed)
    }

    async fn head(&self, key: &str) -> Result<Option<ArtifactMeta>> {
        match self.store.head(&Path::from(key)).await {
            Ok(object) => Ok(Some(Self::meta(object))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let bytes = self.store.get(&Path::from(key)).await?.bytes().await?;
        metrics::storage::artifact_read(&self.bucket, bytes.len());
        Ok(bytes)
    }

    async fn put_new(&self, key: &str, bytes: Bytes) -> Result<ArtifactMeta> {
        let path = Path::from(key);
        let size = bytes.len();
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };

        match self.store.put_opts(&path, bytes.clone().into(), opts).await {
            Ok(_) => {}
            Err(object_store::Error::AlreadyExists { .. }) => {
                return Err(PipelineError::ArtifactExists(key.to_string()));
            }
            Err(object_store::Error::NotImplemented)
            | Err(object_store::Error::NotSupported { .. }) => {
                self.put_if_absent(&path, bytes).await?;
            }
            Err(e) => return Err(e.into()),
        }
        metrics::storage::artifact_written(&self.bucket, size);

        let object = self.store.head(&path).await?;
        Ok(Self::meta(object))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&Path::from(key)).await?;
        Ok(())
    }
}

/// Build the artifact store for one bucket from the storage settings
pub fn build_store(config: &StorageConfig, bucket: &str) -> Result<Arc<dyn ArtifactStorePort>> {
    let bucket = extract_bucket_name(bucket)?;
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory object store for bucket {}", bucket);
            Arc::new(InMemory::new())
        }
        StorageBackend::Local => {
            let root = config.local_root.join(&bucket);
            std::fs::create_dir_all(&root)?;
            info!("Using local object store at {}", root.display());
            Arc::new(LocalFileSystem::new_with_prefix(&root)?)
        }
        StorageBackend::S3 => {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(&bucket)
                .with_region(&config.region)
                .with_allow_http(config.allow_http);

            // Custom endpoints for MinIO and similar services
            if let Some(endpoint) = &config.endpoint {
                info!("Using custom S3 endpoint: {}", endpoint);
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(key) = &config.access_key_id {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &config.secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }
            info!("Using S3 object store: bucket={}, region={}", bucket, config.region);
            Arc::new(builder.build()?)
        }
    };
    Ok(Arc::new(ObjectStoreArtifacts::new(store, &bucket)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(bucket: &str) -> ObjectStoreArtifacts {
        ObjectStoreArtifacts::new(Arc::new(InMemory::new()), bucket).unwrap()
    }

    #[test]
    fn test_bucket_identifier_is_validated() {
        let store = memory("s3://silver/survey");
        assert_eq!(store.bucket(), "silver");
        assert!(ObjectStoreArtifacts::new(Arc::new(InMemory::new()), "").is_err());
    }

    #[tokio::test]
    async fn test_put_new_never_overwrites() {
        let store = memory("gold");
        let meta = store
            .put_new("survey/a.parquet", Bytes::from_static(b"first"))
            .await
            .unwrap();
        assert_eq!(meta.key, "survey/a.parquet");
        assert_eq!(meta.size, 5);

        let err = store
            .put_new("survey/a.parquet", Bytes::from_static(b"second"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactExists(_)));
        assert!(err.to_string().contains("retry"), "{err}");
        assert_eq!(store.get("survey/a.parquet").await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_list_filters_on_string_prefix() {
        let store = memory("raw");
        for key in ["survey/data.parquet", "survey/data_silver_x.parquet", "other/data.parquet"] {
            store.put_new(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let keys: Vec<String> = store
            .list("survey/data_")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.key)
            .collect();
        assert_eq!(keys, vec!["survey/data_silver_x.parquet"]);
        assert_eq!(store.list("survey/").await.unwrap().len(), 2);
        assert_eq!(store.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_head_and_delete() {
        let store = memory("gold");
        assert!(store.head("survey/missing.csv").await.unwrap().is_none());
        store
            .put_new("survey/x.csv", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert!(store.head("survey/x.csv").await.unwrap().is_some());
        store.delete("survey/x.csv").await.unwrap();
        assert!(store.head("survey/x.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_backend_creates_bucket_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let store = build_store(&config, "s3://silver/survey").unwrap();
        assert_eq!(store.bucket(), "silver");
        assert!(dir.path().join("silver").is_dir());

        store
            .put_new("survey/data_silver_1.parquet", Bytes::from_static(b"pq"))
            .await
            .unwrap();
        assert!(dir.path().join("silver/survey/data_silver_1.parquet").is_file());
        assert_eq!(store.list("survey/").await.unwrap().len(), 1);
    }
}
