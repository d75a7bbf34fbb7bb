use std::sync::Arc;

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use tracing::info;

use super::{FileStore, ObjectFileStore};
use crate::config::{StorageConfig, StorageType};

/// Builds the configured storage backend. Both backends implement the same
/// `ObjectStore` trait, so everything downstream is backend-agnostic.
pub fn build_file_store(cfg: &StorageConfig) -> Result<Arc<dyn FileStore>> {
    let inner: Arc<dyn ObjectStore> = match cfg.storage_type {
        StorageType::Local => build_local(cfg)?,
        StorageType::Cloud => build_s3(cfg)?,
    };

    Ok(Arc::new(ObjectFileStore::new(inner)))
}

fn build_local(cfg: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let base = cfg.uploads_dir.trim();
    if base.is_empty() {
        anyhow::bail!("local storage requires a non-empty UPLOADS_DIR");
    }

    let path = std::path::PathBuf::from(base);
    if !path.exists() {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create uploads directory {}", path.display()))?;
    }

    let absolute = path
        .canonicalize()
        .with_context(|| format!("failed to resolve uploads directory {}", path.display()))?;

    info!(path = %absolute.display(), "initialised disk storage");
    let store = LocalFileSystem::new_with_prefix(absolute)
        .context("failed to initialise local filesystem store")?;
    Ok(Arc::new(store))
}

fn build_s3(cfg: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let bucket = cfg
        .s3_bucket
        .as_deref()
        .context("cloud storage requires S3_BUCKET")?;

    let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);

    if let Some(region) = cfg.s3_region.as_deref() {
        builder = builder.with_region(region);
    }
    if let (Some(access_key), Some(secret_key)) =
        (cfg.s3_access_key.as_deref(), cfg.s3_secret_key.as_deref())
    {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }
    // Custom endpoints (MinIO, DigitalOcean Spaces) need path-style addressing.
    if let Some(endpoint) = cfg.s3_endpoint.as_deref().filter(|e| !e.is_empty()) {
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
    }

    let store = builder.build().context("failed to initialise S3 store")?;
    info!(bucket, "initialised S3 storage");
    Ok(Arc::new(store))
}
