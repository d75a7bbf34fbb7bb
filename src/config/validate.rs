use anyhow::{bail, Result};

use super::configs::{RawConfig, StorageType};

pub(super) fn validate(cfg: &RawConfig) -> Result<()> {
    if cfg.port == 0 {
        bail!("PORT must be non-zero");
    }
    if cfg.domain.trim().is_empty() {
        bail!("DOMAIN is required");
    }
    if cfg.env.trim().is_empty() {
        bail!("ENV is required");
    }
    if cfg.project_name.trim().is_empty() {
        bail!("PROJECT_NAME is required");
    }
    if cfg.max_upload_size == 0 {
        bail!("MAX_UPLOAD_SIZE must be non-zero");
    }

    match cfg.storage_type {
        StorageType::Local => {
            if cfg.uploads_dir.trim().is_empty() {
                bail!("UPLOADS_DIR is required for local storage");
            }
        }
        StorageType::Cloud => {
            let missing = [
                ("S3_ACCESS_KEY", &cfg.s3_access_key),
                ("S3_SECRET_KEY", &cfg.s3_secret_key),
                ("S3_REGION", &cfg.s3_region),
                ("S3_BUCKET", &cfg.s3_bucket),
            ]
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect::<Vec<_>>();

            if !missing.is_empty() {
                bail!("cloud storage requires {}", missing.join(", "));
            }
        }
    }

    Ok(())
}
