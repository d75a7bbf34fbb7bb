use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{error, info};

use super::{CleanupPayload, EmailPayload, JobError, TaskHandler, ThumbnailPayload};
use crate::db::dao::run_all_cleanups;
use crate::mailer::Mailer;
use crate::services::FileService;

pub struct ThumbnailHandler {
    file_service: FileService,
}

impl ThumbnailHandler {
    pub fn new(file_service: FileService) -> Self {
        Self { file_service }
    }
}

#[async_trait]
impl TaskHandler for ThumbnailHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), JobError> {
        let payload: ThumbnailPayload = serde_json::from_value(payload)
            .map_err(|err| JobError::SkipRetry(format!("failed to unmarshal payload: {err}")))?;

        info!(file_id = %payload.file_id, "processing thumbnail task");

        self.file_service
            .generate_thumbnail(&payload.file_id, &payload.storage_key)
            .await
            .map_err(|err| JobError::Failed(format!("failed to generate thumbnail: {err}")))?;

        info!(file_id = %payload.file_id, "processed thumbnail task successfully");
        Ok(())
    }
}

pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl TaskHandler for EmailHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), JobError> {
        let payload: EmailPayload = serde_json::from_value(payload)
            .map_err(|err| JobError::SkipRetry(format!("failed to unmarshal payload: {err}")))?;

        self.mailer
            .send(&payload.recipient, &payload.template_file, &payload.data)
            .await
            .map_err(|err| {
                error!(user_id = %payload.user_id, error = %err, "failed to send email");
                JobError::Failed(err.to_string())
            })?;

        info!(user_id = %payload.user_id, "processed email task successfully");
        Ok(())
    }
}

/// Periodic system cleanup: reaps tombstoned files past retention and drains
/// all expired-token classes. Partial failures are logged, never fatal.
pub struct CleanupHandler {
    file_service: FileService,
    db: DatabaseConnection,
}

impl CleanupHandler {
    pub fn new(file_service: FileService, db: DatabaseConnection) -> Self {
        Self { file_service, db }
    }
}

#[async_trait]
impl TaskHandler for CleanupHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), JobError> {
        let _payload: CleanupPayload = serde_json::from_value(payload).unwrap_or_default();

        info!("starting system cleanup task");

        let deleted_files = match self.file_service.cleanup_expired().await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "failed to cleanup files");
                0
            }
        };

        let token_counts = match run_all_cleanups(&self.db).await {
            Ok(counts) => counts,
            Err(err) => {
                error!(error = %err, "failed to cleanup tokens");
                Default::default()
            }
        };

        info!(
            api_keys = token_counts.api_keys_deleted,
            action_tokens = token_counts.action_tokens_deleted,
            refresh_tokens = token_counts.refresh_tokens_deleted,
            deleted_files,
            "system cleanup task finished"
        );
        Ok(())
    }
}
