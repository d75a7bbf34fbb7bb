use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use sea_orm::SqlErr;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::Principal;
use crate::db::dao::{DaoLayerError, FileDao, NewFile};
use crate::db::entities::file;
use crate::error::AppError;
use crate::filestore::{ByteStream, FileStore, StoreError};
use crate::jobs::{EnqueueOptions, JobBroker, Queue, ThumbnailPayload, TASK_GENERATE_THUMBNAIL};
use crate::services::{Filters, Metadata};

pub const RETENTION_DAYS: i64 = 7;
const SNIFF_LEN: usize = 512;
const THUMBNAIL_WIDTH: u32 = 300;
const CLEANUP_BATCH_LIMIT: u64 = 100;

const BLOCKED_EXTENSIONS: &[&str] = &[
    ".exe", ".dll", ".so", ".bat", ".cmd", ".sh", ".php", ".pl", ".cgi", ".jar", ".vbs",
    ".powershell", ".js",
];

const BLOCKED_MIMES: &[&str] = &[
    "application/x-dosexec",
    "application/x-sh",
    "application/x-httpd-php",
    "application/javascript",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl TryFrom<&str> for Visibility {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct FileService {
    file_dao: FileDao,
    store: Arc<dyn FileStore>,
    broker: JobBroker,
    max_upload_size: u64,
}

impl FileService {
    pub fn new(
        file_dao: FileDao,
        store: Arc<dyn FileStore>,
        broker: JobBroker,
        max_upload_size: u64,
    ) -> Self {
        Self {
            file_dao,
            store,
            broker,
            max_upload_size,
        }
    }

    /// Streams the upload into storage while hashing it, then dedups by
    /// checksum before the metadata row is inserted. Every failure arm after
    /// the save removes the object again.
    pub async fn upload_file(
        &self,
        owner: &Principal,
        filename: &str,
        mut data: ByteStream,
    ) -> Result<file::Model, AppError> {
        check_blocked_extension(filename)?;

        // Sniff the leading bytes for magic-number detection, then stitch
        // them back so the stored object is byte-identical to the upload.
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        while head.len() < SNIFF_LEN {
            match data.next().await {
                Some(Ok(chunk)) => head.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    return Err(AppError::bad_request(format!(
                        "failed to read upload stream: {err}"
                    )))
                }
                None => break,
            }
        }
        let content_type = detect_content_type(&head[..head.len().min(SNIFF_LEN)], filename);
        check_blocked_mime(&content_type)?;

        let rebuilt: ByteStream = stream::iter(vec![Ok(Bytes::from(head))]).chain(data).boxed();

        let storage_key = format!(
            "users/{}/{}{}",
            owner.user_id,
            Uuid::new_v4(),
            file_extension(filename)
        );

        let hasher = Arc::new(Mutex::new(Sha256::new()));
        let written = Arc::new(AtomicU64::new(0));
        let teed = tee_stream(
            rebuilt,
            Arc::clone(&hasher),
            Arc::clone(&written),
            self.max_upload_size,
        );

        let size = match self.store.save(&storage_key, teed).await {
            Ok(size) => size,
            Err(err) => {
                self.store.delete(&[storage_key.clone()]).await;
                if written.load(Ordering::SeqCst) > self.max_upload_size {
                    return Err(AppError::too_large("file size is too large"));
                }
                tracing::error!(key = %storage_key, error = %err, "failed to save file to storage");
                return Err(AppError::internal("storage error"));
            }
        };

        let checksum = hex::encode(hasher.lock().expect("hasher lock").clone().finalize());

        let duplicates = self
            .file_dao
            .count_by_owner_checksum(&owner.user_id, &checksum)
            .await?;
        if duplicates > 0 {
            self.store.delete(&[storage_key.clone()]).await;
            return Err(AppError::duplicate_upload());
        }

        let record = match self
            .file_dao
            .create_file(NewFile {
                user_id: owner.user_id,
                filename,
                storage_key: &storage_key,
                mime_type: &content_type,
                size_bytes: size as i64,
                checksum: &checksum,
                tags: Vec::new(),
            })
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.store.delete(&[storage_key.clone()]).await;
                // A racing identical upload may have won the insert; the
                // partial unique index reports it as a unique violation.
                if let DaoLayerError::Db(db_err) = &err {
                    if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                        return Err(AppError::duplicate_upload());
                    }
                }
                return Err(err.into());
            }
        };

        if content_type.starts_with("image/") {
            let payload = ThumbnailPayload {
                file_id: record.file_id,
                storage_key: storage_key.clone(),
            };
            let opts = EnqueueOptions {
                queue: Queue::Default,
                max_retry: 3,
                timeout: Duration::from_secs(20),
            };
            if let Err(err) = self.broker.enqueue(TASK_GENERATE_THUMBNAIL, &payload, opts) {
                tracing::error!(error = %err, "failed to enqueue thumbnail task");
            }
        }

        Ok(record)
    }

    pub async fn get_metadata(
        &self,
        file_id: &Uuid,
        caller: &Principal,
    ) -> Result<file::Model, AppError> {
        let record = self
            .file_dao
            .find_live(file_id)
            .await?
            .ok_or_else(|| AppError::not_found("file does not exist"))?;

        let is_owner = record.user_id == caller.user_id;
        if !is_owner && record.visibility != Visibility::Public.as_str() {
            return Err(AppError::forbidden(
                "you do not have permission to access this file",
            ));
        }

        Ok(record)
    }

    pub async fn download(
        &self,
        file_id: &Uuid,
        caller: &Principal,
    ) -> Result<(file::Model, ByteStream), AppError> {
        let record = self.get_metadata(file_id, caller).await?;

        let stream = match self.store.get(&record.storage_key).await {
            Ok(stream) => stream,
            Err(StoreError::NotFound) => {
                tracing::error!(
                    key = %record.storage_key,
                    "file found in database but missing in storage"
                );
                return Err(AppError::internal("file content missing"));
            }
            Err(err) => {
                tracing::error!(key = %record.storage_key, error = %err, "failed to open object");
                return Err(AppError::internal("file unavailable"));
            }
        };

        Ok((record, stream))
    }

    pub async fn list_public_files(
        &self,
        filters: Filters,
    ) -> Result<(Vec<file::Model>, Metadata), AppError> {
        filters.validate()?;
        let total = self.file_dao.count_public().await?;
        let page = self
            .file_dao
            .list_public(filters.page, filters.page_size)
            .await?;
        let metadata = Metadata::calculate(total, filters.page, filters.page_size);
        Ok((page.data, metadata))
    }

    pub async fn list_user_files(
        &self,
        user_id: &Uuid,
        filters: Filters,
    ) -> Result<(Vec<file::Model>, Metadata), AppError> {
        filters.validate()?;
        let total = self.file_dao.count_user(user_id).await?;
        let page = self
            .file_dao
            .list_user(user_id, filters.page, filters.page_size)
            .await?;
        let metadata = Metadata::calculate(total, filters.page, filters.page_size);
        Ok((page.data, metadata))
    }

    pub async fn set_visibility(
        &self,
        file_id: &Uuid,
        caller: &Principal,
        version: i32,
        visibility: Visibility,
    ) -> Result<Visibility, AppError> {
        self.owned_live_record(file_id, caller).await?;

        let rows = self
            .file_dao
            .set_visibility(file_id, version, visibility.as_str())
            .await?;
        if rows == 0 {
            return Err(AppError::edit_conflict());
        }

        Ok(visibility)
    }

    pub async fn rename(
        &self,
        file_id: &Uuid,
        caller: &Principal,
        version: i32,
        filename: &str,
    ) -> Result<String, AppError> {
        self.owned_live_record(file_id, caller).await?;

        let rows = self.file_dao.rename(file_id, version, filename).await?;
        if rows == 0 {
            return Err(AppError::edit_conflict());
        }

        Ok(filename.to_string())
    }

    /// Tombstones the row; the object stays in storage until the retention
    /// window passes and the cleanup reaper hard-deletes both.
    pub async fn soft_delete(
        &self,
        file_id: &Uuid,
        caller: &Principal,
        version: i32,
    ) -> Result<(), AppError> {
        self.owned_live_record(file_id, caller).await?;

        let deleted_at = Utc::now().fixed_offset() + chrono::Duration::days(RETENTION_DAYS);
        let rows = self
            .file_dao
            .soft_delete(file_id, version, deleted_at)
            .await?;
        if rows == 0 {
            return Err(AppError::edit_conflict());
        }

        Ok(())
    }

    async fn owned_live_record(
        &self,
        file_id: &Uuid,
        caller: &Principal,
    ) -> Result<file::Model, AppError> {
        let record = self
            .file_dao
            .find_live(file_id)
            .await?
            .ok_or_else(|| AppError::not_found("file does not exist"))?;

        if record.user_id != caller.user_id {
            return Err(AppError::forbidden(
                "you do not have permission to modify this file",
            ));
        }

        Ok(record)
    }

    /// Job-side thumbnail generation: width 300, aspect preserved, Lanczos
    /// resampling, JPEG output. The row is updated only after the thumbnail
    /// object exists.
    pub async fn generate_thumbnail(
        &self,
        file_id: &Uuid,
        storage_key: &str,
    ) -> Result<(), AppError> {
        let stream = self.store.get(storage_key).await.map_err(|err| {
            AppError::internal(format!("failed to open original object: {err}"))
        })?;
        let original: Vec<u8> = stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .map_err(|err| AppError::internal(format!("failed to read original object: {err}")))?;

        let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let img = image::load_from_memory(&original).map_err(|err| err.to_string())?;
            let width = img.width().max(1);
            let height =
                ((u64::from(img.height()) * u64::from(THUMBNAIL_WIDTH)) / u64::from(width)).max(1);
            let resized = img.resize_exact(
                THUMBNAIL_WIDTH,
                height as u32,
                image::imageops::FilterType::Lanczos3,
            );
            let mut buffer = Cursor::new(Vec::new());
            resized
                .write_to(&mut buffer, image::ImageFormat::Jpeg)
                .map_err(|err| err.to_string())?;
            Ok(buffer.into_inner())
        })
        .await
        .map_err(|err| AppError::internal(format!("thumbnail task failed: {err}")))?
        .map_err(|err| AppError::internal(format!("failed to generate thumbnail: {err}")))?;

        let thumbnail_key = format!("thumbnails/{}.jpg", Uuid::new_v4());
        let jpeg_len = jpeg.len();
        let thumb_stream: ByteStream =
            stream::iter(vec![Ok(Bytes::from(jpeg))]).boxed();
        self.store
            .save(&thumbnail_key, thumb_stream)
            .await
            .map_err(|err| AppError::internal(format!("failed to save thumbnail: {err}")))?;

        match self.file_dao.set_thumbnail_key(file_id, &thumbnail_key).await {
            Ok(0) => {
                // The file was soft-deleted while the thumbnail was being
                // generated; drop the orphaned object and stop.
                self.store.delete(&[thumbnail_key.clone()]).await;
                tracing::warn!(
                    file_id = %file_id,
                    "file row gone before thumbnail update, discarding thumbnail"
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => {
                self.store.delete(&[thumbnail_key.clone()]).await;
                return Err(err.into());
            }
        }

        tracing::info!(
            file_id = %file_id,
            key = %thumbnail_key,
            bytes = jpeg_len,
            "thumbnail generated"
        );
        Ok(())
    }

    /// Hard-deletes tombstoned rows past retention, removing their objects
    /// first. Object-store failures are logged per key and never block the
    /// row deletion.
    pub async fn cleanup_expired(&self) -> Result<usize, AppError> {
        let expired = self.file_dao.find_expired_deleted(CLEANUP_BATCH_LIMIT).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut file_ids = Vec::with_capacity(expired.len());
        let mut storage_keys = Vec::new();
        for record in &expired {
            file_ids.push(record.file_id);
            storage_keys.push(record.storage_key.clone());
            if let Some(thumbnail_key) = &record.thumbnail_key {
                storage_keys.push(thumbnail_key.clone());
            }
        }

        let (deleted, failed) = self.store.delete(&storage_keys).await;
        if failed > 0 {
            tracing::error!(deleted, failed, "some expired objects could not be removed");
        }

        self.file_dao.hard_delete(&file_ids).await?;
        Ok(expired.len())
    }
}

fn tee_stream(
    input: ByteStream,
    hasher: Arc<Mutex<Sha256>>,
    written: Arc<AtomicU64>,
    cap: u64,
) -> ByteStream {
    input
        .map(move |item| match item {
            Ok(chunk) => {
                let total = written.fetch_add(chunk.len() as u64, Ordering::SeqCst)
                    + chunk.len() as u64;
                if total > cap {
                    return Err(std::io::Error::other("upload exceeds the maximum size"));
                }
                hasher.lock().expect("hasher lock").update(&chunk);
                Ok(chunk)
            }
            Err(err) => Err(err),
        })
        .boxed()
}

fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn check_blocked_extension(filename: &str) -> Result<(), AppError> {
    let ext = file_extension(filename);
    if BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::field(
            "file",
            format!("file extension '{ext}' is not allowed"),
        ));
    }
    Ok(())
}

fn check_blocked_mime(content_type: &str) -> Result<(), AppError> {
    if BLOCKED_MIMES.contains(&content_type) {
        return Err(AppError::field(
            "file",
            format!("detected blocked content type: {content_type}"),
        ));
    }
    Ok(())
}

/// Magic bytes win; the filename extension is the fallback.
fn detect_content_type(head: &[u8], filename: &str) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if let Some(mime) = mime_guess::from_path(filename).first_raw() {
        return mime.to_string();
    }
    "application/octet-stream".to_string()
}
