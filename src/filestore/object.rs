use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};

use super::{ByteStream, FileStore, StoreError};

/// Minimum part size accepted by S3 multipart uploads; the final part may be
/// smaller.
const PART_SIZE: usize = 5 * 1024 * 1024;

pub struct ObjectFileStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFileStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn parse_key(&self, key: &str) -> Result<ObjectPath, StoreError> {
        if key.is_empty()
            || key.starts_with('/')
            || key.contains('\\')
            || key.split('/').any(|segment| segment == ".." || segment == ".")
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        ObjectPath::parse(key).map_err(|_| StoreError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl FileStore for ObjectFileStore {
    async fn save(&self, key: &str, mut data: ByteStream) -> Result<u64, StoreError> {
        let path = self.parse_key(key)?;

        let mut upload = self
            .store
            .put_multipart(&path)
            .await
            .map_err(|err| StoreError::Io(err.to_string()))?;

        let mut written: u64 = 0;
        let mut buffer: Vec<u8> = Vec::with_capacity(PART_SIZE);

        let result: Result<(), StoreError> = loop {
            match data.next().await {
                Some(Ok(chunk)) => {
                    written += chunk.len() as u64;
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() >= PART_SIZE {
                        let part = PutPayload::from(Bytes::from(std::mem::replace(
                            &mut buffer,
                            Vec::with_capacity(PART_SIZE),
                        )));
                        if let Err(err) = upload.put_part(part).await {
                            break Err(StoreError::Io(err.to_string()));
                        }
                    }
                }
                Some(Err(err)) => break Err(StoreError::Io(err.to_string())),
                None => {
                    if !buffer.is_empty() {
                        let part = PutPayload::from(Bytes::from(std::mem::take(&mut buffer)));
                        if let Err(err) = upload.put_part(part).await {
                            break Err(StoreError::Io(err.to_string()));
                        }
                    }
                    break Ok(());
                }
            }
        };

        match result {
            Ok(()) => {
                upload
                    .complete()
                    .await
                    .map_err(|err| StoreError::Io(err.to_string()))?;
                Ok(written)
            }
            Err(err) => {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(key, error = %abort_err, "failed to abort partial upload");
                }
                Err(err)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        let path = self.parse_key(key)?;

        let result = self.store.get(&path).await.map_err(|err| match err {
            object_store::Error::NotFound { .. } => StoreError::NotFound,
            other => StoreError::Io(other.to_string()),
        })?;

        let stream = result
            .into_stream()
            .map(|item| item.map_err(std::io::Error::other))
            .boxed();
        Ok(stream)
    }

    async fn delete(&self, keys: &[String]) -> (usize, usize) {
        let mut success = 0;
        let mut failure = 0;

        for key in keys {
            let path = match self.parse_key(key) {
                Ok(path) => path,
                Err(err) => {
                    tracing::error!(key, error = %err, "failed to delete object");
                    failure += 1;
                    continue;
                }
            };

            match self.store.delete(&path).await {
                // Deletion is idempotent: a missing object is already gone.
                Ok(()) | Err(object_store::Error::NotFound { .. }) => success += 1,
                Err(err) => {
                    tracing::error!(key, error = %err, "failed to delete object");
                    failure += 1;
                }
            }
        }

        (success, failure)
    }
}
