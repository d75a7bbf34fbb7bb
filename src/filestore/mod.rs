mod factory;
mod object;

pub use factory::build_file_store;
pub use object::ObjectFileStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    InvalidKey(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "object not found"),
            StoreError::InvalidKey(key) => write!(f, "invalid storage key: {key}"),
            StoreError::Io(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence of opaque byte streams under application-chosen keys. Disk and
/// S3-compatible backends both sit behind the same `object_store` adapter.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Streams to the given key until the stream ends, reporting total bytes
    /// written. A failed save leaves no partial object behind.
    async fn save(&self, key: &str, data: ByteStream) -> Result<u64, StoreError>;

    /// Opens the object as a byte stream. Missing objects are a distinct
    /// error so callers can report storage inconsistencies.
    async fn get(&self, key: &str) -> Result<ByteStream, StoreError>;

    /// Bulk, idempotent delete. Missing keys count as successes; one bad key
    /// never fails the whole call. Returns (successes, failures).
    async fn delete(&self, keys: &[String]) -> (usize, usize);
}
