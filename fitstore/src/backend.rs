//! Blob backend abstraction
//!
//! Paths are relative, `/`-separated and already validated by the caller
//! (`<subject>/<id>.json`, `<subject>/index.json`).

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Reads a blob, `None` when it does not exist
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    /// Creates or replaces a blob
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Removes a blob, returns whether it existed
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Names of the blobs directly under `dir`, or `None` when the backend
    /// cannot enumerate
    async fn list(&self, dir: &str) -> Result<Option<Vec<String>>>;

    /// Modification time of a blob, display only
    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>>;
}
