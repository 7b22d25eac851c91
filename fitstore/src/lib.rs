//! # fitstore - durable fitting archive
//!
//! - [`SubjectLock`] : per-subject FIFO serialization of mutations
//! - [`FittingStore`] : records + authoritative index over a [`BlobStore`]
//! - [`LocalBlobStore`] / [`RemoteBlobStore`] : filesystem and object-store backends
//! - [`BlobReadCache`] : read-through cache in front of the remote backend
//! - [`JsonFileCache`] : best-effort JSON cache shared by the reference and
//!   appraisal caches

pub mod backend;
pub mod blob_cache;
pub mod disk_cache;
pub mod error;
pub mod fits;
pub mod local;
pub mod lock;
pub mod remote;

pub use backend::BlobStore;
pub use blob_cache::BlobReadCache;
pub use disk_cache::JsonFileCache;
pub use error::{Result, StoreError};
pub use fits::{FitIndex, FitIndexRecord, FittingStore, FittingSummary};
pub use local::LocalBlobStore;
pub use lock::{SubjectGuard, SubjectLock};
pub use remote::{HttpObjectStore, ObjectStoreClient, RemoteBlobStore};

use fitconfig::{Config, StorageBackendKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds the blob backend selected by `storage.backend`
pub fn backend_from_config(config: &Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.get_storage_backend()? {
        StorageBackendKind::Local => {
            let root = config.get_storage_dir()?;
            info!("Using local fitting storage in {}", root);
            Ok(Arc::new(LocalBlobStore::new(root)))
        }
        StorageBackendKind::Remote => {
            let base_url = config.get_remote_base_url();
            info!("Using remote fitting storage at {}", base_url);
            let client = HttpObjectStore::new(
                base_url,
                config.get_remote_prefix(),
                config.get_remote_token(),
            )?;
            let cache = BlobReadCache::new(
                Duration::from_secs(config.get_blob_cache_ttl_seconds()),
                config.get_blob_cache_max_entries() as usize,
            );
            Ok(Arc::new(RemoteBlobStore::new(client, cache)))
        }
    }
}
