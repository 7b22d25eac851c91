//! Small JSON file cache for reference data and appraisals
//!
//! One file per key (`{dir}/{key}.json`). Unlike the fitting archive this
//! cache is best-effort: unreadable files read as absent and write failures
//! are logged, never returned.

use crate::local::atomic_write;
use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    /// The directory is created on first write
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(anyhow!("invalid cache key {:?}", key));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Loads a cached value, `None` when absent or unreadable
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_load(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {:?}: {:#}", key, e);
                None
            }
        }
    }

    async fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.cache_path(key)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache file does not exist: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let data = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        debug!("Loaded cache from {}", path.display());
        Ok(Some(data))
    }

    /// Saves a value, returns whether it reached the disk
    pub async fn save<T: Serialize>(&self, key: &str, data: &T) -> bool {
        match self.try_save(key, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write cache entry {:?}: {:#}", key, e);
                false
            }
        }
    }

    async fn try_save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let path = self.cache_path(key)?;
        let json = serde_json::to_vec_pretty(data)?;

        if let Err(e) = atomic_write(&path, &json).await {
            debug!(
                "Atomic write of {} failed ({}), overwriting in place",
                path.display(),
                e
            );
            tokio::fs::write(&path, &json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
        }
        debug!("Saved cache to {}", path.display());
        Ok(())
    }
}
