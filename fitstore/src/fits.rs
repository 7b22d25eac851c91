//! Durable fitting archive
//!
//! Layout below the backend root:
//!
//! ```text
//! <subject>/<fitting id>.json   one record per fitting, remote API shape
//! <subject>/index.json          FitIndex of the most recent sync
//! ```
//!
//! The index is fully rebuilt on every sync and is the only signal of which
//! fittings are currently mirrored remotely. Records missing from a later
//! sync stay on disk as orphans.

use crate::backend::BlobStore;
use crate::error::{Result, StoreError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fitesi::Fitting;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";

/// Index entry of one stored fitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitIndexRecord {
    #[serde(alias = "fittingId")]
    pub id: i64,
    pub name: String,
    pub ship_type_id: i64,
    #[serde(alias = "path")]
    pub storage_path: String,
}

/// Snapshot of the fittings mirrored by the most recent sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitIndex {
    #[serde(alias = "characterId")]
    pub subject_id: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(alias = "fittings")]
    pub records: Vec<FitIndexRecord>,
}

impl FitIndex {
    pub fn contains(&self, fitting_id: i64) -> bool {
        self.records.iter().any(|record| record.id == fitting_id)
    }
}

/// List element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingSummary {
    pub id: i64,
    pub name: String,
    pub ship_type_id: i64,
}

impl From<&FitIndexRecord> for FittingSummary {
    fn from(record: &FitIndexRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            ship_type_id: record.ship_type_id,
        }
    }
}

impl From<&Fitting> for FittingSummary {
    fn from(fitting: &Fitting) -> Self {
        Self {
            id: fitting.fitting_id,
            name: fitting.name.clone(),
            ship_type_id: fitting.ship_type_id,
        }
    }
}

/// Case-insensitive name, then exact name, then id
pub fn compare_by_name(a_name: &str, a_id: i64, b_name: &str, b_id: i64) -> Ordering {
    a_name
        .to_lowercase()
        .cmp(&b_name.to_lowercase())
        .then_with(|| a_name.cmp(b_name))
        .then_with(|| a_id.cmp(&b_id))
}

/// Validates a storage path segment against `[A-Za-z0-9_-]+`
pub fn sanitize_segment(segment: &str) -> Result<&str> {
    let valid = !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(segment)
    } else {
        Err(StoreError::InvalidPath(segment.to_string()))
    }
}

fn subject_dir(subject_id: i64) -> Result<String> {
    Ok(sanitize_segment(&subject_id.to_string())?.to_string())
}

fn record_path(subject_id: i64, fitting_id: i64) -> Result<String> {
    let id = fitting_id.to_string();
    Ok(format!("{}/{}.json", subject_dir(subject_id)?, sanitize_segment(&id)?))
}

fn index_path(subject_id: i64) -> Result<String> {
    Ok(format!("{}/{}", subject_dir(subject_id)?, INDEX_FILE))
}

/// Fitting persistence over any [`BlobStore`]
#[derive(Clone)]
pub struct FittingStore {
    backend: Arc<dyn BlobStore>,
}

impl FittingStore {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Persists every record, then replaces the index
    pub async fn write_all(&self, subject_id: i64, fittings: &[Fitting]) -> Result<FitIndex> {
        let mut records = Vec::with_capacity(fittings.len());
        for fitting in fittings {
            let path = record_path(subject_id, fitting.fitting_id)?;
            self.put_json(&path, fitting).await?;
            records.push(FitIndexRecord {
                id: fitting.fitting_id,
                name: fitting.name.clone(),
                ship_type_id: fitting.ship_type_id,
                storage_path: path,
            });
        }
        records.sort_by(|a, b| compare_by_name(&a.name, a.id, &b.name, b.id));

        let index = FitIndex {
            subject_id,
            updated_at: Utc::now(),
            records,
        };
        self.put_json(&index_path(subject_id)?, &index).await?;

        info!(
            subject_id,
            count = index.records.len(),
            backend = self.backend.kind(),
            "fittings written"
        );
        Ok(index)
    }

    /// Reads one stored fitting
    pub async fn read(&self, subject_id: i64, fitting_id: i64) -> Result<Fitting> {
        let path = record_path(subject_id, fitting_id)?;
        match self.backend.get(&path).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Err(StoreError::NotFound(format!(
                "fitting {} of {}",
                fitting_id, subject_id
            ))),
        }
    }

    /// Index of the last sync, `None` when the subject never synced
    pub async fn try_read_index(&self, subject_id: i64) -> Result<Option<FitIndex>> {
        let path = index_path(subject_id)?;
        match self.backend.get(&path).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Deletes a stored fitting and drops it from the index
    ///
    /// Returns whether the record or its index entry existed. The index is
    /// only rewritten when it listed the fitting.
    pub async fn delete(&self, subject_id: i64, fitting_id: i64) -> Result<bool> {
        let removed = self
            .backend
            .delete(&record_path(subject_id, fitting_id)?)
            .await?;

        let Some(mut index) = self.try_read_index(subject_id).await? else {
            return Ok(removed);
        };
        let before = index.records.len();
        index.records.retain(|record| record.id != fitting_id);
        if index.records.len() == before {
            return Ok(removed);
        }

        self.put_json(&index_path(subject_id)?, &index).await?;
        debug!(subject_id, fitting_id, "fitting removed from index");
        Ok(true)
    }

    /// Lists stored fittings sorted by name
    ///
    /// Uses the index when present. Without one, a backend that can
    /// enumerate is scanned record by record; malformed files are skipped.
    pub async fn list(&self, subject_id: i64) -> Result<Vec<FittingSummary>> {
        if let Some(index) = self.try_read_index(subject_id).await? {
            return Ok(index.records.iter().map(FittingSummary::from).collect());
        }

        let dir = subject_dir(subject_id)?;
        let Some(names) = self.backend.list(&dir).await? else {
            return Ok(Vec::new());
        };

        let mut summaries = Vec::new();
        for name in names {
            if name == INDEX_FILE || !name.ends_with(".json") {
                continue;
            }
            let path = format!("{}/{}", dir, name);
            let Some(data) = self.backend.get(&path).await? else {
                continue;
            };
            match serde_json::from_slice::<Fitting>(&data) {
                Ok(fitting) => summaries.push(FittingSummary::from(&fitting)),
                Err(e) => warn!(path = %path, "skipping unreadable fitting: {}", e),
            }
        }
        summaries.sort_by(|a, b| compare_by_name(&a.name, a.id, &b.name, b.id));
        Ok(summaries)
    }

    /// Backend modification time of a stored fitting
    pub async fn last_modified(
        &self,
        subject_id: i64,
        fitting_id: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        self.backend
            .last_modified(&record_path(subject_id, fitting_id)?)
            .await
    }

    async fn put_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.backend.put(path, Bytes::from(json)).await
    }
}
