//! Fitting service: sync orchestration and read views
//!
//! Mutations (sync, remote removal, push to remote, local delete) run under
//! the subject's lock. Reads never take the lock.

use crate::error::{Result, ServiceError};
use crate::throttle::SyncThrottle;
use crate::transform;
use chrono::{DateTime, Utc};
use fitappraisal::AppraisalCache;
use fitesi::{Fitting, FittingsApi, PlayerProfile};
use fitrefdata::{ReferenceCache, ShipGroupingMetadata};
use fitstore::{FittingStore, SubjectLock};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Placeholder returned by [`FitService::bundle`] when the export fails
pub const EFT_UNAVAILABLE: &str = "Unable to load EFT format.";

const METADATA_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub count: usize,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingListing {
    pub updated_at: Option<DateTime<Utc>>,
    pub groups: Vec<transform::ClassGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingDetail {
    pub fitting: Fitting,
    pub can_remove_from_remote: bool,
    pub can_sync_to_remote: bool,
    pub ship_type_id: i64,
    pub ship_type_name: String,
    pub fitting_name: String,
    pub item_type_names: BTreeMap<i64, String>,
    pub item_names_by_flag: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingPrice {
    pub total_value: f64,
    pub appraisal_url: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingBundle {
    pub detail: FittingDetail,
    pub eft: String,
    pub price: Option<FittingPrice>,
}

/// Result of a remote mutation followed by a refresh sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// Id assigned by the remote side, for pushes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitting_id: Option<i64>,
    /// The refresh sync failed: the local index may lag the remote state
    pub stale: bool,
}

pub struct FitService {
    store: FittingStore,
    remote: Arc<dyn FittingsApi>,
    refdata: ReferenceCache,
    appraisals: AppraisalCache,
    lock: SubjectLock,
    throttle: SyncThrottle,
}

impl FitService {
    pub fn new(
        store: FittingStore,
        remote: Arc<dyn FittingsApi>,
        refdata: ReferenceCache,
        appraisals: AppraisalCache,
    ) -> Self {
        Self {
            store,
            remote,
            refdata,
            appraisals,
            lock: SubjectLock::new(),
            throttle: SyncThrottle::default(),
        }
    }

    /// Minimum interval between two syncs of one subject (zero disables)
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.throttle = SyncThrottle::new(interval);
        self
    }

    pub fn store(&self) -> &FittingStore {
        &self.store
    }

    pub fn lock(&self) -> &SubjectLock {
        &self.lock
    }

    // ============ Mutations ============

    /// Mirrors the subject's remote fittings into the store
    ///
    /// Refused with [`ServiceError::Throttled`] when the previous sync is too
    /// recent; a failed sync gives its throttle slot back.
    pub async fn sync(&self, subject_id: i64, token: &str) -> Result<SyncOutcome> {
        let decision = self.throttle.consume(subject_id);
        if !decision.allowed {
            return Err(ServiceError::Throttled {
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        let result = self
            .lock
            .with_lock(subject_id, || self.sync_locked(subject_id, token))
            .await;

        if let Err(e) = &result {
            error!(subject_id, "sync failed: {}", e);
            self.throttle.clear(subject_id);
        }
        result
    }

    async fn sync_locked(&self, subject_id: i64, token: &str) -> Result<SyncOutcome> {
        info!(subject_id, "syncing fittings");
        let fittings = self.remote.list_fittings(subject_id, token).await?;
        let index = self.store.write_all(subject_id, &fittings).await?;
        info!(subject_id, count = index.records.len(), "sync complete");
        Ok(SyncOutcome {
            count: index.records.len(),
            synced_at: index.updated_at,
        })
    }

    /// Re-sync after a remote mutation; failure only marks the result stale
    async fn refresh_locked(&self, subject_id: i64, token: &str) -> bool {
        match self.sync_locked(subject_id, token).await {
            Ok(_) => false,
            Err(e) => {
                warn!(subject_id, "refresh after mutation failed: {}", e);
                true
            }
        }
    }

    /// Deletes a fitting remotely, keeping the local record
    pub async fn remove_remote(
        &self,
        subject_id: i64,
        fitting_id: i64,
        token: &str,
    ) -> Result<MutationOutcome> {
        self.lock
            .with_lock(subject_id, || {
                self.remove_remote_locked(subject_id, fitting_id, token)
            })
            .await
    }

    async fn remove_remote_locked(
        &self,
        subject_id: i64,
        fitting_id: i64,
        token: &str,
    ) -> Result<MutationOutcome> {
        if let Err(e) = self
            .remote
            .delete_fitting(subject_id, token, fitting_id)
            .await
        {
            error!(subject_id, fitting_id, "remote delete failed: {}", e);
            return Err(e.into());
        }
        info!(subject_id, fitting_id, "fitting removed remotely");
        Ok(MutationOutcome {
            fitting_id: None,
            stale: self.refresh_locked(subject_id, token).await,
        })
    }

    /// Uploads a stored fitting to the remote side
    pub async fn sync_to_remote(
        &self,
        subject_id: i64,
        fitting_id: i64,
        token: &str,
    ) -> Result<MutationOutcome> {
        self.lock
            .with_lock(subject_id, || {
                self.sync_to_remote_locked(subject_id, fitting_id, token)
            })
            .await
    }

    async fn sync_to_remote_locked(
        &self,
        subject_id: i64,
        fitting_id: i64,
        token: &str,
    ) -> Result<MutationOutcome> {
        let fitting = self.store.read(subject_id, fitting_id).await?;
        let new_id = match self.remote.create_fitting(subject_id, token, &fitting).await {
            Ok(id) => id,
            Err(e) => {
                error!(subject_id, fitting_id, "remote create failed: {}", e);
                return Err(e.into());
            }
        };
        info!(subject_id, fitting_id, new_id, "fitting pushed remotely");
        Ok(MutationOutcome {
            fitting_id: Some(new_id),
            stale: self.refresh_locked(subject_id, token).await,
        })
    }

    /// Permanently deletes a stored fitting, returns whether it existed
    pub async fn delete_local(&self, subject_id: i64, fitting_id: i64) -> Result<bool> {
        let _guard = self.lock.acquire(subject_id).await;
        let removed = self.store.delete(subject_id, fitting_id).await?;
        if removed {
            info!(subject_id, fitting_id, "stored fitting deleted");
        } else {
            debug!(subject_id, fitting_id, "nothing to delete");
        }
        Ok(removed)
    }

    // ============ Reads ============

    /// Grouped listing, filtered by a substring query
    pub async fn list(&self, subject_id: i64, query: &str) -> Result<FittingListing> {
        let index = self.store.try_read_index(subject_id).await?;
        let summaries = self.store.list(subject_id).await?;
        let updated_at = index.as_ref().map(|index| index.updated_at);

        if summaries.is_empty() {
            return Ok(FittingListing {
                updated_at,
                groups: Vec::new(),
            });
        }

        let synced: HashSet<i64> = index
            .map(|index| index.records.iter().map(|record| record.id).collect())
            .unwrap_or_default();

        let ship_ids: BTreeSet<i64> = summaries.iter().map(|s| s.ship_type_id).collect();
        let metadata: HashMap<i64, ShipGroupingMetadata> = stream::iter(ship_ids)
            .map(|id| async move { (id, self.refdata.resolve_grouping_metadata(id).await) })
            .buffer_unordered(METADATA_CONCURRENCY)
            .collect()
            .await;

        Ok(FittingListing {
            updated_at,
            groups: transform::group_fittings(&summaries, &metadata, &synced, query),
        })
    }

    /// Stored fitting annotated with sync status and resolved names
    pub async fn detail(&self, subject_id: i64, fitting_id: i64) -> Result<FittingDetail> {
        let fitting = self.store.read(subject_id, fitting_id).await?;
        let in_latest_sync = self
            .store
            .try_read_index(subject_id)
            .await?
            .map(|index| index.contains(fitting_id))
            .unwrap_or(false);

        let (ship_type_name, names) = tokio::join!(
            self.refdata.resolve_ship_type_name(fitting.ship_type_id),
            self.refdata
                .resolve_type_names(fitting.items.iter().map(|item| item.type_id)),
        );

        Ok(FittingDetail {
            can_remove_from_remote: in_latest_sync,
            can_sync_to_remote: !in_latest_sync,
            ship_type_id: fitting.ship_type_id,
            ship_type_name,
            fitting_name: fitting.name.clone(),
            item_names_by_flag: transform::item_names_by_flag(&fitting, &names),
            item_type_names: names.into_iter().collect(),
            fitting,
        })
    }

    /// EFT text of a stored fitting
    pub async fn export(&self, subject_id: i64, fitting_id: i64) -> Result<String> {
        let fitting = self.store.read(subject_id, fitting_id).await?;
        let (ship_type_name, names) = tokio::join!(
            self.refdata.resolve_ship_type_name(fitting.ship_type_id),
            self.refdata
                .resolve_type_names(fitting.items.iter().map(|item| item.type_id)),
        );
        Ok(transform::render_eft(&fitting, &ship_type_name, &names))
    }

    /// Market value of a stored fitting
    pub async fn price_estimate(&self, subject_id: i64, fitting_id: i64) -> Result<FittingPrice> {
        let eft = self.export(subject_id, fitting_id).await?;
        let estimate = self.appraisals.estimate(&eft).await?;

        let last_modified = match self.store.last_modified(subject_id, fitting_id).await {
            Ok(modified) => modified,
            Err(e) => {
                warn!(subject_id, fitting_id, "no modification time: {}", e);
                None
            }
        };

        Ok(FittingPrice {
            total_value: estimate.total_value,
            appraisal_url: estimate.appraisal_url,
            last_modified,
        })
    }

    /// Detail, export and price in one call
    ///
    /// Only the detail is required; export and price failures are logged and
    /// replaced by a placeholder and `None`.
    pub async fn bundle(&self, subject_id: i64, fitting_id: i64) -> Result<FittingBundle> {
        let detail = self.detail(subject_id, fitting_id).await?;

        let (eft, price) = tokio::join!(
            self.export(subject_id, fitting_id),
            self.price_estimate(subject_id, fitting_id),
        );

        let eft = eft.unwrap_or_else(|e| {
            warn!(subject_id, fitting_id, "EFT export failed: {}", e);
            EFT_UNAVAILABLE.to_string()
        });
        let price = match price {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(subject_id, fitting_id, "price estimate failed: {}", e);
                None
            }
        };

        Ok(FittingBundle { detail, eft, price })
    }

    /// Public identity of the subject
    pub async fn profile(&self, subject_id: i64, token: &str) -> Result<PlayerProfile> {
        Ok(self.remote.load_profile(subject_id, token).await?)
    }
}
