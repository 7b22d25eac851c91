//! Disk-backed reference cache with graceful degradation
//!
//! Layout below the cache root:
//!
//! ```text
//! types/<id>.json        item type names
//! ship-types/<id>.json   ship names + group/faction/race ids
//! groups/<id>.json       group (ship class) names
//! tables/factions.json   faction id -> name
//! tables/races.json      race id -> name
//! ```
//!
//! A record is usable while `now < expiresAt`; ship records must also carry
//! a group id before they can be used for grouping. When a refresh fails or
//! only produces a fallback, the stale value is served as-is: its expiry is
//! not extended and the fallback is never written.

use crate::source::{ReferenceSource, TypeDocument};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fitstore::JsonFileCache;
use futures::stream::{self, StreamExt};
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reference data never expires sooner than this
pub const MIN_TTL_DAYS: u64 = 30;

pub const UNKNOWN_CLASS: &str = "Unknown Class";
pub const UNKNOWN_FACTION: &str = "Unknown Faction";

const DEFAULT_TABLE_MEMORY_TTL: Duration = Duration::from_secs(3600);
const LOOKUP_CONCURRENCY: usize = 8;

/// Cached name of one type or group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceCacheRecord {
    #[serde(alias = "typeId", alias = "shipTypeId")]
    pub id: i64,
    #[serde(alias = "typeName", alias = "shipTypeName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_id: Option<i64>,
    /// Classification was requested upstream; absent on records written
    /// before hulls were grouped
    #[serde(default)]
    pub classified: bool,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReferenceCacheRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Carries a group id, or upstream was already asked for one
    pub fn is_classified(&self) -> bool {
        self.group_id.is_some() || self.classified
    }
}

/// Cached bulk id -> name table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupTableRecord {
    pub entries: HashMap<i64, String>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Classification of a ship hull, used to group fittings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipGroupingMetadata {
    pub ship_type_id: i64,
    pub ship_type_name: String,
    pub ship_class_name: String,
    pub ship_faction_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Table {
    Factions,
    Races,
}

impl Table {
    fn key(self) -> &'static str {
        match self {
            Table::Factions => "factions",
            Table::Races => "races",
        }
    }
}

/// Resolves type, ship, class and faction names
#[derive(Clone)]
pub struct ReferenceCache {
    source: Arc<dyn ReferenceSource>,
    types: JsonFileCache,
    ships: JsonFileCache,
    groups: JsonFileCache,
    tables: JsonFileCache,
    ttl_days: u64,
    memory: MokaCache<Table, Arc<HashMap<i64, String>>>,
}

impl ReferenceCache {
    /// Creates a cache rooted at `cache_root` with the default TTLs
    pub fn new<P: AsRef<Path>>(source: Arc<dyn ReferenceSource>, cache_root: P) -> Self {
        let root = cache_root.as_ref();
        Self {
            source,
            types: JsonFileCache::new(root.join("types")),
            ships: JsonFileCache::new(root.join("ship-types")),
            groups: JsonFileCache::new(root.join("groups")),
            tables: JsonFileCache::new(root.join("tables")),
            ttl_days: MIN_TTL_DAYS,
            memory: Self::table_memory(DEFAULT_TABLE_MEMORY_TTL),
        }
    }

    /// Builds the cache under `<storage dir>/_cache` using the configured TTLs
    pub fn from_config(source: Arc<dyn ReferenceSource>) -> anyhow::Result<Self> {
        let config = fitconfig::get_config();
        let root = Path::new(&config.get_storage_dir()?).join("_cache");
        Ok(Self::new(source, root)
            .with_ttl_days(config.get_refdata_ttl_days())
            .with_table_memory_ttl(Duration::from_secs(
                config.get_refdata_table_memory_ttl_seconds(),
            )))
    }

    /// Record lifetime in days, clamped to at least [`MIN_TTL_DAYS`]
    pub fn with_ttl_days(mut self, days: u64) -> Self {
        self.ttl_days = days.max(MIN_TTL_DAYS);
        self
    }

    pub fn with_table_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory = Self::table_memory(ttl);
        self
    }

    fn table_memory(ttl: Duration) -> MokaCache<Table, Arc<HashMap<i64, String>>> {
        MokaCache::builder()
            .max_capacity(4)
            .time_to_live(ttl)
            .build()
    }

    pub fn ttl_days(&self) -> u64 {
        self.ttl_days
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + ChronoDuration::days(self.ttl_days as i64)
    }

    // ============ Single ids ============

    /// Name of an item type, or its id as text when unknown
    pub async fn resolve_type_name(&self, type_id: i64) -> String {
        match self.resolve_type_record(&self.types, type_id, false).await {
            Some(record) => record.name,
            None => type_id.to_string(),
        }
    }

    /// Name of a ship type, or its id as text when unknown
    pub async fn resolve_ship_type_name(&self, ship_type_id: i64) -> String {
        match self.resolve_type_record(&self.ships, ship_type_id, false).await {
            Some(record) => record.name,
            None => ship_type_id.to_string(),
        }
    }

    /// Names of several types, each id resolved once, lookups run concurrently
    pub async fn resolve_type_names<I>(&self, type_ids: I) -> HashMap<i64, String>
    where
        I: IntoIterator<Item = i64>,
    {
        let unique: BTreeSet<i64> = type_ids.into_iter().collect();
        stream::iter(unique)
            .map(|id| async move { (id, self.resolve_type_name(id).await) })
            .buffer_unordered(LOOKUP_CONCURRENCY)
            .collect()
            .await
    }

    /// Ship name, class and faction for grouping
    pub async fn resolve_grouping_metadata(&self, ship_type_id: i64) -> ShipGroupingMetadata {
        let record = self.resolve_type_record(&self.ships, ship_type_id, true).await;

        let Some(record) = record else {
            return ShipGroupingMetadata {
                ship_type_id,
                ship_type_name: ship_type_id.to_string(),
                ship_class_name: UNKNOWN_CLASS.to_string(),
                ship_faction_name: UNKNOWN_FACTION.to_string(),
            };
        };

        let ship_class_name = match record.group_id {
            Some(group_id) => self.resolve_group_name(group_id).await,
            None => None,
        }
        .unwrap_or_else(|| UNKNOWN_CLASS.to_string());

        let ship_faction_name = self
            .resolve_faction_name(record.faction_id, record.race_id)
            .await
            .unwrap_or_else(|| UNKNOWN_FACTION.to_string());

        ShipGroupingMetadata {
            ship_type_id,
            ship_type_name: record.name,
            ship_class_name,
            ship_faction_name,
        }
    }

    /// Cached record of a type, refreshed when stale
    ///
    /// With `classified`, a record without a group id counts as stale.
    async fn resolve_type_record(
        &self,
        store: &JsonFileCache,
        type_id: i64,
        classified: bool,
    ) -> Option<ReferenceCacheRecord> {
        let key = type_id.to_string();
        let existing: Option<ReferenceCacheRecord> = store.load(&key).await;
        let now = Utc::now();

        if let Some(record) = &existing {
            if record.is_fresh(now) && (!classified || record.is_classified()) {
                debug!(type_id, "reference cache hit");
                return existing;
            }
        }

        match self.source.fetch_type(type_id).await {
            Ok(TypeDocument {
                name: Some(name),
                group_id,
                faction_id,
                race_id,
            }) => {
                if let Some(mut record) = existing.filter(|r| r.is_fresh(now)) {
                    if group_id.is_none() {
                        // Nothing new: keep the expiry, only remember the check.
                        debug!(type_id, "reference source has no group for hull");
                        record.classified = true;
                        store.save(&key, &record).await;
                        return Some(record);
                    }
                }
                let record = ReferenceCacheRecord {
                    id: type_id,
                    name,
                    group_id,
                    faction_id,
                    race_id,
                    classified: true,
                    cached_at: now,
                    expires_at: self.expiry(now),
                };
                store.save(&key, &record).await;
                Some(record)
            }
            Ok(_) => {
                debug!(type_id, "reference source has no name for type");
                existing
            }
            Err(e) => {
                warn!(type_id, "reference lookup failed, serving cached value: {:#}", e);
                existing
            }
        }
    }

    async fn resolve_group_name(&self, group_id: i64) -> Option<String> {
        let key = group_id.to_string();
        let existing: Option<ReferenceCacheRecord> = self.groups.load(&key).await;
        let now = Utc::now();

        if let Some(record) = &existing {
            if record.is_fresh(now) {
                return Some(record.name.clone());
            }
        }

        match self.source.fetch_group_name(group_id).await {
            Ok(Some(name)) => {
                let record = ReferenceCacheRecord {
                    id: group_id,
                    name: name.clone(),
                    group_id: None,
                    faction_id: None,
                    race_id: None,
                    classified: false,
                    cached_at: now,
                    expires_at: self.expiry(now),
                };
                self.groups.save(&key, &record).await;
                Some(name)
            }
            Ok(None) => existing.map(|r| r.name),
            Err(e) => {
                warn!(group_id, "group lookup failed: {:#}", e);
                existing.map(|r| r.name)
            }
        }
    }

    async fn resolve_faction_name(
        &self,
        faction_id: Option<i64>,
        race_id: Option<i64>,
    ) -> Option<String> {
        if let Some(id) = faction_id {
            if let Some(name) = self.table(Table::Factions).await.get(&id) {
                return Some(name.clone());
            }
        }
        if let Some(id) = race_id {
            if let Some(name) = self.table(Table::Races).await.get(&id) {
                return Some(name.clone());
            }
        }
        None
    }

    // ============ Bulk tables ============

    async fn table(&self, table: Table) -> Arc<HashMap<i64, String>> {
        if let Some(entries) = self.memory.get(&table).await {
            return entries;
        }

        let existing: Option<LookupTableRecord> = self.tables.load(table.key()).await;
        let now = Utc::now();

        if let Some(record) = &existing {
            if record.is_fresh(now) {
                let entries = Arc::new(record.entries.clone());
                self.memory.insert(table, entries.clone()).await;
                return entries;
            }
        }

        let fetched = match table {
            Table::Factions => self.source.fetch_factions().await,
            Table::Races => self.source.fetch_races().await,
        };

        match fetched {
            Ok(entries) if !entries.is_empty() => {
                let record = LookupTableRecord {
                    entries,
                    cached_at: now,
                    expires_at: self.expiry(now),
                };
                self.tables.save(table.key(), &record).await;
                let entries = Arc::new(record.entries);
                self.memory.insert(table, entries.clone()).await;
                entries
            }
            Ok(_) => {
                debug!(table = table.key(), "reference source returned an empty table");
                Arc::new(existing.map(|r| r.entries).unwrap_or_default())
            }
            Err(e) => {
                warn!(table = table.key(), "table refresh failed: {:#}", e);
                Arc::new(existing.map(|r| r.entries).unwrap_or_default())
            }
        }
    }
}

impl LookupTableRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_ship_record_is_unclassified() {
        let json = r#"{
            "shipTypeId": 621,
            "shipTypeName": "Caracal",
            "cachedAt": "2024-01-01T00:00:00Z",
            "expiresAt": "2999-01-01T00:00:00Z"
        }"#;
        let record: ReferenceCacheRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 621);
        assert_eq!(record.name, "Caracal");
        assert!(record.is_fresh(Utc::now()));
        assert!(!record.is_classified());
    }

    #[test]
    fn test_table_record_keys_roundtrip_as_strings() {
        let record = LookupTableRecord {
            entries: HashMap::from([(500001, "Caldari State".to_string())]),
            cached_at: Utc::now(),
            expires_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entries"]["500001"], "Caldari State");
    }
}
