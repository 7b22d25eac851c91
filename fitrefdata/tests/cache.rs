//! Reference cache behaviour against counting fake sources

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fitrefdata::{
    HttpReferenceSource, ReferenceCache, ReferenceSource, TypeDocument, UNKNOWN_CLASS,
    UNKNOWN_FACTION,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct FakeSource {
    type_calls: AtomicUsize,
    group_calls: AtomicUsize,
    faction_calls: AtomicUsize,
    offline: AtomicBool,
}

#[async_trait]
impl ReferenceSource for FakeSource {
    async fn fetch_type(&self, type_id: i64) -> Result<TypeDocument> {
        self.type_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("offline"));
        }
        Ok(match type_id {
            621 => TypeDocument {
                name: Some("Caracal".into()),
                group_id: Some(26),
                faction_id: None,
                race_id: Some(1),
            },
            587 => TypeDocument {
                name: Some("Rifter".into()),
                group_id: Some(25),
                faction_id: Some(500002),
                race_id: Some(2),
            },
            2488 => TypeDocument {
                name: Some("Warrior II".into()),
                ..Default::default()
            },
            42 => TypeDocument {
                name: Some("Odd Hull".into()),
                ..Default::default()
            },
            _ => TypeDocument::default(),
        })
    }

    async fn fetch_group_name(&self, group_id: i64) -> Result<Option<String>> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match group_id {
            25 => Some("Frigate".into()),
            26 => Some("Cruiser".into()),
            _ => None,
        })
    }

    async fn fetch_factions(&self) -> Result<HashMap<i64, String>> {
        self.faction_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HashMap::from([(500002, "Minmatar Republic".to_string())]))
    }

    async fn fetch_races(&self) -> Result<HashMap<i64, String>> {
        Ok(HashMap::from([(1, "Caldari".to_string())]))
    }
}

fn write_record(root: &Path, dir: &str, id: i64, record: serde_json::Value) {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.json", id)), record.to_string()).unwrap();
}

#[tokio::test]
async fn test_fresh_record_calls_upstream_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    assert_eq!(cache.resolve_type_name(2488).await, "Warrior II");
    assert_eq!(cache.resolve_type_name(2488).await, "Warrior II");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);

    // A second instance reads the same disk records.
    let again = ReferenceCache::new(source.clone(), dir.path());
    assert_eq!(again.resolve_type_name(2488).await, "Warrior II");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_type_falls_back_and_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    assert_eq!(cache.resolve_type_name(999).await, "999");
    assert!(!dir.path().join("types").join("999.json").exists());
    assert_eq!(cache.resolve_type_name(999).await, "999");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_record_served_when_refresh_fails() {
    let dir = TempDir::new().unwrap();
    let expired = json!({
        "id": 587,
        "name": "Rifter (old)",
        "groupId": 25,
        "cachedAt": "2020-01-01T00:00:00Z",
        "expiresAt": "2020-02-01T00:00:00Z"
    });
    write_record(dir.path(), "types", 587, expired.clone());

    let source = Arc::new(FakeSource::default());
    source.offline.store(true, Ordering::SeqCst);
    let cache = ReferenceCache::new(source.clone(), dir.path());

    assert_eq!(cache.resolve_type_name(587).await, "Rifter (old)");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);

    // Expiry is not extended: the file is untouched.
    let on_disk: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("types").join("587.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk, expired);
}

#[tokio::test]
async fn test_unclassified_ship_record_refetched_once() {
    let dir = TempDir::new().unwrap();
    write_record(
        dir.path(),
        "ship-types",
        621,
        json!({
            "shipTypeId": 621,
            "shipTypeName": "Caracal",
            "cachedAt": "2024-01-01T00:00:00Z",
            "expiresAt": "2999-01-01T00:00:00Z"
        }),
    );

    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    // The name alone is still fresh.
    assert_eq!(cache.resolve_ship_type_name(621).await, "Caracal");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 0);

    let meta = cache.resolve_grouping_metadata(621).await;
    assert_eq!(meta.ship_type_name, "Caracal");
    assert_eq!(meta.ship_class_name, "Cruiser");
    assert_eq!(meta.ship_faction_name, "Caldari");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);

    cache.resolve_grouping_metadata(621).await;
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.group_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hull_without_group_is_fetched_once() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    for _ in 0..3 {
        let meta = cache.resolve_grouping_metadata(42).await;
        assert_eq!(meta.ship_type_name, "Odd Hull");
        assert_eq!(meta.ship_class_name, UNKNOWN_CLASS);
        assert_eq!(meta.ship_faction_name, UNKNOWN_FACTION);
    }
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_legacy_record_without_group_keeps_expiry() {
    let dir = TempDir::new().unwrap();
    write_record(
        dir.path(),
        "ship-types",
        42,
        json!({
            "shipTypeId": 42,
            "shipTypeName": "Odd Hull",
            "cachedAt": "2024-01-01T00:00:00Z",
            "expiresAt": "2999-01-01T00:00:00Z"
        }),
    );

    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    for _ in 0..3 {
        cache.resolve_grouping_metadata(42).await;
    }
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 1);

    let on_disk: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("ship-types").join("42.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk["expiresAt"], "2999-01-01T00:00:00Z");
    assert_eq!(on_disk["cachedAt"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_faction_table_is_memoized() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    let meta = cache.resolve_grouping_metadata(587).await;
    assert_eq!(meta.ship_class_name, "Frigate");
    assert_eq!(meta.ship_faction_name, "Minmatar Republic");

    cache.resolve_grouping_metadata(587).await;
    assert_eq!(source.faction_calls.load(Ordering::SeqCst), 1);
    assert!(dir.path().join("tables").join("factions.json").exists());
}

#[tokio::test]
async fn test_unknown_ship_degrades() {
    let dir = TempDir::new().unwrap();
    let cache = ReferenceCache::new(Arc::new(FakeSource::default()), dir.path());

    let meta = cache.resolve_grouping_metadata(12345).await;
    assert_eq!(meta.ship_type_name, "12345");
    assert_eq!(meta.ship_class_name, UNKNOWN_CLASS);
    assert_eq!(meta.ship_faction_name, UNKNOWN_FACTION);
}

#[tokio::test]
async fn test_resolve_type_names_deduplicates() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::default());
    let cache = ReferenceCache::new(source.clone(), dir.path());

    let names = cache.resolve_type_names([2488, 2488, 621, 2488]).await;
    assert_eq!(names.len(), 2);
    assert_eq!(names[&2488], "Warrior II");
    assert_eq!(names[&621], "Caracal");
    assert_eq!(source.type_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ttl_is_never_below_thirty_days() {
    let dir = TempDir::new().unwrap();
    let cache = ReferenceCache::new(Arc::new(FakeSource::default()), dir.path()).with_ttl_days(3);
    assert_eq!(cache.ttl_days(), 30);
}

#[tokio::test]
async fn test_http_source_reads_everef_and_esi() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/types/621"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type_id": 621,
            "name": {"en": "Caracal", "de": "Caracal"},
            "group_id": 26,
            "race_id": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/26"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group_id": 26,
            "name": {"en": "Cruiser"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/esi/universe/races/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"race_id": 1, "name": "Caldari", "alliance_id": 500001, "description": ""}
        ])))
        .mount(&server)
        .await;

    let esi = fitesi::EsiClient::builder()
        .base_url(format!("{}/esi", server.uri()))
        .build()
        .unwrap();
    let source = HttpReferenceSource::new(server.uri(), esi).unwrap();

    let doc = source.fetch_type(621).await.unwrap();
    assert_eq!(doc.name.as_deref(), Some("Caracal"));
    assert_eq!(doc.group_id, Some(26));
    assert_eq!(doc.faction_id, None);
    assert_eq!(
        source.fetch_group_name(26).await.unwrap().as_deref(),
        Some("Cruiser")
    );
    assert_eq!(source.fetch_races().await.unwrap()[&1], "Caldari");
    assert!(source.fetch_type(1).await.is_err());
}
