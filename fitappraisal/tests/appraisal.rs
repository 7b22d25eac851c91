//! Appraisal client and cache against a mock appraisal service

use fitappraisal::{AppraisalCache, AppraisalError, AppraisalParams, JaniceClient};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EFT: &str = "[Rifter, Brawler]\nDamage Control II\n\nWarrior II x5\n";

fn cache_for(server: &MockServer, dir: &TempDir, api_key: Option<&str>) -> AppraisalCache {
    let client = JaniceClient::new(server.uri(), api_key.map(str::to_string)).unwrap();
    AppraisalCache::new(Arc::new(client), dir.path(), AppraisalParams::default())
}

#[tokio::test]
async fn test_same_content_shares_one_appraisal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest/v2/appraisal"))
        .and(query_param("market", "2"))
        .and(query_param("pricing", "split"))
        .and(query_param("pricingVariant", "immediate"))
        .and(header("X-ApiKey", "secret"))
        .and(body_string_contains("Warrior II x5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "abc123",
            "effectivePrices": {"totalSplitPrice": 1500000.0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = cache_for(&server, &dir, Some("secret"));

    let first = cache.estimate(EFT).await.unwrap();
    // Same fitting under another id, with Windows line endings.
    let second = cache.estimate(&EFT.replace('\n', "\r\n")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total_value, 1_500_000.0);
    assert_eq!(
        first.appraisal_url.as_deref(),
        Some(format!("{}/a/abc123", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_quantity_change_is_a_miss() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest/v2/appraisal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "immediatePrices": {"totalSplitPrice": 10}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = cache_for(&server, &dir, Some("secret"));

    cache.estimate(EFT).await.unwrap();
    let changed = cache
        .estimate(&EFT.replace("x5", "x4"))
        .await
        .unwrap();
    assert_eq!(changed.total_value, 10.0);
    assert!(changed.appraisal_url.is_none());
}

#[tokio::test]
async fn test_invalid_response_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest/v2/appraisal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "zzz",
            "effectivePrices": {"totalSplitPrice": null}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = cache_for(&server, &dir, Some("secret"));

    for _ in 0..2 {
        let err = cache.estimate(EFT).await.unwrap_err();
        assert!(matches!(err, AppraisalError::UpstreamInvalid(_)));
    }
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn test_missing_api_key_fails_at_call_time() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache = cache_for(&server, &dir, None);

    let err = cache.estimate(EFT).await.unwrap_err();
    assert!(matches!(err, AppraisalError::Configuration(_)));
}

#[tokio::test]
async fn test_service_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rest/v2/appraisal"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = cache_for(&server, &dir, Some("secret"));

    let err = cache.estimate(EFT).await.unwrap_err();
    assert!(matches!(err, AppraisalError::ApiError { code: 503, .. }));
}
