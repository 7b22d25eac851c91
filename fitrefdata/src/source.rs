//! Upstream reference-data sources

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fitesi::EsiClient;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default reference-data service
pub const DEFAULT_REFDATA_URL: &str = "https://ref-data.everef.net";

/// Type document as far as grouping is concerned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDocument {
    pub name: Option<String>,
    pub group_id: Option<i64>,
    pub faction_id: Option<i64>,
    pub race_id: Option<i64>,
}

/// Where reference data comes from when the disk cache cannot answer
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_type(&self, type_id: i64) -> Result<TypeDocument>;

    async fn fetch_group_name(&self, group_id: i64) -> Result<Option<String>>;

    async fn fetch_factions(&self) -> Result<HashMap<i64, String>>;

    async fn fetch_races(&self) -> Result<HashMap<i64, String>>;
}

#[derive(Debug, Deserialize)]
struct LocalizedName {
    #[serde(default)]
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawType {
    #[serde(default)]
    name: Option<LocalizedName>,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    faction_id: Option<i64>,
    #[serde(default)]
    race_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    name: Option<LocalizedName>,
}

fn english(name: Option<LocalizedName>) -> Option<String> {
    name.and_then(|n| n.en)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Types and groups from the reference-data service, factions and races
/// from ESI's universe endpoints
pub struct HttpReferenceSource {
    client: Client,
    base_url: String,
    esi: EsiClient,
}

impl HttpReferenceSource {
    pub fn new(base_url: impl Into<String>, esi: EsiClient) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            esi,
        })
    }

    pub fn from_config(esi: EsiClient) -> Result<Self> {
        Self::new(fitconfig::get_config().get_refdata_base_url(), esi)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned {}", url, status));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReferenceSource for HttpReferenceSource {
    async fn fetch_type(&self, type_id: i64) -> Result<TypeDocument> {
        let raw: RawType = self.get_json(&format!("/types/{}", type_id)).await?;
        Ok(TypeDocument {
            name: english(raw.name),
            group_id: raw.group_id,
            faction_id: raw.faction_id,
            race_id: raw.race_id,
        })
    }

    async fn fetch_group_name(&self, group_id: i64) -> Result<Option<String>> {
        let raw: RawGroup = self.get_json(&format!("/groups/{}", group_id)).await?;
        Ok(english(raw.name))
    }

    async fn fetch_factions(&self) -> Result<HashMap<i64, String>> {
        let factions = self.esi.list_factions().await?;
        Ok(factions.into_iter().map(|f| (f.faction_id, f.name)).collect())
    }

    async fn fetch_races(&self) -> Result<HashMap<i64, String>> {
        let races = self.esi.list_races().await?;
        Ok(races.into_iter().map(|r| (r.race_id, r.name)).collect())
    }
}
