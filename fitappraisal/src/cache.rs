//! Content-addressed appraisal cache
//!
//! Two fittings with the same normalized EFT text and pricing parameters
//! share one cache entry, whatever their ids. Any change to the content
//! (an extra module, a different quantity) is a different key.

use crate::client::{AppraisalClient, AppraisalParams};
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fitstore::JsonFileCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Default lifetime of a cached appraisal
pub const DEFAULT_TTL_DAYS: u64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppraisalCacheEntry {
    pub total_value: f64,
    #[serde(default)]
    pub appraisal_url: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Market value of a fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEstimate {
    pub total_value: f64,
    pub appraisal_url: Option<String>,
}

/// CRLF to LF, trailing whitespace removed from every line and the end
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// SHA-256 hex of the pricing parameters and the normalized text
pub fn cache_key(params: &AppraisalParams, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.market.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(params.pricing.to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(params.variant.to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}

pub struct AppraisalCache {
    client: Arc<dyn AppraisalClient>,
    store: JsonFileCache,
    params: AppraisalParams,
    ttl_days: u64,
}

impl AppraisalCache {
    pub fn new<P: AsRef<Path>>(
        client: Arc<dyn AppraisalClient>,
        cache_dir: P,
        params: AppraisalParams,
    ) -> Self {
        Self {
            client,
            store: JsonFileCache::new(cache_dir),
            params,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    /// Cache under `<storage dir>/_cache/appraisals` with the configured
    /// parameters
    pub fn from_config(client: Arc<dyn AppraisalClient>) -> anyhow::Result<Self> {
        let config = fitconfig::get_config();
        let dir = Path::new(&config.get_storage_dir()?)
            .join("_cache")
            .join("appraisals");
        Ok(Self::new(client, dir, AppraisalParams::from_config())
            .with_ttl_days(config.get_appraisal_ttl_days()))
    }

    pub fn with_ttl_days(mut self, days: u64) -> Self {
        self.ttl_days = days;
        self
    }

    pub fn params(&self) -> &AppraisalParams {
        &self.params
    }

    /// Appraises an EFT text, calling the service only on a cache miss
    ///
    /// Invalid upstream answers are returned as errors and never cached.
    pub async fn estimate(&self, eft: &str) -> Result<PriceEstimate> {
        let key = cache_key(&self.params, eft);
        let now = Utc::now();

        if let Some(entry) = self.store.load::<AppraisalCacheEntry>(&key).await {
            if now < entry.expires_at {
                debug!(key = %key, "appraisal cache hit");
                return Ok(PriceEstimate {
                    total_value: entry.total_value,
                    appraisal_url: entry.appraisal_url,
                });
            }
        }

        let appraisal = self
            .client
            .appraise(&normalize_text(eft), &self.params)
            .await?;
        info!(
            key = %key,
            total = appraisal.total_value,
            "fitting appraised"
        );

        let entry = AppraisalCacheEntry {
            total_value: appraisal.total_value,
            appraisal_url: appraisal.appraisal_url.clone(),
            cached_at: now,
            expires_at: now + ChronoDuration::days(self.ttl_days as i64),
        };
        self.store.save(&key, &entry).await;

        Ok(PriceEstimate {
            total_value: appraisal.total_value,
            appraisal_url: appraisal.appraisal_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_ignores_line_endings_and_trailing_space() {
        let unix = "[Rifter, A]\nDamage Control II\n";
        let windows = "[Rifter, A]  \r\nDamage Control II\r\n\r\n";
        assert_eq!(normalize_text(unix), normalize_text(windows));
        assert_eq!(
            cache_key(&AppraisalParams::default(), unix),
            cache_key(&AppraisalParams::default(), windows)
        );
    }

    #[test]
    fn test_key_depends_on_params_and_quantity() {
        let params = AppraisalParams::default();
        let base = cache_key(&params, "[Rifter, A]\nWarrior II x5");
        assert_ne!(base, cache_key(&params, "[Rifter, A]\nWarrior II x4"));

        let sell = AppraisalParams {
            pricing: "sell".into(),
            ..AppraisalParams::default()
        };
        assert_ne!(base, cache_key(&sell, "[Rifter, A]\nWarrior II x5"));
        assert_eq!(base.len(), 64);
    }
}
