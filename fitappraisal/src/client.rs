//! Appraisal service client (Janice-compatible REST API)

use crate::error::{AppraisalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Default appraisal service
pub const DEFAULT_BASE_URL: &str = "https://janice.e-351.com";

/// Market, pricing mode and price variant sent with every appraisal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppraisalParams {
    /// Market id (2 = Jita 4-4)
    pub market: u64,
    /// `buy`, `split` or `sell`
    pub pricing: String,
    /// `immediate` or a percentile variant such as `top5percent`
    pub variant: String,
}

impl Default for AppraisalParams {
    fn default() -> Self {
        Self {
            market: 2,
            pricing: "split".to_string(),
            variant: "immediate".to_string(),
        }
    }
}

impl AppraisalParams {
    pub fn from_config() -> Self {
        let config = fitconfig::get_config();
        Self {
            market: config.get_appraisal_market(),
            pricing: config.get_appraisal_pricing(),
            variant: config.get_appraisal_variant(),
        }
    }

    /// Name of the total field matching the pricing mode
    pub fn total_field(&self) -> &'static str {
        match self.pricing.to_lowercase().as_str() {
            "buy" => "totalBuyPrice",
            "sell" => "totalSellPrice",
            _ => "totalSplitPrice",
        }
    }
}

/// Parsed appraisal
#[derive(Debug, Clone, PartialEq)]
pub struct Appraisal {
    pub total_value: f64,
    pub appraisal_url: Option<String>,
}

#[async_trait]
pub trait AppraisalClient: Send + Sync {
    async fn appraise(&self, text: &str, params: &AppraisalParams) -> Result<Appraisal>;
}

/// HTTP client for the appraisal service
pub struct JaniceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JaniceClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config() -> Result<Self> {
        let config = fitconfig::get_config();
        Self::new(config.get_appraisal_base_url(), config.get_appraisal_api_key())
    }

    /// Public link of a stored appraisal
    pub fn appraisal_url(&self, code: &str) -> String {
        format!("{}/a/{}", self.base_url, code)
    }
}

/// Extracts the total from `effectivePrices` or `immediatePrices`
pub fn extract_total(body: &Value, field: &str) -> Option<f64> {
    ["effectivePrices", "immediatePrices"]
        .iter()
        .filter_map(|section| body.get(section).and_then(|prices| prices.get(field)))
        .find_map(Value::as_f64)
        .filter(|total| total.is_finite())
}

#[async_trait]
impl AppraisalClient for JaniceClient {
    async fn appraise(&self, text: &str, params: &AppraisalParams) -> Result<Appraisal> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppraisalError::Configuration("appraisal.api_key is not set".to_string())
        })?;

        let url = format!("{}/api/rest/v2/appraisal", self.base_url);
        let market = params.market.to_string();
        debug!("POST {} (market {}, {})", url, market, params.pricing);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("market", market.as_str()),
                ("designation", "appraisal"),
                ("pricing", params.pricing.as_str()),
                ("pricingVariant", params.variant.as_str()),
                ("persist", "true"),
                ("compactize", "true"),
                ("pricePercentage", "1"),
            ])
            .header("X-ApiKey", api_key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(text.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Appraisal error ({}): {}", status, body);
            return Err(AppraisalError::from_status_code(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppraisalError::UpstreamInvalid(e.to_string()))?;

        let field = params.total_field();
        let total_value = extract_total(&body, field).ok_or_else(|| {
            AppraisalError::UpstreamInvalid(format!("no numeric {} in response", field))
        })?;

        let appraisal_url = body
            .get("code")
            .and_then(Value::as_str)
            .filter(|code| !code.is_empty())
            .map(|code| self.appraisal_url(code));

        Ok(Appraisal {
            total_value,
            appraisal_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_field_follows_pricing() {
        let mut params = AppraisalParams::default();
        assert_eq!(params.total_field(), "totalSplitPrice");
        params.pricing = "Buy".into();
        assert_eq!(params.total_field(), "totalBuyPrice");
        params.pricing = "sell".into();
        assert_eq!(params.total_field(), "totalSellPrice");
    }

    #[test]
    fn test_extract_total_prefers_effective_prices() {
        let body = json!({
            "effectivePrices": {"totalSplitPrice": 12.5},
            "immediatePrices": {"totalSplitPrice": 99.0}
        });
        assert_eq!(extract_total(&body, "totalSplitPrice"), Some(12.5));

        let body = json!({
            "effectivePrices": {"totalSplitPrice": "n/a"},
            "immediatePrices": {"totalSplitPrice": 7}
        });
        assert_eq!(extract_total(&body, "totalSplitPrice"), Some(7.0));

        assert_eq!(extract_total(&json!({"code": "x"}), "totalSplitPrice"), None);
    }
}
