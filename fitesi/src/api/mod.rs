//! Low-level access to the ESI REST API
//!
//! Every request goes through [`EsiApi::send`], which retries a bounded
//! number of times on HTTP 429 after honouring the `Retry-After` header.

pub mod auth;
pub mod fittings;
pub mod profile;
pub mod universe;

use crate::error::{EsiError, Result};
use crate::models::RateInfo;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Default ESI base URL
pub const DEFAULT_BASE_URL: &str = "https://esi.evetech.net/latest";

/// Low-level ESI client
#[derive(Debug, Clone)]
pub struct EsiApi {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl EsiApi {
    pub fn new(client: Client, base_url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// GET a JSON document, optionally authenticated
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<T> {
        let url = self.url(endpoint);
        debug!("GET {}", url);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = self.send(request).await?;
        self.handle_response(response).await
    }

    /// Sends a request, retrying on 429 up to `max_retries` times
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            let current = request
                .try_clone()
                .ok_or_else(|| EsiError::Configuration("request body is not cloneable".into()))?;
            let response = current.send().await?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let rate = RateInfo::from_headers(response.headers());
            let retry_after = retry_after_seconds(&response);
            warn!(
                "ESI rate limited {} (group={:?} limit={:?} remaining={:?} used={:?}, retry-after={:?})",
                response.url(),
                rate.group,
                rate.limit,
                rate.remaining,
                rate.used,
                retry_after
            );

            if attempt >= self.max_retries {
                return Err(EsiError::RateLimited {
                    retry_after_seconds: retry_after,
                });
            }
            attempt += 1;

            let wait = retry_after.unwrap_or(1).max(1);
            debug!("Retrying in {}s (attempt {}/{})", wait, attempt, self.max_retries);
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    /// Fails on non-2xx statuses, otherwise decodes the JSON body
    pub(crate) async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse ESI response: {}", e);
            EsiError::JsonParse(e)
        })
    }

    pub(crate) async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        debug!("Response status: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let retry_after = retry_after_seconds(&response);
        let body = response.text().await.unwrap_or_default();
        warn!("ESI error ({}): {}", code, body);

        if code == 429 {
            return Err(EsiError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }
        Err(EsiError::from_status_code(code, esi_error_message(&body)))
    }
}

/// Extracts `{"error": "..."}` from an ESI error body, or returns the raw text
fn esi_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn retry_after_seconds(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = EsiApi::new(Client::new(), "http://localhost:1234/latest/", 1);
        assert_eq!(api.base_url(), "http://localhost:1234/latest");
        assert_eq!(
            api.url("/characters/1/fittings/"),
            "http://localhost:1234/latest/characters/1/fittings/"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(esi_error_message(r#"{"error":"token is expired"}"#), "token is expired");
        assert_eq!(esi_error_message("plain"), "plain");
    }
}
