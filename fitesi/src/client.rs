//! High-level ESI client

use crate::api::{EsiApi, DEFAULT_BASE_URL};
use crate::error::{EsiError, Result};
use crate::models::{FactionInfo, Fitting, PlayerProfile, RaceInfo, TokenResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after an HTTP 429
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("fitmirror/", env!("CARGO_PKG_VERSION"));

const PORTRAIT_URL: &str = "https://images.evetech.net/characters";

/// Remote fitting operations needed by the sync engine
///
/// Implemented by [`EsiClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait FittingsApi: Send + Sync {
    async fn list_fittings(&self, character_id: i64, token: &str) -> Result<Vec<Fitting>>;

    /// Uploads a fitting and returns the id the remote side assigned
    async fn create_fitting(&self, character_id: i64, token: &str, fitting: &Fitting)
        -> Result<i64>;

    async fn delete_fitting(&self, character_id: i64, token: &str, fitting_id: i64) -> Result<()>;

    async fn load_profile(&self, character_id: i64, token: &str) -> Result<PlayerProfile>;
}

/// ESI client bound to a base URL and credentials
#[derive(Debug, Clone)]
pub struct EsiClient {
    api: EsiApi,
    sso_token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl EsiClient {
    pub fn builder() -> EsiClientBuilder {
        EsiClientBuilder::default()
    }

    /// Builds a client from the global configuration
    pub fn from_config() -> Result<Self> {
        let config = fitconfig::get_config();
        Self::builder()
            .base_url(config.get_esi_base_url())
            .sso_token_url(config.get_esi_sso_token_url())
            .user_agent(config.get_esi_user_agent())
            .max_retries(config.get_esi_max_retries() as u32)
            .timeout(Duration::from_secs(config.get_esi_timeout_seconds()))
            .client_credentials(config.get_esi_client_id(), config.get_esi_client_secret())
            .build()
    }

    /// Access to the low-level API
    pub fn api(&self) -> &EsiApi {
        &self.api
    }

    /// Exchanges a refresh token for a new access token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.api
            .refresh_access_token(
                &self.sso_token_url,
                self.client_id.as_deref(),
                self.client_secret.as_deref(),
                refresh_token,
            )
            .await
    }

    pub async fn list_factions(&self) -> Result<Vec<FactionInfo>> {
        self.api.list_factions().await
    }

    pub async fn list_races(&self) -> Result<Vec<RaceInfo>> {
        self.api.list_races().await
    }
}

#[async_trait]
impl FittingsApi for EsiClient {
    async fn list_fittings(&self, character_id: i64, token: &str) -> Result<Vec<Fitting>> {
        self.api.list_fittings(character_id, token).await
    }

    async fn create_fitting(
        &self,
        character_id: i64,
        token: &str,
        fitting: &Fitting,
    ) -> Result<i64> {
        self.api.create_fitting(character_id, token, fitting).await
    }

    async fn delete_fitting(&self, character_id: i64, token: &str, fitting_id: i64) -> Result<()> {
        self.api.delete_fitting(character_id, token, fitting_id).await
    }

    /// Character name is required; corporation and alliance names degrade to
    /// `"Corporation <id>"` / `"Alliance <id>"` when their lookup fails.
    async fn load_profile(&self, character_id: i64, token: &str) -> Result<PlayerProfile> {
        let character = self.api.get_character(character_id, Some(token)).await?;
        debug!(
            "Character {} belongs to corporation {}",
            character_id, character.corporation_id
        );

        let corporation = self.api.get_corporation(character.corporation_id);
        let alliance = async {
            match character.alliance_id {
                Some(id) => Some((id, self.api.get_alliance(id).await)),
                None => None,
            }
        };
        let (corporation, alliance) = tokio::join!(corporation, alliance);

        let corporation_name = match corporation {
            Ok(corp) => corp.name,
            Err(e) => {
                warn!(
                    "Corporation lookup failed for {}: {}",
                    character.corporation_id, e
                );
                format!("Corporation {}", character.corporation_id)
            }
        };

        let alliance_name = alliance.map(|(id, result)| match result {
            Ok(alliance) => alliance.name,
            Err(e) => {
                warn!("Alliance lookup failed for {}: {}", id, e);
                format!("Alliance {}", id)
            }
        });

        Ok(PlayerProfile {
            character_id,
            character_name: character.name,
            corporation_name,
            alliance_name,
            portrait_url: format!("{}/{}/portrait?size=128", PORTRAIT_URL, character_id),
        })
    }
}

/// Builder for [`EsiClient`]
#[derive(Debug, Clone)]
pub struct EsiClientBuilder {
    client: Option<Client>,
    base_url: String,
    sso_token_url: String,
    user_agent: String,
    timeout: Duration,
    max_retries: u32,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl Default for EsiClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            sso_token_url: "https://login.eveonline.com/v2/oauth/token".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            client_id: None,
            client_secret: None,
        }
    }
}

impl EsiClientBuilder {
    /// Use a custom reqwest client (timeout and user agent are then ignored)
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn sso_token_url(mut self, url: impl Into<String>) -> Self {
        self.sso_token_url = url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of retries after an HTTP 429 (0 disables retrying)
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn client_credentials(
        mut self,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret;
        self
    }

    pub fn build(self) -> Result<EsiClient> {
        if self.base_url.trim().is_empty() {
            return Err(EsiError::Configuration("ESI base URL is empty".into()));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(EsiClient {
            api: EsiApi::new(client, self.base_url, self.max_retries),
            sso_token_url: self.sso_token_url,
            client_id: self.client_id,
            client_secret: self.client_secret,
        })
    }
}
