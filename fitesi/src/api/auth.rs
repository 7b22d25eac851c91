//! EVE SSO token refresh
//!
//! Only the refresh grant is supported; the interactive login flow belongs
//! to whatever front end obtained the refresh token.

use super::EsiApi;
use crate::error::{EsiError, Result};
use crate::models::TokenResponse;
use tracing::{debug, info};

impl EsiApi {
    /// Exchanges a refresh token for a fresh access token
    ///
    /// # Errors
    ///
    /// * `EsiError::Configuration` - client id or secret missing
    /// * `EsiError::Unauthorized` - refresh token revoked or expired
    pub async fn refresh_access_token(
        &self,
        token_url: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let (client_id, client_secret) = match (client_id, client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(EsiError::Configuration(
                    "esi.client_id and esi.client_secret are required to refresh tokens".into(),
                ))
            }
        };

        debug!("Refreshing SSO access token via {}", token_url);
        let request = self
            .http()
            .post(token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);
        let response = self.send(request).await?;
        let token: TokenResponse = self.handle_response(response).await?;
        info!("SSO access token refreshed, expires in {}s", token.expires_in);
        Ok(token)
    }
}
