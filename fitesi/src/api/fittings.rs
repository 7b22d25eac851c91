//! Character fitting endpoints

use super::EsiApi;
use crate::error::Result;
use crate::models::{CreatedFitting, Fitting, NewFitting};
use tracing::{debug, info};

impl EsiApi {
    /// `GET /characters/{id}/fittings/`
    pub async fn list_fittings(&self, character_id: i64, token: &str) -> Result<Vec<Fitting>> {
        let fittings: Vec<Fitting> = self
            .get(&format!("/characters/{}/fittings/", character_id), Some(token))
            .await?;
        debug!("ESI returned {} fittings for {}", fittings.len(), character_id);
        Ok(fittings)
    }

    /// `POST /characters/{id}/fittings/`, returns the id ESI assigned
    pub async fn create_fitting(
        &self,
        character_id: i64,
        token: &str,
        fitting: &Fitting,
    ) -> Result<i64> {
        let url = self.url(&format!("/characters/{}/fittings/", character_id));
        debug!("POST {}", url);
        let request = self
            .http()
            .post(&url)
            .bearer_auth(token)
            .json(&NewFitting::from(fitting));
        let response = self.send(request).await?;
        let created: CreatedFitting = self.handle_response(response).await?;
        info!(
            "Created fitting '{}' for {} as {}",
            fitting.name, character_id, created.fitting_id
        );
        Ok(created.fitting_id)
    }

    /// `DELETE /characters/{id}/fittings/{fitting_id}/`
    pub async fn delete_fitting(&self, character_id: i64, token: &str, fitting_id: i64) -> Result<()> {
        let url = self.url(&format!(
            "/characters/{}/fittings/{}/",
            character_id, fitting_id
        ));
        debug!("DELETE {}", url);
        let request = self.http().delete(&url).bearer_auth(token);
        let response = self.send(request).await?;
        Self::check_status(response).await?;
        info!("Deleted fitting {} for {}", fitting_id, character_id);
        Ok(())
    }
}
