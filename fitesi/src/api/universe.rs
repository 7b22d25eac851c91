//! Static universe listings used by the reference-data layer

use super::EsiApi;
use crate::error::Result;
use crate::models::{FactionInfo, RaceInfo};

impl EsiApi {
    /// `GET /universe/factions/`
    pub async fn list_factions(&self) -> Result<Vec<FactionInfo>> {
        self.get("/universe/factions/", None).await
    }

    /// `GET /universe/races/`
    pub async fn list_races(&self) -> Result<Vec<RaceInfo>> {
        self.get("/universe/races/", None).await
    }
}
