//! Public character, corporation and alliance records

use super::EsiApi;
use crate::error::Result;
use crate::models::{AlliancePublicInfo, CharacterPublicInfo, CorporationPublicInfo};

impl EsiApi {
    /// The token is optional: the record is public, but ESI accepts it
    pub async fn get_character(
        &self,
        character_id: i64,
        token: Option<&str>,
    ) -> Result<CharacterPublicInfo> {
        self.get(&format!("/characters/{}/", character_id), token)
            .await
    }

    pub async fn get_corporation(&self, corporation_id: i64) -> Result<CorporationPublicInfo> {
        self.get(&format!("/corporations/{}/", corporation_id), None)
            .await
    }

    pub async fn get_alliance(&self, alliance_id: i64) -> Result<AlliancePublicInfo> {
        self.get(&format!("/alliances/{}/", alliance_id), None).await
    }
}
