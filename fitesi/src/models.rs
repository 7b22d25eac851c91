//! Data structures exchanged with ESI

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of an item inside a fitting
///
/// ESI sends named flags (`"HiSlot3"`, `"DroneBay"`, `"Cargo"`); legacy
/// payloads may carry the numeric inventory flag instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemFlag {
    Named(String),
    Numeric(i64),
}

impl ItemFlag {
    /// Returns the flag name, `None` for numeric flags
    pub fn as_named(&self) -> Option<&str> {
        match self {
            ItemFlag::Named(name) => Some(name),
            ItemFlag::Numeric(_) => None,
        }
    }
}

impl fmt::Display for ItemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFlag::Named(name) => write!(f, "{}", name),
            ItemFlag::Numeric(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ItemFlag {
    fn from(value: &str) -> Self {
        ItemFlag::Named(value.to_string())
    }
}

/// One module, charge, drone or cargo stack in a fitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittingItem {
    pub flag: ItemFlag,
    pub quantity: u32,
    pub type_id: i64,
}

/// A saved ship fitting, in the exact shape ESI returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fitting {
    #[serde(default)]
    pub description: String,
    pub fitting_id: i64,
    #[serde(default)]
    pub items: Vec<FittingItem>,
    pub name: String,
    pub ship_type_id: i64,
}

/// Body of `POST /characters/{id}/fittings/`
#[derive(Debug, Serialize)]
pub(crate) struct NewFitting<'a> {
    pub description: &'a str,
    pub items: &'a [FittingItem],
    pub name: &'a str,
    pub ship_type_id: i64,
}

impl<'a> From<&'a Fitting> for NewFitting<'a> {
    fn from(fitting: &'a Fitting) -> Self {
        Self {
            description: &fitting.description,
            items: &fitting.items,
            name: &fitting.name,
            ship_type_id: fitting.ship_type_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedFitting {
    pub fitting_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterPublicInfo {
    pub name: String,
    pub corporation_id: i64,
    #[serde(default)]
    pub alliance_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorporationPublicInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlliancePublicInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionInfo {
    pub faction_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceInfo {
    pub race_id: i64,
    pub name: String,
}

/// SSO token grant response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Public identity of a character, with name fallbacks already applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub character_id: i64,
    pub character_name: String,
    pub corporation_name: String,
    pub alliance_name: Option<String>,
    pub portrait_url: String,
}

/// `x-ratelimit-*` headers, logged when ESI throttles us
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateInfo {
    pub group: Option<String>,
    pub limit: Option<String>,
    pub remaining: Option<String>,
    pub used: Option<String>,
}

impl RateInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            group: get("x-ratelimit-group"),
            limit: get("x-ratelimit-limit"),
            remaining: get("x-ratelimit-remaining"),
            used: get("x-ratelimit-used"),
        }
    }
}
