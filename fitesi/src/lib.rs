//! # fitesi - EVE Swagger Interface client
//!
//! Thin client for the parts of ESI the fitting mirror needs:
//!
//! - character fittings (list, create, delete)
//! - public character, corporation and alliance records
//! - static faction and race listings
//! - SSO refresh-token grant
//!
//! ## Architecture
//!
//! - `EsiClient` : high-level client, implements [`FittingsApi`]
//! - `api` : low-level REST access with bounded 429 retries
//! - `models` : wire structures, kept in ESI's snake_case shape
//! - `error` : error type
//!
//! ```rust,no_run
//! use fitesi::{EsiClient, FittingsApi};
//!
//! # async fn run() -> fitesi::Result<()> {
//! let client = EsiClient::from_config()?;
//! let fittings = client.list_fittings(90000001, "access-token").await?;
//! println!("{} fittings", fittings.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod models;

pub use client::{EsiClient, EsiClientBuilder, FittingsApi};
pub use error::{EsiError, Result};
pub use models::{
    FactionInfo, Fitting, FittingItem, ItemFlag, PlayerProfile, RaceInfo, RateInfo, TokenResponse,
};
