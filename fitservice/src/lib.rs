//! # fitservice
//!
//! Orchestrates the fitting mirror: sync from the remote API into the
//! store, remote mutations, and the read views (grouped listing, detail,
//! EFT export and price estimate).
//!
//! ```rust,ignore
//! let service = FitService::new(store, Arc::new(esi), refdata, appraisals)
//!     .with_sync_interval(Duration::from_secs(300));
//!
//! service.sync(character_id, &token).await?;
//! let listing = service.list(character_id, "caracal").await?;
//! ```

pub mod error;
pub mod service;
pub mod throttle;
pub mod transform;

pub use error::{Result, ServiceError};
pub use service::{
    FitService, FittingBundle, FittingDetail, FittingListing, FittingPrice, MutationOutcome,
    SyncOutcome, EFT_UNAVAILABLE,
};
pub use throttle::{SyncThrottle, ThrottleDecision};
pub use transform::{ClassGroup, FactionGroup, GroupedFitting, ShipGroup};
