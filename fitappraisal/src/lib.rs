//! # fitappraisal - market value of fittings
//!
//! Sends EFT text to an appraisal service and caches the total, keyed by a
//! hash of the normalized text and the pricing parameters.

pub mod cache;
pub mod client;
pub mod error;

pub use cache::{cache_key, normalize_text, AppraisalCache, AppraisalCacheEntry, PriceEstimate};
pub use client::{Appraisal, AppraisalClient, AppraisalParams, JaniceClient};
pub use error::{AppraisalError, Result};
