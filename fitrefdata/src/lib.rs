//! # fitrefdata - EVE reference data
//!
//! Resolves numeric type ids to display names and ship hulls to their class
//! and faction. Every answer comes from a disk cache first; upstream lookups
//! are best-effort and never fail the caller: unknown ids degrade to their
//! numeric text, unknown classifications to `"Unknown Class"` and
//! `"Unknown Faction"`.

pub mod cache;
pub mod source;

pub use cache::{
    LookupTableRecord, ReferenceCache, ReferenceCacheRecord, ShipGroupingMetadata, UNKNOWN_CLASS,
    UNKNOWN_FACTION,
};
pub use source::{HttpReferenceSource, ReferenceSource, TypeDocument};
