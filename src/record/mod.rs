//! Record module for listing data
//!
//! This module defines the typed records that flow through a run.
//!
//! # Components
//!
//! - `ItemReference`: a detail-page locator plus its stable identifier
//! - `RawFields`: raw text extracted by a site adapter from one page
//! - `NormalizedRecord`: typed feature values ready for storage
//! - `StoredRecord`: a persisted listing with its bookkeeping timestamps

mod feature;
mod listing;

// Re-export main types
pub use feature::{Category, Feature, FeatureKind, FieldValue};
pub use listing::{
    FieldChange, ItemReference, ListingFeatures, NormalizedRecord, RawFields, StoredRecord,
};
