//! Canonical listing schema, raw records, and field coercion.

pub mod build;
pub mod coerce;
pub mod model;
pub mod raw;

pub use build::{build_listing, price_per_sqft, Rejection};
pub use model::{IdentityKey, Kind, Listing, COLUMNS};
pub use raw::RawRecord;
