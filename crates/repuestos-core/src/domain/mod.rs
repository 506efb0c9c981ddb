//! # Domain Models
//!
//! Canonical types shared by every source adapter and by the HTTP surface.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Repuesto`] | One normalized listing |
//! | [`Store`] | Store family a listing belongs to |
//! | [`Category`] | Part category |
//! | [`SearchQuery`] | Validated piece/model query |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Listings are only built through [`crate::normalize`], so a [`Repuesto`]
//! always carries a non-negative price, an image URL and a timestamp.

mod listing;
mod query;
mod timestamp;

pub use listing::{Category, Repuesto, Store};
pub use query::{SearchQuery, MAX_FIELD_LEN};
pub use timestamp::UtcDateTime;
