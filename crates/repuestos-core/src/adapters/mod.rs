//! Source adapters.
//!
//! | Adapter | Sources | Upstream |
//! |---------|---------|----------|
//! | [`MarketplaceAdapter`] | marketplace, classifieds | MercadoLibre Chile catalog search |
//! | [`GenerativeAdapter`] | generative | Gemini `generateContent`, optionally grounded in web search |
//! | [`SyntheticAdapter`] | synthetic | Local, deterministic fallback listings |

pub mod generative;
pub mod marketplace;
pub mod synthetic;

pub use generative::GenerativeAdapter;
pub use marketplace::MarketplaceAdapter;
pub use synthetic::SyntheticAdapter;
