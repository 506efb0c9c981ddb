//! # Repuestos Core
//!
//! Search engine behind the repuestos price comparison service for Chilean
//! auto parts.
//!
//! ## Overview
//!
//! A query (`piece` + vehicle `model`) is fanned out to every live source,
//! each wrapped with retry and a circuit breaker. Listings are normalized
//! into one [`Repuesto`] shape, concatenated in source priority order, and
//! cached in two tiers. When no live source yields anything, deterministic
//! synthetic listings fill in.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Marketplace, generative and synthetic sources |
//! | [`aggregate`] | Concurrent fan-out and merge, source registry builder |
//! | [`cache`] | Two-tier result cache |
//! | [`circuit_breaker`] | Per-source circuit breaker |
//! | [`cooldown`] | Per-client minimum interval between live searches |
//! | [`data_source`] | Adapter trait and source errors |
//! | [`domain`] | Listing, store, category, query, timestamp |
//! | [`history`] | Recent-search listing with relative ages |
//! | [`http_client`] | HTTP transport seam |
//! | [`normalize`] | Raw upstream items to listings |
//! | [`provider_policy`] | Per-source timeouts, limits and retry policy |
//! | [`resilience`] | Retry + breaker wrapper around one source |
//! | [`retry`] | Retry policy with strictly increasing backoff |
//! | [`service`] | Cache, cooldown and aggregation orchestration |
//! | [`source`] | Source identifiers |
//! | [`throttling`] | Local quota guard for metered upstreams |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  SearchService  │────▶│ SearchCache      │──▶ repuestos-store
//! └────────┬────────┘     └──────────────────┘
//!          │              ┌──────────────────┐
//!          ├─────────────▶│ CooldownRegistry │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Aggregator    │────▶│ ResilientSource  │ (retry + breaker)
//! └─────────────────┘     └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐     ┌─────────────┐
//!                         │ PartSource       │────▶│ HttpClient  │
//!                         └──────────────────┘     └─────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use repuestos_core::{SourceError, SourceErrorKind};
//!
//! fn should_wait(error: &SourceError) -> bool {
//!     matches!(
//!         error.kind(),
//!         SourceErrorKind::RateLimited | SourceErrorKind::Unavailable
//!     )
//! }
//! ```
//!
//! API keys are read from the environment only and never logged.

pub mod adapters;
pub mod aggregate;
pub mod cache;
pub mod circuit_breaker;
pub mod cooldown;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod history;
pub mod http_client;
pub mod normalize;
pub mod provider_policy;
pub mod resilience;
pub mod retry;
pub mod service;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{GenerativeAdapter, MarketplaceAdapter, SyntheticAdapter};

// Aggregation
pub use aggregate::{Aggregation, Aggregator, SourceRegistryBuilder};

// Caching
pub use cache::{cache_key, CacheConfig, CacheEntry, SearchCache};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Cooldown
pub use cooldown::{retry_after_secs, ClientKey, CooldownRegistry, DEFAULT_COOLDOWN};

// Adapter trait and errors
pub use data_source::{PartSource, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{Category, Repuesto, SearchQuery, Store, UtcDateTime};

// Error types
pub use error::{CoreError, ValidationError};

pub use history::HistoryEntry;

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpFuture, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient,
};

pub use normalize::{normalize, RawItem, RawPrice};

pub use provider_policy::{QuotaPolicy, SourcePolicy};

// Resilience
pub use resilience::{ResilientSource, SourceReport, SourceStatus};
pub use retry::{Backoff, RetryOutcome, RetryPolicy, MAX_TOTAL_WAIT};

// Search orchestration
pub use service::{SearchRejection, SearchReport, SearchService};

pub use source::SourceId;

pub use throttling::QuotaGuard;
