//! Search service: cache lookup, cooldown, live aggregation, and the
//! decision between success, synthetic fallback, and rejection.
//!
//! | Live outcome | Response | Cooldown |
//! |--------------|----------|----------|
//! | At least one listing | success | kept |
//! | No listings, a source saturated | [`SearchRejection::Saturated`] | kept |
//! | No listings, a source failed fatally | [`SearchRejection::Upstream`] | released |
//! | No listings otherwise | synthetic fallback | released |
//!
//! Cache hits skip the cooldown entirely.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::aggregate::Aggregator;
use crate::cache::SearchCache;
use crate::cooldown::{ClientKey, CooldownRegistry};
use crate::normalize::GOOGLE_SHOPPING_ID;
use crate::{Repuesto, SearchQuery, SourceErrorKind, SourceId};

pub const FALLBACK_MESSAGE: &str =
    "Live sources returned no listings; showing approximate prices.";
pub const EMPTY_MESSAGE: &str = "No listings found; try the web search link.";

/// Successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub query: SearchQuery,
    pub results: Vec<Repuesto>,
    pub stores: BTreeMap<SourceId, usize>,
    pub fallback: bool,
    pub cached: bool,
    pub message: Option<String>,
}

impl SearchReport {
    pub fn count(&self) -> usize {
        self.results.len()
    }
}

/// Typed reasons a search produced no response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchRejection {
    #[error("a live search was made recently; retry in {}s", .retry_after.as_secs())]
    CooldownActive { retry_after: Duration },

    #[error("upstream saturated ({kind:?}); retry in {}s", .retry_after.as_secs())]
    Saturated {
        kind: SourceErrorKind,
        retry_after: Duration,
    },

    /// Detail is for logs only.
    #[error("upstream failure: {detail}")]
    Upstream { detail: String },
}

/// Orchestrates one search request.
#[derive(Clone)]
pub struct SearchService {
    aggregator: Arc<Aggregator>,
    cache: SearchCache,
    cooldown: Arc<CooldownRegistry>,
}

impl SearchService {
    pub fn new(aggregator: Aggregator, cache: SearchCache, cooldown: CooldownRegistry) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            cache,
            cooldown: Arc::new(cooldown),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub const fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn cooldown(&self) -> &CooldownRegistry {
        &self.cooldown
    }

    pub async fn search(
        &self,
        client: &ClientKey,
        query: SearchQuery,
    ) -> Result<SearchReport, SearchRejection> {
        if let Some(entry) = self.cache.get(&query).await {
            info!(%client, key = %entry.key, count = entry.results.len(), "serving search from cache");
            return Ok(SearchReport {
                stores: count_by_source(&entry.results),
                results: entry.results,
                query,
                fallback: false,
                cached: true,
                message: None,
            });
        }

        self.cooldown
            .try_begin(client)
            .map_err(|retry_after| SearchRejection::CooldownActive { retry_after })?;

        let aggregation = self.aggregator.aggregate(&query).await;

        if aggregation.live_count() > 0 {
            self.cache.put(&query, &aggregation.results).await;
            return Ok(SearchReport {
                query,
                results: aggregation.results,
                stores: aggregation.per_source_counts,
                fallback: false,
                cached: false,
                message: None,
            });
        }

        if let Some(saturation) = aggregation.saturation() {
            let retry_after = self.cooldown.rearm(client);
            warn!(%client, code = saturation.code(), "every live source came back empty and one is saturated");
            return Err(SearchRejection::Saturated {
                kind: saturation.kind(),
                retry_after,
            });
        }

        self.cooldown.release(client);

        if let Some(fatal) = aggregation.fatal_error() {
            error!(%client, code = fatal.code(), "live search failed: {}", fatal.message());
            return Err(SearchRejection::Upstream {
                detail: fatal.to_string(),
            });
        }

        let message = if aggregation.fallback {
            FALLBACK_MESSAGE
        } else {
            EMPTY_MESSAGE
        };
        Ok(SearchReport {
            query,
            results: aggregation.results,
            stores: aggregation.per_source_counts,
            fallback: aggregation.fallback,
            cached: false,
            message: Some(String::from(message)),
        })
    }
}

/// Per-source listing counts recovered from listing id prefixes.
pub fn count_by_source(results: &[Repuesto]) -> BTreeMap<SourceId, usize> {
    let mut counts = BTreeMap::new();
    for listing in results {
        if listing.id == GOOGLE_SHOPPING_ID {
            continue;
        }
        if let Some(source) = SourceId::from_listing_id(&listing.id) {
            *counts.entry(source).or_insert(0) += 1;
        }
    }
    counts
}
