//! Aggregator: fans a query out to every live source and merges the results.
//!
//! Sources are called concurrently; results are concatenated in static
//! priority order ([`SourceId`] declaration order), never deduplicated.
//! When every live source yields nothing the synthetic fallback fills in.
//! A Google Shopping search link is always appended last.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::adapters::{GenerativeAdapter, MarketplaceAdapter, SyntheticAdapter};
use crate::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use crate::normalize::google_shopping_entry;
use crate::resilience::{ResilientSource, SourceReport, SourceStatus};
use crate::retry::RetryPolicy;
use crate::{PartSource, Repuesto, SearchQuery, SourceError, SourceId};

/// Merged outcome of one fan-out.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub results: Vec<Repuesto>,
    /// Listings contributed per source; the appended search link is not counted.
    pub per_source_counts: BTreeMap<SourceId, usize>,
    pub reports: Vec<SourceReport>,
    /// True when the synthetic fallback supplied the listings.
    pub fallback: bool,
    pub latency_ms: u64,
}

impl Aggregation {
    /// Listings contributed by live sources.
    pub fn live_count(&self) -> usize {
        self.reports
            .iter()
            .map(|report| report.listings.len())
            .sum()
    }

    /// First source that ran out of retries on a retryable error.
    pub fn saturation(&self) -> Option<&SourceError> {
        self.reports.iter().find_map(SourceReport::saturation)
    }

    /// First source that failed with a fatal error.
    pub fn fatal_error(&self) -> Option<&SourceError> {
        self.reports.iter().find_map(SourceReport::fatal_error)
    }

    pub fn succeeded_sources(&self) -> Vec<SourceId> {
        self.reports
            .iter()
            .filter(|report| report.status == SourceStatus::Succeeded)
            .map(|report| report.source)
            .collect()
    }
}

/// Registry of wrapped live sources plus the optional synthetic fallback.
pub struct Aggregator {
    sources: Vec<ResilientSource>,
    fallback: Option<Arc<dyn PartSource>>,
}

impl Aggregator {
    /// Sources are kept in priority order regardless of registration order.
    pub fn new(mut sources: Vec<ResilientSource>, fallback: Option<Arc<dyn PartSource>>) -> Self {
        sources.sort_by_key(ResilientSource::id);
        Self { sources, fallback }
    }

    /// Registered sources with their enabled flag, in priority order.
    pub fn sources(&self) -> Vec<(SourceId, bool)> {
        let mut sources = self
            .sources
            .iter()
            .map(|source| (source.id(), source.enabled()))
            .collect::<Vec<_>>();
        if let Some(fallback) = &self.fallback {
            sources.push((fallback.id(), fallback.enabled()));
        }
        sources
    }

    pub async fn aggregate(&self, query: &SearchQuery) -> Aggregation {
        let started = tokio::time::Instant::now();
        let reports = join_all(self.sources.iter().map(|source| source.search(query))).await;

        let mut per_source_counts = BTreeMap::new();
        let mut results = Vec::new();
        for report in &reports {
            per_source_counts.insert(report.source, report.listings.len());
            results.extend(report.listings.iter().cloned());
        }

        let mut fallback = false;
        if results.is_empty() {
            if let Some(source) = &self.fallback {
                let listings = source.search(query).await;
                debug!(count = listings.len(), "live sources empty, using synthetic fallback");
                per_source_counts.insert(source.id(), listings.len());
                fallback = !listings.is_empty();
                results.extend(listings);
            }
        }

        results.push(google_shopping_entry(query));
        ensure_unique_ids(&mut results);

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            piece = query.piece(),
            model = query.model(),
            count = results.len(),
            fallback,
            latency_ms,
            "aggregated search"
        );

        Aggregation {
            results,
            per_source_counts,
            reports,
            fallback,
            latency_ms,
        }
    }
}

/// Suffixes colliding ids with `-2`, `-3`, ... so every id in a set is unique.
fn ensure_unique_ids(results: &mut [Repuesto]) {
    let mut seen = HashSet::with_capacity(results.len());
    for listing in results.iter_mut() {
        if seen.insert(listing.id.clone()) {
            continue;
        }
        let mut ordinal = 2;
        let mut candidate = format!("{}-{ordinal}", listing.id);
        while seen.contains(&candidate) {
            ordinal += 1;
            candidate = format!("{}-{ordinal}", listing.id);
        }
        listing.id = candidate.clone();
        seen.insert(candidate);
    }
}

/// Builds an [`Aggregator`] with real HTTP adapters.
///
/// # Environment Variables
///
/// | Credential | Primary | Fallback |
/// |------------|---------|----------|
/// | Marketplace bearer token (optional) | `REPUESTOS_MARKETPLACE_TOKEN` | `MELI_ACCESS_TOKEN` |
/// | Generative API key | `REPUESTOS_GEMINI_API_KEY` | `GEMINI_API_KEY` |
pub struct SourceRegistryBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    marketplace_token: Option<String>,
    gemini_api_key: Option<String>,
    generative_model: Option<String>,
    grounding: bool,
    enable_marketplace: bool,
    enable_classifieds: bool,
    enable_generative: bool,
    synthetic_fallback: bool,
    marketplace_base_url: Option<String>,
    generative_base_url: Option<String>,
    retry_overrides: HashMap<SourceId, RetryPolicy>,
}

impl Default for SourceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        Self {
            http_client: None,
            marketplace_token: None,
            gemini_api_key: None,
            generative_model: None,
            grounding: true,
            enable_marketplace: true,
            enable_classifieds: true,
            enable_generative: true,
            synthetic_fallback: true,
            marketplace_base_url: None,
            generative_base_url: None,
            retry_overrides: HashMap::new(),
        }
    }

    /// Reads credentials from the environment. Unset variables leave the current value.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Some(token) = env_pair("REPUESTOS_MARKETPLACE_TOKEN", "MELI_ACCESS_TOKEN") {
            self.marketplace_token = Some(token);
        }
        if let Some(key) = env_pair("REPUESTOS_GEMINI_API_KEY", "GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    #[must_use]
    pub fn with_marketplace_token(mut self, token: impl Into<String>) -> Self {
        self.marketplace_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_generative_model(mut self, model: impl Into<String>) -> Self {
        self.generative_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }

    #[must_use]
    pub fn with_synthetic_fallback(mut self, enabled: bool) -> Self {
        self.synthetic_fallback = enabled;
        self
    }

    #[must_use]
    pub fn with_marketplace_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.marketplace_base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_generative_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.generative_base_url = Some(base_url.into());
        self
    }

    /// Replaces the default retry policy of one source.
    #[must_use]
    pub fn with_retry_policy(mut self, source: SourceId, retry: RetryPolicy) -> Self {
        self.retry_overrides.insert(source, retry);
        self
    }

    #[must_use]
    pub fn enable_marketplace(mut self, enabled: bool) -> Self {
        self.enable_marketplace = enabled;
        self
    }

    #[must_use]
    pub fn enable_classifieds(mut self, enabled: bool) -> Self {
        self.enable_classifieds = enabled;
        self
    }

    #[must_use]
    pub fn enable_generative(mut self, enabled: bool) -> Self {
        self.enable_generative = enabled;
        self
    }

    pub fn build(self) -> Aggregator {
        let http_client = self
            .http_client
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let marketplace_auth = self
            .marketplace_token
            .clone()
            .map_or(HttpAuth::None, HttpAuth::BearerToken);

        let mut sources = Vec::new();

        if self.enable_marketplace {
            let mut adapter =
                MarketplaceAdapter::marketplace(Arc::clone(&http_client), marketplace_auth.clone());
            if let Some(base_url) = &self.marketplace_base_url {
                adapter = adapter.with_base_url(base_url);
            }
            let retry = self.retry_for(SourceId::Marketplace, &adapter.policy().retry);
            sources.push(ResilientSource::new(Arc::new(adapter), retry));
        }

        if self.enable_classifieds {
            let mut adapter =
                MarketplaceAdapter::classifieds(Arc::clone(&http_client), marketplace_auth);
            if let Some(base_url) = &self.marketplace_base_url {
                adapter = adapter.with_base_url(base_url);
            }
            let retry = self.retry_for(SourceId::Classifieds, &adapter.policy().retry);
            sources.push(ResilientSource::new(Arc::new(adapter), retry));
        }

        if self.enable_generative {
            let mut adapter = GenerativeAdapter::new(Arc::clone(&http_client), self.gemini_api_key.clone())
                .with_grounding(self.grounding);
            if let Some(model) = &self.generative_model {
                adapter = adapter.with_model(model);
            }
            if let Some(base_url) = &self.generative_base_url {
                adapter = adapter.with_base_url(base_url);
            }
            if !adapter.enabled() {
                info!("no generative API key configured; generative source disabled");
            }
            let retry = self.retry_for(SourceId::Generative, &adapter.policy().retry);
            sources.push(ResilientSource::new(Arc::new(adapter), retry));
        }

        let fallback = self.synthetic_fallback.then(|| {
            let synthetic: Arc<dyn PartSource> = Arc::new(SyntheticAdapter::default());
            synthetic
        });

        Aggregator::new(sources, fallback)
    }

    fn retry_for(&self, source: SourceId, default: &RetryPolicy) -> RetryPolicy {
        self.retry_overrides
            .get(&source)
            .cloned()
            .unwrap_or_else(|| default.clone())
    }
}

fn env_pair(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, Store, UtcDateTime};

    fn listing(id: &str) -> Repuesto {
        Repuesto {
            id: id.to_owned(),
            name: String::from("x"),
            price: 0,
            image_url: String::new(),
            description: String::new(),
            url: String::new(),
            store: Store::Other,
            brand: String::new(),
            model: String::new(),
            category: Category::Other,
            scraped_at: UtcDateTime::from_unix_millis(0),
        }
    }

    #[test]
    fn colliding_ids_get_ordinal_suffixes() {
        let mut results = vec![listing("ml-1"), listing("ml-1"), listing("ml-1-2"), listing("ml-1")];
        ensure_unique_ids(&mut results);

        let ids = results.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["ml-1", "ml-1-2", "ml-1-2-2", "ml-1-3"]);
    }

    #[test]
    fn builder_registers_sources_in_priority_order() {
        let aggregator = SourceRegistryBuilder::new()
            .with_http_client(Arc::new(crate::http_client::ScriptedHttpClient::default()))
            .build();

        assert_eq!(
            aggregator.sources(),
            vec![
                (SourceId::Marketplace, true),
                (SourceId::Classifieds, true),
                (SourceId::Generative, false),
                (SourceId::Synthetic, true),
            ]
        );
    }
}
