//! Behavior-driven tests for the aggregator.
//!
//! These tests verify HOW results from several sources are merged: fixed
//! priority order, per-source counts, the synthetic fallback, and the search
//! link that is always appended.

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use repuestos_core::normalize::GOOGLE_SHOPPING_ID;
use repuestos_core::{
    HttpResponse, RetryPolicy, ScriptedHttpClient, SourceId, SourceRegistryBuilder, Store,
};

use support::{aggregator, catalog_page, generated, generated_refusal, query, RoutedHttpClient};

// =============================================================================
// Merge
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_marketplace_has_ten_hits_and_generative_fails_to_parse_system_returns_eleven() {
    // Given: A catalog with 10 items and a model answer that is not an array
    let client = RoutedHttpClient::new(catalog_page(10), generated_refusal());
    let aggregator = aggregator(client);

    // When: The query is aggregated
    let aggregation = aggregator.aggregate(&query()).await;

    // Then: 10 normalized listings plus the search link
    assert_eq!(aggregation.results.len(), 11);
    assert_eq!(aggregation.per_source_counts.get(&SourceId::Marketplace), Some(&10));
    assert_eq!(aggregation.per_source_counts.get(&SourceId::Generative), Some(&0));
    assert!(!aggregation.fallback);

    for listing in &aggregation.results[..10] {
        assert!(listing.id.starts_with("ml-"));
        assert_eq!(listing.store, Store::Marketplace);
        assert!(listing.price >= 30_000);
        assert!(listing.image_url.starts_with("https://"));
        assert_eq!(listing.model, "Toyota Corolla 2015");
    }
    let last = aggregation.results.last().expect("search link");
    assert_eq!(last.id, GOOGLE_SHOPPING_ID);
    assert!(last.url.contains("tbm=shop"));
}

#[tokio::test(start_paused = true)]
async fn when_slow_source_has_priority_system_keeps_priority_order() {
    // Given: The catalog answers long after the generative source
    let answer = r#"```json
[{"name":"Bomba de agua Gates","price":"$45.990","store":"AutoPartners","url":"https://www.autopartners.cl/p/1"},
 {"nombre":"Bomba Aisin","precio":39990,"tienda":"Yapo"}]
```"#;
    let mut client = RoutedHttpClient::new(catalog_page(3), generated(answer));
    client.catalog_latency = Duration::from_secs(5);
    let aggregator = aggregator(client);

    // When: The query is aggregated
    let aggregation = aggregator.aggregate(&query()).await;

    // Then: Catalog listings still come first, generative next, link last
    let prefixes = aggregation
        .results
        .iter()
        .map(|listing| listing.id.split('-').next().unwrap_or_default().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(prefixes, vec!["ml", "ml", "ml", "ai", "ai", "google"]);

    let generative = &aggregation.results[3..5];
    assert_eq!(generative[0].price, 45_990);
    assert_eq!(generative[0].store, Store::SpecialtyRetailer);
    assert_eq!(generative[1].store, Store::ClassifiedsSite);
}

#[tokio::test(start_paused = true)]
async fn when_sources_run_system_calls_them_concurrently() {
    let mut client = RoutedHttpClient::new(catalog_page(2), generated_refusal());
    client.catalog_latency = Duration::from_secs(4);
    client.generative_latency = Duration::from_secs(4);
    let aggregator = aggregator(client);

    let started = tokio::time::Instant::now();
    aggregator.aggregate(&query()).await;

    assert!(started.elapsed() < Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn when_listing_ids_collide_system_keeps_every_listing_with_unique_ids() {
    let mut client = RoutedHttpClient::new(catalog_page(2), generated_refusal());
    client.catalog = Ok(HttpResponse::ok_json(
        r#"{"results":[{"id":"MLC7","title":"A","price":1000},{"id":"MLC7","title":"B","price":2000}]}"#,
    ));
    let aggregation = aggregator(client).aggregate(&query()).await;

    let ids = aggregation
        .results
        .iter()
        .map(|listing| listing.id.as_str())
        .collect::<HashSet<_>>();
    assert_eq!(ids.len(), aggregation.results.len());
    assert_eq!(aggregation.results.len(), 3);
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_live_source_is_empty_system_uses_synthetic_listings() {
    // Given: An empty catalog and a refusal from the model
    let client = RoutedHttpClient::new(catalog_page(0), generated_refusal());
    let aggregator = aggregator(client);

    // When: The query is aggregated
    let aggregation = aggregator.aggregate(&query()).await;

    // Then: Five approximate listings plus the link, flagged as fallback
    assert!(aggregation.fallback);
    assert_eq!(aggregation.live_count(), 0);
    assert_eq!(aggregation.per_source_counts.get(&SourceId::Synthetic), Some(&5));
    assert_eq!(aggregation.results.len(), 6);
    assert!(aggregation.results[..5]
        .iter()
        .all(|listing| listing.id.starts_with("fb-") && listing.price > 0));
}

#[tokio::test(start_paused = true)]
async fn when_fallback_is_disabled_system_still_returns_the_search_link() {
    let client = RoutedHttpClient::new(HttpResponse::new(500, "boom"), HttpResponse::new(500, "boom"));
    let aggregator = SourceRegistryBuilder::new()
        .with_http_client(Arc::new(client))
        .with_synthetic_fallback(false)
        .build();

    let aggregation = aggregator.aggregate(&query()).await;

    assert!(!aggregation.fallback);
    assert_eq!(aggregation.results.len(), 1);
    assert_eq!(aggregation.results[0].id, GOOGLE_SHOPPING_ID);
    assert!(aggregation.fatal_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn when_generative_key_is_missing_system_skips_it_without_a_request() {
    let client = RoutedHttpClient::new(catalog_page(2), generated_refusal());
    let aggregator = SourceRegistryBuilder::new()
        .with_http_client(Arc::new(client.clone()))
        .enable_classifieds(false)
        .build();

    let aggregation = aggregator.aggregate(&query()).await;

    assert_eq!(client.calls(), 1);
    assert_eq!(aggregation.succeeded_sources(), vec![SourceId::Marketplace]);
    assert!(aggregator
        .sources()
        .contains(&(SourceId::Generative, false)));
}

#[tokio::test(start_paused = true)]
async fn when_builder_overrides_endpoints_and_token_system_sends_them_upstream() {
    // Given: A registry pointed at local endpoints with a catalog token
    let http = ScriptedHttpClient::new(vec![Ok(catalog_page(1))]);
    let aggregator = SourceRegistryBuilder::new()
        .with_http_client(Arc::new(http.clone()))
        .with_marketplace_token("meli-token")
        .with_marketplace_base_url("http://catalog.local")
        .with_gemini_key("test-key")
        .with_generative_base_url("http://model.local/")
        .enable_classifieds(false)
        .with_retry_policy(SourceId::Generative, RetryPolicy::no_retry())
        .build();

    // When: The query is aggregated
    aggregator.aggregate(&query()).await;

    // Then: Each upstream was reached at its override, the catalog with the token
    let requests = http.requests();
    assert_eq!(requests.len(), 2);
    let catalog = requests
        .iter()
        .find(|request| request.url.starts_with("http://catalog.local/sites/MLC/search"))
        .expect("catalog request");
    assert_eq!(
        catalog.headers.get("authorization").map(String::as_str),
        Some("Bearer meli-token")
    );
    assert!(requests
        .iter()
        .any(|request| request.url.starts_with("http://model.local/v1beta/models/")));
}
