//! Shared fixtures for the behavior tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use repuestos_core::{
    Aggregator, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, RetryPolicy,
    SearchQuery, SourceId, SourceRegistryBuilder,
};
use serde_json::json;

/// Answers each upstream with its own canned response and latency.
#[derive(Clone)]
pub struct RoutedHttpClient {
    pub catalog: Result<HttpResponse, HttpError>,
    pub classifieds: Result<HttpResponse, HttpError>,
    pub generative: Result<HttpResponse, HttpError>,
    pub catalog_latency: Duration,
    pub generative_latency: Duration,
    calls: Arc<AtomicUsize>,
}

impl RoutedHttpClient {
    pub fn new(catalog: HttpResponse, generative: HttpResponse) -> Self {
        Self {
            catalog: Ok(catalog),
            classifieds: Ok(HttpResponse::ok_json(r#"{"results":[]}"#)),
            generative: Ok(generative),
            catalog_latency: Duration::ZERO,
            generative_latency: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for RoutedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.url.contains(":generateContent") {
                tokio::time::sleep(self.generative_latency).await;
                self.generative.clone()
            } else if request.url.contains("category=") {
                self.classifieds.clone()
            } else {
                tokio::time::sleep(self.catalog_latency).await;
                self.catalog.clone()
            }
        })
    }
}

pub fn query() -> SearchQuery {
    SearchQuery::new("bomba de agua", "Toyota Corolla 2015").expect("valid query")
}

/// Catalog page with `count` items.
pub fn catalog_page(count: usize) -> HttpResponse {
    let results = (0..count)
        .map(|index| {
            json!({
                "id": format!("MLC{index}"),
                "title": format!("Bomba de agua Corolla #{index}"),
                "price": 30_000 + index * 1_000,
                "permalink": format!("https://articulo.mercadolibre.cl/MLC{index}"),
                "thumbnail": format!("http://http2.mlstatic.com/D_{index}-I.jpg"),
                "seller": { "nickname": "REPUESTOS_SUR" },
            })
        })
        .collect::<Vec<_>>();
    HttpResponse::ok_json(json!({ "results": results }).to_string())
}

/// Generative envelope wrapping `text` as the model answer.
pub fn generated(text: &str) -> HttpResponse {
    HttpResponse::ok_json(
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string(),
    )
}

/// Generative answer that is not a JSON array.
pub fn generated_refusal() -> HttpResponse {
    generated("Lo siento, no encontré resultados para esa búsqueda.")
}

/// Marketplace + generative registry, no classifieds, no retries.
pub fn aggregator(client: RoutedHttpClient) -> Aggregator {
    SourceRegistryBuilder::new()
        .with_http_client(Arc::new(client))
        .with_gemini_key("test-key")
        .with_grounding(false)
        .enable_classifieds(false)
        .with_retry_policy(SourceId::Marketplace, RetryPolicy::no_retry())
        .with_retry_policy(SourceId::Generative, RetryPolicy::no_retry())
        .build()
}
