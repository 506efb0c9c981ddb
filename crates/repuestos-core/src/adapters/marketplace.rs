use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::data_source::{PartSource, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::normalize::{normalize, MarketplaceItem, RawItem};
use crate::provider_policy::SourcePolicy;
use crate::{Repuesto, SearchQuery, SourceId};

pub const DEFAULT_BASE_URL: &str = "https://api.mercadolibre.com";
/// Vehicle-parts category used by the classifieds query.
pub const PARTS_CATEGORY: &str = "MLC1743";

const CLASSIFIEDS_REQUEST_LIMIT: usize = 20;

const BROWSER_HEADERS: [(&str, &str); 4] = [
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("accept-language", "es-419,es;q=0.9"),
    ("connection", "keep-alive"),
];

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    results: Option<Vec<serde_json::Value>>,
}

/// MercadoLibre Chile catalog search.
///
/// The same adapter backs two sources: the main marketplace query and the
/// classifieds query restricted to the vehicle-parts category.
#[derive(Clone)]
pub struct MarketplaceAdapter {
    source_id: SourceId,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    policy: SourcePolicy,
    base_url: String,
}

impl MarketplaceAdapter {
    pub fn marketplace(http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self {
            source_id: SourceId::Marketplace,
            http_client,
            auth,
            policy: SourcePolicy::marketplace_default(),
            base_url: String::from(DEFAULT_BASE_URL),
        }
    }

    pub fn classifieds(http_client: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self {
            source_id: SourceId::Classifieds,
            policy: SourcePolicy::classifieds_default(),
            ..Self::marketplace(http_client, auth)
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    pub fn search_url(&self, query: &SearchQuery) -> String {
        match self.source_id {
            SourceId::Classifieds => format!(
                "{}/sites/MLC/search?q={}&limit={CLASSIFIEDS_REQUEST_LIMIT}&category={PARTS_CATEGORY}",
                self.base_url,
                urlencoding::encode(&format!("{} auto", query.search_text())),
            ),
            _ => format!(
                "{}/sites/MLC/search?q={}&limit={}&sort=relevance",
                self.base_url,
                urlencoding::encode(&query.search_text()),
                self.policy.max_items,
            ),
        }
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Repuesto>, SourceError> {
        let url = self.search_url(query);
        debug!(source = %self.source_id, %url, "querying marketplace catalog");

        let request = HttpRequest::get(&url)
            .with_headers(BROWSER_HEADERS)
            .with_auth(&self.auth)
            .with_timeout(self.policy.timeout);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| SourceError::from_transport(self.source_id, &error))?;

        let response = if response.status == 403 {
            warn!(source = %self.source_id, "catalog refused the request (403), retrying without headers");
            match self.execute_plain(&url).await {
                Some(response) => response,
                None => return Ok(Vec::new()),
            }
        } else {
            response
        };

        if !response.is_success() {
            return Err(SourceError::from_status(
                self.source_id,
                response.status,
                &response.body,
            ));
        }

        self.parse_listings(&response.body, query)
    }

    /// Bare request with no identifying headers. Any failure yields `None`.
    async fn execute_plain(&self, url: &str) -> Option<HttpResponse> {
        let request = HttpRequest::get(url).with_timeout(self.policy.timeout);
        match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => Some(response),
            Ok(response) => {
                warn!(source = %self.source_id, status = response.status, "plain retry was refused too");
                None
            }
            Err(error) => {
                warn!(source = %self.source_id, "plain retry failed: {}", error.message());
                None
            }
        }
    }

    /// Decodes the catalog payload item by item. Non-object entries are skipped;
    /// an unreadable envelope is a malformed-response error.
    fn parse_listings(&self, body: &str, query: &SearchQuery) -> Result<Vec<Repuesto>, SourceError> {
        let envelope = serde_json::from_str::<SearchEnvelope>(body).map_err(|error| {
            warn!(source = %self.source_id, "unparsable catalog response: {error}");
            SourceError::malformed(format!("{} returned an unreadable catalog: {error}", self.source_id))
        })?;

        Ok(envelope
            .results
            .unwrap_or_default()
            .into_iter()
            .filter(|value| {
                let keep = value.is_object();
                if !keep {
                    debug!(source = %self.source_id, "skipping non-object catalog entry");
                }
                keep
            })
            .map(|value| serde_json::from_value::<MarketplaceItem>(value).unwrap_or_default())
            .take(self.policy.max_items)
            .enumerate()
            .map(|(position, item)| {
                normalize(RawItem::Marketplace(item), query, self.source_id, position)
            })
            .collect())
    }
}

impl PartSource for MarketplaceAdapter {
    fn id(&self) -> SourceId {
        self.source_id
    }

    fn fetch<'a>(
        &'a self,
        query: &'a SearchQuery,
    ) -> SourceFuture<'a, Result<Vec<Repuesto>, SourceError>> {
        Box::pin(self.fetch_listings(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;
    use crate::{SourceErrorKind, Store};

    fn query() -> SearchQuery {
        SearchQuery::new("filtro de aceite", "Kia Rio").expect("valid query")
    }

    const TWO_ITEMS: &str = r#"{"results":[
        {"id":"MLC1","title":"Filtro Kia Rio","price":8990,"permalink":"https://articulo.mercadolibre.cl/MLC-1"},
        {"id":"MLC2","title":"Filtro Mann","price":"12.500","permalink":"https://articulo.mercadolibre.cl/MLC-2"}
    ]}"#;

    #[test]
    fn builds_relevance_sorted_and_category_restricted_urls() {
        let client = Arc::new(ScriptedHttpClient::default());
        let main = MarketplaceAdapter::marketplace(client.clone(), HttpAuth::None);
        assert_eq!(
            main.search_url(&query()),
            "https://api.mercadolibre.com/sites/MLC/search?q=filtro%20de%20aceite%20Kia%20Rio&limit=50&sort=relevance"
        );

        let classifieds = MarketplaceAdapter::classifieds(client, HttpAuth::None)
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            classifieds.search_url(&query()),
            "http://localhost:9000/sites/MLC/search?q=filtro%20de%20aceite%20Kia%20Rio%20auto&limit=20&category=MLC1743"
        );
    }

    #[tokio::test]
    async fn sends_browser_headers_and_normalizes_items() {
        let client = Arc::new(ScriptedHttpClient::always(HttpResponse::ok_json(TWO_ITEMS)));
        let adapter = MarketplaceAdapter::marketplace(
            client.clone(),
            HttpAuth::BearerToken(String::from("meli-token")),
        );

        let listings = adapter.fetch(&query()).await.expect("listings");

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "ml-MLC1");
        assert_eq!(listings[1].price, 12_500);
        assert!(listings.iter().all(|listing| listing.store == Store::Marketplace));

        let request = &client.requests()[0];
        assert!(request.headers.contains_key("user-agent"));
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer meli-token")
        );
    }

    #[tokio::test]
    async fn forbidden_response_is_retried_once_without_headers() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(403, "blocked")),
            Ok(HttpResponse::ok_json(TWO_ITEMS)),
        ]));
        let adapter = MarketplaceAdapter::marketplace(client.clone(), HttpAuth::None);

        let listings = adapter.fetch(&query()).await.expect("listings");

        assert_eq!(listings.len(), 2);
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].headers.is_empty());
    }

    #[tokio::test]
    async fn forbidden_twice_yields_empty_list() {
        let client = Arc::new(ScriptedHttpClient::always(HttpResponse::new(403, "blocked")));
        let adapter = MarketplaceAdapter::marketplace(client.clone(), HttpAuth::None);

        let listings = adapter.fetch(&query()).await.expect("soft failure");
        assert!(listings.is_empty());
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn rate_limit_status_is_reported_as_retryable() {
        let client = Arc::new(ScriptedHttpClient::always(HttpResponse::new(429, "")));
        let adapter = MarketplaceAdapter::marketplace(client, HttpAuth::None);

        let error = adapter.fetch(&query()).await.expect_err("rate limited");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn classifieds_takes_at_most_fifteen_items() {
        let items = (0..20)
            .map(|index| serde_json::json!({ "id": format!("MLC{index}"), "title": "Filtro", "price": 1000 }))
            .collect::<Vec<_>>();
        let body = serde_json::json!({ "results": items }).to_string();
        let client = Arc::new(ScriptedHttpClient::always(HttpResponse::ok_json(body)));
        let adapter = MarketplaceAdapter::classifieds(client, HttpAuth::None);

        let listings = adapter.fetch(&query()).await.expect("listings");
        assert_eq!(listings.len(), 15);
        assert!(listings.iter().all(|listing| listing.id.starts_with("yapo-")));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed_and_mistyped_items_are_kept() {
        let client = Arc::new(ScriptedHttpClient::new(vec![
            Ok(HttpResponse::ok_json("<html>captcha</html>")),
            Ok(HttpResponse::ok_json(
                r#"{"results":[{"id":42,"title":"bad id","price":{}},"junk",{"id":"MLC7","title":"ok"}]}"#,
            )),
        ]));
        let adapter = MarketplaceAdapter::marketplace(client, HttpAuth::None);

        let error = adapter.fetch(&query()).await.expect_err("garbage");
        assert_eq!(error.kind(), SourceErrorKind::MalformedResponse);
        assert!(adapter.search(&query()).await.is_empty());

        let listings = adapter.fetch(&query()).await.expect("partial");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "ml-42");
        assert_eq!(listings[0].price, 0);
        assert_eq!(listings[1].id, "ml-MLC7");
    }
}
