use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::data_source::{PartSource, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest};
use crate::normalize::{normalize, GeneratedItem, RawItem};
use crate::provider_policy::SourcePolicy;
use crate::throttling::QuotaGuard;
use crate::{Repuesto, SearchQuery, SourceId};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Listings produced by a text-generating model, optionally grounded in web search.
///
/// Without an API key the adapter is registered but disabled and always
/// yields an empty list.
#[derive(Clone)]
pub struct GenerativeAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    model: String,
    grounding: bool,
    policy: SourcePolicy,
    quota: Option<QuotaGuard>,
    base_url: String,
}

impl GenerativeAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        let policy = SourcePolicy::generative_default();
        Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: String::from(DEFAULT_MODEL),
            grounding: true,
            quota: policy.quota.map(QuotaGuard::new),
            policy,
            base_url: String::from(DEFAULT_BASE_URL),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.quota = policy.quota.map(QuotaGuard::new);
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn request_body(&self, query: &SearchQuery) -> Value {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(query, self.policy.max_items) }] }],
            "generationConfig": { "temperature": 0.4 },
        });
        if self.grounding {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }

    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<Repuesto>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };

        if let Some(quota) = &self.quota {
            quota.acquire().map_err(|wait| {
                SourceError::rate_limited(format!(
                    "local generative budget spent, next slot in {}ms",
                    wait.as_millis()
                ))
            })?;
        }

        debug!(model = %self.model, grounding = self.grounding, "querying generative source");
        let request = HttpRequest::post(self.endpoint())
            .with_header("x-goog-api-key", api_key)
            .with_json_body(&self.request_body(query))
            .with_timeout(self.policy.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| SourceError::from_transport(SourceId::Generative, &error))?;

        if !response.is_success() {
            return Err(SourceError::from_status(
                SourceId::Generative,
                response.status,
                &response.body,
            ));
        }

        let decoded = serde_json::from_str::<GenerateResponse>(&response.body).map_err(|error| {
            warn!("unparsable generative envelope: {error}");
            SourceError::malformed(format!("unreadable generative envelope: {error}"))
        })?;

        parse_generated_listings(&response_text(decoded), query, self.policy.max_items)
    }
}

impl PartSource for GenerativeAdapter {
    fn id(&self) -> SourceId {
        SourceId::Generative
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch<'a>(
        &'a self,
        query: &'a SearchQuery,
    ) -> SourceFuture<'a, Result<Vec<Repuesto>, SourceError>> {
        Box::pin(self.fetch_listings(query))
    }
}

fn build_prompt(query: &SearchQuery, count: usize) -> String {
    let category = query
        .category()
        .map(|category| format!(" Category: {category}."))
        .unwrap_or_default();
    format!(
        "Find {count} current listings in Chile for the auto part \"{piece}\" for a \"{model}\".{category} \
         Prefer MercadoLibre, Yapo, AutoPlanet, AutoPartners and Mundo Repuestos. \
         Answer ONLY with a JSON array of {count} objects with the fields \
         name, price (integer CLP), store, url, imageUrl, description, brand and category. \
         Do not add any text outside the array.",
        piece = query.piece(),
        model = query.model(),
    )
}

fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("")
}

/// Parses the model's answer into listings.
///
/// An answer with no JSON array in it is a malformed-response error. Entries
/// that are not objects are skipped.
pub fn parse_generated_listings(
    text: &str,
    query: &SearchQuery,
    max_items: usize,
) -> Result<Vec<Repuesto>, SourceError> {
    let Some(array) = extract_json_array(text) else {
        warn!("generative answer contained no JSON array");
        return Err(SourceError::malformed("generative answer contained no JSON array"));
    };

    let values = serde_json::from_str::<Vec<Value>>(array).map_err(|error| {
        warn!("generative answer is not a valid JSON array: {error}");
        SourceError::malformed(format!("generative answer is not a valid JSON array: {error}"))
    })?;

    Ok(values
        .into_iter()
        .filter(Value::is_object)
        .map(|value| serde_json::from_value::<GeneratedItem>(value).unwrap_or_default())
        .take(max_items)
        .enumerate()
        .map(|(position, item)| {
            normalize(RawItem::Generated(item), query, SourceId::Generative, position)
        })
        .collect())
}

/// Returns the first balanced top-level `[...]` in `text`, ignoring brackets inside strings.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
