//! Transport seam between source adapters and the network.
//!
//! Adapters build an [`HttpRequest`], hand it to an [`HttpClient`], and map the
//! [`HttpResponse`] status themselves. Tests swap in [`ScriptedHttpClient`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Credentials attached to a catalog request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HttpAuth {
    #[default]
    None,
    BearerToken(String),
}

impl HttpAuth {
    /// Header carrying the credential, if any.
    pub fn header(&self) -> Option<(&'static str, String)> {
        match self {
            Self::None => None,
            Self::BearerToken(token) => Some(("authorization", format!("Bearer {token}"))),
        }
    }
}

/// Outgoing request. Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::with_method(HttpMethod::Get, url.into())
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::with_method(HttpMethod::Post, url.into())
    }

    fn with_method(method: HttpMethod, url: String) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_header(self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        let name = name.as_ref().to_ascii_lowercase();
        self.insert_header(name, value.into())
    }

    pub fn with_headers<'h>(self, pairs: impl IntoIterator<Item = (&'h str, &'h str)>) -> Self {
        pairs
            .into_iter()
            .fold(self, |request, (name, value)| request.with_header(name, value))
    }

    /// Serializes `body` and marks the request as JSON.
    pub fn with_json_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self.insert_header(String::from("content-type"), String::from("application/json"))
    }

    pub fn with_auth(self, auth: &HttpAuth) -> Self {
        match auth.header() {
            Some((name, value)) => self.insert_header(name.to_owned(), value),
            None => self,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn insert_header(mut self, name: String, value: String) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }
}

/// A request that never produced a status line.
///
/// Timeouts and dropped connections are retryable; a request the transport
/// refused to build is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::build(message.into(), true)
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::build(message.into(), false)
    }

    const fn build(message: String, retryable: bool) -> Self {
        Self { message, retryable }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = if self.retryable { "transient" } else { "permanent" };
        write!(f, "{kind} transport error: {}", self.message)
    }
}

impl std::error::Error for HttpError {}

/// Boxed response future returned by [`HttpClient::execute`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Executes one request. Non-2xx statuses are responses, not errors.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Deterministic transport that replays queued responses in order.
///
/// Once the queue is drained every call gets the fallback response
/// (`200 {}` unless overridden). Every request is recorded for inspection.
#[derive(Debug, Clone)]
pub struct ScriptedHttpClient {
    inner: Arc<ScriptedInner>,
    latency: Duration,
}

#[derive(Debug)]
struct ScriptedInner {
    queue: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    fallback: Result<HttpResponse, HttpError>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Default for ScriptedHttpClient {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScriptedHttpClient {
    pub fn new(script: Vec<Result<HttpResponse, HttpError>>) -> Self {
        Self::build(script, Ok(HttpResponse::ok_json("{}")))
    }

    /// Client that answers every request with the same response.
    pub fn always(response: HttpResponse) -> Self {
        Self::build(Vec::new(), Ok(response))
    }

    /// Client whose every request fails at the transport level.
    pub fn failing(error: HttpError) -> Self {
        Self::build(Vec::new(), Err(error))
    }

    /// Delays every response by `latency` (tokio time, so paused clocks apply).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn build(
        script: Vec<Result<HttpResponse, HttpError>>,
        fallback: Result<HttpResponse, HttpError>,
    ) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                queue: Mutex::new(script.into()),
                fallback,
                requests: Mutex::new(Vec::new()),
            }),
            latency: Duration::ZERO,
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .requests
            .lock()
            .expect("scripted request log lock is not poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner
            .requests
            .lock()
            .expect("scripted request log lock is not poisoned")
            .len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.inner
                .requests
                .lock()
                .expect("scripted request log lock is not poisoned")
                .push(request);

            let next = self
                .inner
                .queue
                .lock()
                .expect("scripted queue lock is not poisoned")
                .pop_front();

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            next.unwrap_or_else(|| self.inner.fallback.clone())
        })
    }
}

/// Network transport backed by a shared `reqwest::Client`.
///
/// No default user agent is set: adapters decide which headers identify them.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        let builder = request
            .headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value))
            .timeout(request.timeout);
        match request.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

fn classify(error: &reqwest::Error) -> HttpError {
    if error.is_builder() {
        HttpError::non_retryable(format!("invalid request: {error}"))
    } else if error.is_timeout() {
        HttpError::new(format!("timed out: {error}"))
    } else if error.is_connect() {
        HttpError::new(format!("could not connect: {error}"))
    } else {
        HttpError::new(error.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let response = self.prepare(request).send().await.map_err(|e| classify(&e))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| classify(&e))?;
            Ok(HttpResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_populates_authorization_header() {
        let request = HttpRequest::get("https://api.test/sites/MLC/search")
            .with_auth(&HttpAuth::BearerToken(String::from("token-123")));

        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer token-123")
        );
    }

    #[test]
    fn json_body_sets_content_type() {
        let request = HttpRequest::post("https://api.test/generate")
            .with_json_body(&serde_json::json!({ "prompt": "hola" }));

        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(r#"{"prompt":"hola"}"#));
    }

    #[tokio::test]
    async fn scripted_client_replays_queue_then_fallback() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(429, "slow down")),
            Err(HttpError::new("connection reset")),
        ]);

        let first = client
            .execute(HttpRequest::get("https://a.test"))
            .await
            .expect("scripted response");
        assert_eq!(first.status, 429);
        assert!(client.execute(HttpRequest::get("https://b.test")).await.is_err());

        let drained = client
            .execute(HttpRequest::get("https://c.test"))
            .await
            .expect("fallback response");
        assert_eq!(drained, HttpResponse::ok_json("{}"));
        assert_eq!(client.request_count(), 3);
        assert_eq!(client.requests()[1].url, "https://b.test");
    }
}
