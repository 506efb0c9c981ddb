//! Source adapter contract and error classification.
//!
//! Every upstream is wrapped by a [`PartSource`]. Adapters expose two calls:
//!
//! | Method | Failure handling |
//! |--------|------------------|
//! | [`fetch`](PartSource::fetch) | Typed [`SourceError`], consumed by the resilience wrapper |
//! | [`search`](PartSource::search) | Never fails: errors are logged and become an empty list |
//!
//! Only [`SourceErrorKind::RateLimited`] and [`SourceErrorKind::Unavailable`]
//! are retryable. [`SourceErrorKind::MalformedResponse`] is neither retryable
//! nor fatal: the source simply contributes no listings.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::warn;

use crate::http_client::HttpError;
use crate::{Repuesto, SearchQuery, SourceId};

/// Why a source call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    RateLimited,
    Unavailable,
    Unauthorized,
    InvalidRequest,
    MalformedResponse,
    Internal,
}

impl SourceErrorKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable)
    }

    /// Kinds that indicate a broken integration rather than a busy or empty upstream.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::InvalidRequest | Self::Internal
        )
    }

    /// Stable dotted code used in logs.
    pub const fn code(self) -> &'static str {
        match self {
            Self::RateLimited => "source.rate_limited",
            Self::Unavailable => "source.unavailable",
            Self::Unauthorized => "source.unauthorized",
            Self::InvalidRequest => "source.invalid_request",
            Self::MalformedResponse => "source.malformed_response",
            Self::Internal => "source.internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail} ({})", .kind.code())]
pub struct SourceError {
    kind: SourceErrorKind,
    detail: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unauthorized, detail)
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::MalformedResponse, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, detail)
    }

    /// Classifies a non-success HTTP status returned by `source`.
    pub fn from_status(source: SourceId, status: u16, body: &str) -> Self {
        let snippet = body.chars().take(200).collect::<String>();
        let message = format!("{source} upstream returned HTTP {status}: {snippet}");
        let kind = match status {
            429 => SourceErrorKind::RateLimited,
            502..=504 => SourceErrorKind::Unavailable,
            401 | 403 => SourceErrorKind::Unauthorized,
            400 | 404 | 405 | 422 => SourceErrorKind::InvalidRequest,
            _ => SourceErrorKind::Internal,
        };
        Self::new(kind, message)
    }

    /// Classifies a transport failure; timeouts and connection failures are retryable.
    pub fn from_transport(source: SourceId, error: &HttpError) -> Self {
        let message = format!("{source} transport error: {}", error.message());
        if error.retryable() {
            Self::unavailable(message)
        } else {
            Self::internal(message)
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.detail
    }

    pub const fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Boxed future returned by adapter calls.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; the aggregator shares them across
/// concurrent searches.
pub trait PartSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Disabled sources (for example, missing credentials) are skipped without a call.
    fn enabled(&self) -> bool {
        true
    }

    /// Queries the upstream and normalizes its items.
    fn fetch<'a>(&'a self, query: &'a SearchQuery)
        -> SourceFuture<'a, Result<Vec<Repuesto>, SourceError>>;

    /// Like [`fetch`](Self::fetch), but any failure is logged and yields an empty list.
    fn search<'a>(&'a self, query: &'a SearchQuery) -> SourceFuture<'a, Vec<Repuesto>> {
        Box::pin(async move {
            if !self.enabled() {
                return Vec::new();
            }
            match self.fetch(query).await {
                Ok(listings) => listings,
                Err(error) => {
                    warn!(source = %self.id(), code = error.code(), "source search failed: {}", error.message());
                    Vec::new()
                }
            }
        })
    }
}
