//! # Repuestos Server
//!
//! Axum front end over [`repuestos_core::SearchService`].
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/api/search` | `GET`, `POST` | Search by `piece`, `model` and optional `category` |
//! | `/api/history` | `GET` | Most recent cached queries (`?limit=N`, default 20) |
//! | `/api/cache` | `DELETE` | Purge both cache tiers |
//! | `/health` | `GET` | Liveness plus registered sources |
//!
//! Every route answers CORS preflights for any origin. Each request carries
//! an `x-request-id` (generated when absent) that is recorded on the trace
//! span and echoed in the response.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod request_id;

use axum::extract::Request;
use axum::routing::{delete, get};
use axum::Router;
use repuestos_core::SearchService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::Args;
pub use error::{ApiError, ServerError};
pub use extract::{ClientIdentity, CLIENT_ID_HEADER};
pub use request_id::UuidRequestId;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: SearchService,
}

impl AppState {
    pub fn new(service: SearchService) -> Self {
        Self { service }
    }
}

/// Builds the application router with CORS, tracing and request ids.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/search",
            get(handlers::search_get).post(handlers::search_post),
        )
        .route("/api/history", get(handlers::history))
        .route("/api/cache", delete(handlers::purge_cache))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(request_id::REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %request.method(),
                path = %request.uri().path(),
                request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}
