//! Route handlers and their request/response bodies.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use repuestos_core::{Category, HistoryEntry, Repuesto, SearchQuery, SourceId, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::extract::ClientIdentity;
use crate::AppState;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Search input, accepted as a query string or a JSON body.
///
/// Unknown category labels are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "pieza")]
    pub piece: Option<String>,
    #[serde(default, alias = "modelo")]
    pub model: Option<String>,
    #[serde(default, alias = "categoria")]
    pub category: Option<String>,
}

impl SearchParams {
    /// # Errors
    /// Fails when piece or model is missing, blank, or too long.
    pub fn into_query(self) -> Result<SearchQuery, ValidationError> {
        let query = SearchQuery::new(
            self.piece.unwrap_or_default(),
            self.model.unwrap_or_default(),
        )?;
        let category = self.category.as_deref().and_then(Category::from_label);
        Ok(query.with_category(category))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub count: usize,
    pub stores: BTreeMap<SourceId, usize>,
    pub results: Vec<Repuesto>,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub id: SourceId,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub sources: Vec<SourceHealth>,
    pub shared_cache: bool,
}

pub async fn search_get(
    State(state): State<AppState>,
    client: ClientIdentity,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    run_search(&state, client, params).await
}

pub async fn search_post(
    State(state): State<AppState>,
    client: ClientIdentity,
    body: Result<Json<SearchParams>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(params) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    run_search(&state, client, params).await
}

async fn run_search(
    state: &AppState,
    ClientIdentity(client): ClientIdentity,
    params: SearchParams,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.into_query()?;
    debug!(%client, piece = query.piece(), model = query.model(), "search request");

    let report = state.service.search(&client, query).await?;
    info!(
        %client,
        count = report.count(),
        cached = report.cached,
        fallback = report.fallback,
        "search answered"
    );

    Ok(Json(SearchResponse {
        success: true,
        count: report.count(),
        stores: report.stores,
        results: report.results,
        fallback: report.fallback,
        message: report.message,
        cached: report.cached,
    }))
}

pub async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let history = state.service.cache().history(limit).await?;
    Ok(Json(HistoryResponse {
        success: true,
        count: history.len(),
        history,
    }))
}

pub async fn purge_cache(State(state): State<AppState>) -> Result<Json<PurgeResponse>, ApiError> {
    let removed = state.service.cache().purge_all().await?;
    info!(removed, "search cache purged");
    Ok(Json(PurgeResponse {
        success: true,
        removed,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let sources = state
        .service
        .aggregator()
        .sources()
        .into_iter()
        .map(|(id, enabled)| SourceHealth { id, enabled })
        .collect();

    Json(HealthResponse {
        status: String::from("ok"),
        sources,
        shared_cache: state.service.cache().has_shared_tier(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_aliases_and_lenient_category() {
        let params: SearchParams = serde_json::from_str(
            r#"{"pieza":" pastillas de freno ","modelo":"Mazda 3 2017","categoria":"frenos"}"#,
        )
        .expect("params");
        let query = params.into_query().expect("query");
        assert_eq!(query.piece(), "pastillas de freno");
        assert_eq!(query.category(), Some(Category::Brakes));

        let unknown = SearchParams {
            piece: Some(String::from("radiador")),
            model: Some(String::from("Kia Rio")),
            category: Some(String::from("boats")),
        };
        assert_eq!(unknown.into_query().expect("query").category(), None);
    }

    #[test]
    fn missing_model_is_a_validation_error() {
        let params = SearchParams {
            piece: Some(String::from("radiador")),
            ..SearchParams::default()
        };
        assert_eq!(params.into_query(), Err(ValidationError::MissingModel));
    }
}
