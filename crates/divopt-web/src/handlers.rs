//! Dashboard request handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use divopt_warehouse::{ContractRow, IngestSummary};
use serde::Serialize;

use crate::error::ApiError;
use crate::filters::ContractFilters;
use crate::render::{self, DashboardView};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ContractsResponse {
    pub count: usize,
    pub contracts: Vec<ContractRow>,
}

#[derive(Debug, Serialize)]
pub struct TickersResponse {
    pub tickers: Vec<String>,
    pub ingest: Vec<IngestSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub contracts: usize,
    pub last_observed_at: Option<String>,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let (contracts, last_observed_at) = state
        .blocking(|reader| Ok((reader.contract_count()?, reader.last_observed_at()?)))
        .await
        .map_err(|error| ApiError::Unavailable(error.to_string()))?;
    Ok(Json(HealthResponse {
        status: "ok",
        contracts,
        last_observed_at,
    }))
}

/// Filtered contracts as JSON, ordered by premium descending.
pub async fn contracts(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ContractFilters>,
) -> Result<Json<ContractsResponse>, ApiError> {
    let query = filters.to_query()?;
    let contracts = state.blocking(move |reader| reader.query_contracts(&query)).await?;
    Ok(Json(ContractsResponse {
        count: contracts.len(),
        contracts,
    }))
}

/// Stored tickers with their ingest history.
pub async fn tickers(State(state): State<Arc<AppState>>) -> Result<Json<TickersResponse>, ApiError> {
    let (tickers, ingest) = state
        .blocking(|reader| Ok((reader.tickers()?, reader.ingest_summary()?)))
        .await?;
    Ok(Json(TickersResponse { tickers, ingest }))
}

/// The HTML dashboard. Invalid filters render the page with an error banner.
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<ContractFilters>,
) -> Result<(StatusCode, Html<String>), ApiError> {
    let query = filters.to_query();
    let refresh_secs = state.refresh_secs;

    let (status, view) = state
        .blocking(move |reader| {
            let mut view = DashboardView {
                refresh_secs,
                stored_contracts: reader.contract_count()?,
                tickers: reader.tickers()?,
                expiration_bounds: reader.expiration_bounds()?,
                premium_bounds: reader.premium_bounds()?,
                last_observed_at: reader.last_observed_at()?,
                ..DashboardView::default()
            };
            let status = match query {
                Ok(query) => {
                    view.rows = reader.query_contracts(&query)?;
                    StatusCode::OK
                }
                Err(error) => {
                    view.error = Some(error.to_string());
                    StatusCode::BAD_REQUEST
                }
            };
            view.filters = filters;
            Ok((status, view))
        })
        .await?;

    Ok((status, Html(render::page(&view))))
}
