//! Snapshot query handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::ApiState;
use crate::domain::market::{Group, MarketState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct SymbolsQuery {
    #[serde(default)]
    symbols: Option<String>,
}

impl SymbolsQuery {
    fn symbols(&self) -> Vec<&str> {
        self.symbols
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

pub(super) async fn by_symbols(
    State(state): State<ApiState>,
    Query(query): Query<SymbolsQuery>,
) -> Json<Vec<MarketState>> {
    Json(state.snapshot.get_by_symbols(&query.symbols()))
}

pub(super) async fn by_group(
    State(state): State<ApiState>,
    Path(group): Path<String>,
) -> Response {
    match group.parse::<Group>() {
        Ok(group) => Json(state.snapshot.get_by_group(group)).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub(super) async fn all(State(state): State<ApiState>) -> Json<Vec<MarketState>> {
    Json(state.snapshot.get_all())
}
