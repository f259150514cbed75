//! # API Handlers
//!
//! Axum handlers and the router for the flow query service.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use flow_core::error::STATUS_SERVICE_UNAVAILABLE;
use flow_core::{AggregatedQueryResponse, FlowError, FlowParams};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors;
    let router = Router::new()
        .route("/api/status", get(status))
        .route("/api/loki/ready", get(loki_ready))
        .route("/api/loki/flows", get(get_flows))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// =============================================================================
// Flows
// =============================================================================

pub async fn get_flows(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<AggregatedQueryResponse>, ApiError> {
    let query = first_values(pairs);
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("get_flows", %request_id);

    async move {
        tracing::debug!(?query, "GetFlows query params");
        let params = FlowParams::from_query(&query, chrono::Utc::now())?;
        let flows =
            crate::flows::get_flows(&state.config.loki, Arc::clone(&state.caller), &params).await?;
        tracing::trace!(?flows, "GetFlows response");
        tracing::debug!(
            queries = flows.stats.num_queries,
            entries = flows.stats.total_entries,
            limit_reached = flows.stats.limit_reached,
            "GetFlows done"
        );
        Ok::<_, ApiError>(Json(flows))
    }
    .instrument(span)
    .await
}

/// Repeated keys keep their first value.
fn first_values(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut query = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        query.entry(key).or_insert(value);
    }
    query
}

// =============================================================================
// Readiness & Status
// =============================================================================

/// Proxies Loki's `/ready`.
pub async fn loki_ready(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    let url = format!("{}ready", state.config.loki.base_url());
    let response = state
        .caller
        .get(&url)
        .await
        .map_err(|e| FlowError::BackendFetch {
            status: STATUS_SERVICE_UNAVAILABLE,
            message: format!("Loki is not ready: {e}"),
        })?;

    match response.status {
        200 => Ok(response.text()),
        204 => Err(not_ready(STATUS_SERVICE_UNAVAILABLE, &response.text()).into()),
        code => Err(not_ready(code, &response.text()).into()),
    }
}

fn not_ready(status: u16, detail: &str) -> FlowError {
    FlowError::BackendFetch {
        status,
        message: format!("Loki is not ready: [{status}] {detail}"),
    }
}

#[derive(Serialize)]
pub struct ServiceStatus {
    version: &'static str,
    loki_url: String,
    timeout_secs: u64,
    uptime_seconds: u64,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        version: env!("CARGO_PKG_VERSION"),
        loki_url: state.config.loki.base_url(),
        timeout_secs: state.config.loki.timeout_secs,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
