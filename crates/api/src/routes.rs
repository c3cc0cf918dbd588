use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use perpdata_core::MarketDataError;
use perpdata_engine::{catalogue, ToolError};
use serde_json::Value;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Tools
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
        // Cache
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "exchanges": state.service.registry().exchanges(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

async fn list_tools() -> impl IntoResponse {
    Json(catalogue::tools())
}

/// Run a tool. The request body is the argument object; an empty body
/// means no arguments.
async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ToolError::from(MarketDataError::Validation(format!(
                "Request body is not valid JSON: {}",
                e
            )))
        })?
    };
    let result = state.service.call(&name, args).await?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.cache_stats())
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.service.clear_caches().await;
    (StatusCode::OK, Json(serde_json::json!({"status": "cleared"})))
}
