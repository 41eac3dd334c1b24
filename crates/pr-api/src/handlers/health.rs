use axum::{Json, extract::State};
use serde_json::json;
use tokio::time::{Duration, timeout};

use crate::SharedState;
use crate::error::ApiError;

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn livez() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Liveness probe kept for existing recommender clients.
pub async fn heartbeat() -> Json<serde_json::Value> {
    Json(json!({ "alive": true }))
}

pub async fn readyz(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.is_ready() {
        return Err(ApiError::ServiceUnavailable("shutting_down".into()));
    }

    let Some(pool) = state.catalog.pool() else {
        return Ok(Json(json!({
            "status": "ok",
            "catalog": state.catalog.backend(),
            "application": env!("CARGO_PKG_NAME"),
        })));
    };

    let client = timeout(READINESS_TIMEOUT, pool.get())
        .await
        .map_err(|_| ApiError::ServiceUnavailable("db_pool_timeout".into()))
        .and_then(|result| {
            result.map_err(|err| {
                ApiError::ServiceUnavailable(format!("failed to check out pool connection: {err}"))
            })
        })?;

    timeout(READINESS_TIMEOUT, client.simple_query("SELECT 1"))
        .await
        .map_err(|_| ApiError::ServiceUnavailable("db_ping_timeout".into()))
        .and_then(|result| {
            result
                .map_err(|err| ApiError::ServiceUnavailable(format!("health check failed: {err}")))
        })?;

    Ok(Json(json!({
        "status": "ok",
        "catalog": state.catalog.backend(),
        "database": "ok",
        "application": env!("CARGO_PKG_NAME"),
    })))
}
