use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Liveness only; database reachability is covered by the `health-check` cron job.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "ete-api"
    }))
}
