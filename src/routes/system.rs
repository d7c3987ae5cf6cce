use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{metrics::metrics_handler, state::AppState};

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/test-db", get(test_db))
        .route("/metrics", get(metrics_handler))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn test_db(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => {
            info!("database connection test successful");
            (
                StatusCode::OK,
                Json(json!({ "message": "Database connection successful" })),
            )
        }
        Err(e) => {
            error!(error = %e, "database connection test failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Database connection failed" })),
            )
        }
    }
}
