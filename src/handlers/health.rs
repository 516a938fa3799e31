// src/handlers/health.rs
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::server::AppState;

/// GET /
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "message": format!("Welcome to {}", state.settings.app_name) }))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "environment": state.settings.environment.as_str(),
        "version": state.settings.app_version,
    }))
}

/// GET /test
pub async fn test_endpoint() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Test endpoint is working correctly"
    }))
}
