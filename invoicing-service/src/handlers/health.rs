use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use service_core::error::AppError;

use crate::services::metrics::get_metrics;
use crate::startup::AppState;

pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.db.health_check().await?;
    Ok(Json(json!({ "status": "ok", "service": "invoicing-service" })))
}

pub async fn metrics() -> impl IntoResponse {
    get_metrics()
}
