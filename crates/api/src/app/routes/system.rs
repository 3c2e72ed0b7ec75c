use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppOrchestrator;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn list_jobs(Extension(orch): Extension<Arc<AppOrchestrator>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "items": orch.scheduled_units(),
        "stats": orch.job_stats(),
    }))
}
