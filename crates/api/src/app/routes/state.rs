use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Map, Value};

use hatchery_infra::{OrchestratorError, StateQuery};

use crate::app::services::AppOrchestrator;
use crate::app::{dto, errors};

pub async fn get_bucket(
    Extension(orch): Extension<Arc<AppOrchestrator>>,
    Path(bucket): Path<String>,
) -> axum::response::Response {
    query(orch, bucket, None).await
}

pub async fn get_key(
    Extension(orch): Extension<Arc<AppOrchestrator>>,
    Path((bucket, key)): Path<(String, String)>,
) -> axum::response::Response {
    query(orch, bucket, Some(key)).await
}

async fn query(
    orch: Arc<AppOrchestrator>,
    bucket: String,
    key: Option<String>,
) -> axum::response::Response {
    let result: Result<Result<StateQuery, OrchestratorError>, _> =
        tokio::task::spawn_blocking(move || orch.query_state(&bucket, key.as_deref())).await;

    match result {
        Ok(Ok(StateQuery::One(value))) => (StatusCode::OK, Json(dto::bytes_to_json(&value))).into_response(),
        Ok(Ok(StateQuery::All(entries))) => {
            let body: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, dto::bytes_to_json(&v)))
                .collect();
            (StatusCode::OK, Json(Value::Object(body))).into_response()
        }
        Ok(Err(e)) => errors::orchestrator_error_to_response(e),
        Err(e) => errors::join_error_to_response(e),
    }
}
