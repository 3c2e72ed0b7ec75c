use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use hatchery_infra::OrchestratorError;

pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    match &err {
        OrchestratorError::UnitNotFound(_) => json_error(StatusCode::NOT_FOUND, "unit_not_found", err.to_string()),
        OrchestratorError::TransactionNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "transaction_not_found", err.to_string())
        }
        OrchestratorError::KeyNotFound { .. } => json_error(StatusCode::NOT_FOUND, "key_not_found", err.to_string()),
        OrchestratorError::InvalidManifest(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_manifest", err.to_string())
        }
        OrchestratorError::ExecutionFailure(_) => {
            json_error(StatusCode::BAD_GATEWAY, "execution_failure", err.to_string())
        }
        OrchestratorError::ArtifactUnavailable(_) => {
            json_error(StatusCode::BAD_GATEWAY, "artifact_unavailable", err.to_string())
        }
        OrchestratorError::Job(_) => json_error(StatusCode::CONFLICT, "job_conflict", err.to_string()),
        OrchestratorError::PersistenceFailure(_)
        | OrchestratorError::Storage(_)
        | OrchestratorError::JobStart { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Blocking task panicked or was cancelled.
pub fn join_error_to_response(err: tokio::task::JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "blocking task failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "request task failed")
}
