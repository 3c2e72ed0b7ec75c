use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use hatchery_core::TransactionId;

use crate::app::services::AppOrchestrator;
use crate::app::{dto, errors};

/// Run a unit (when `txn_type` is set) or append the payload verbatim.
pub async fn post_transaction(
    Extension(orch): Extension<Arc<AppOrchestrator>>,
    Json(body): Json<dto::PostTransactionRequest>,
) -> axum::response::Response {
    let payload = body.payload_bytes();
    let unit = body.txn_type.filter(|t| !t.is_empty());

    let result = tokio::task::spawn_blocking(move || match unit {
        Some(unit) => orch.submit(&unit, &payload),
        None => Ok(orch.post_raw(&payload)),
    })
    .await;

    match result {
        Ok(Ok(txn)) => (StatusCode::OK, Json(dto::transaction_to_json(&txn))).into_response(),
        Ok(Err(e)) => errors::orchestrator_error_to_response(e),
        Err(e) => errors::join_error_to_response(e),
    }
}

pub async fn get_transaction(
    Extension(orch): Extension<Arc<AppOrchestrator>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransactionId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    match orch.transaction(id) {
        Ok(txn) => (StatusCode::OK, Json(dto::transaction_to_json(&txn))).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
