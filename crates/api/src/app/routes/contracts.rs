use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use hatchery_core::UnitManifest;
use hatchery_infra::OrchestratorError;

use crate::app::errors;
use crate::app::services::AppOrchestrator;

/// Register a unit; scheduling starts in the background when `cron` is set.
pub async fn post_contract(
    Extension(orch): Extension<Arc<AppOrchestrator>>,
    Json(manifest): Json<UnitManifest>,
) -> axum::response::Response {
    let result = tokio::task::spawn_blocking(move || {
        orch.register_unit(&manifest)?;
        let scheduled = orch.scheduled_units().contains(&manifest.name);
        Ok::<_, OrchestratorError>((manifest, scheduled))
    })
    .await;

    match result {
        Ok(Ok((manifest, scheduled))) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "txn_type": manifest.name,
                "image": manifest.image,
                "scheduled": scheduled,
            })),
        )
            .into_response(),
        Ok(Err(e)) => errors::orchestrator_error_to_response(e),
        Err(e) => errors::join_error_to_response(e),
    }
}
