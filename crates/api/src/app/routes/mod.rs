use axum::{
    Router,
    routing::{get, post},
};

pub mod contracts;
pub mod state;
pub mod system;
pub mod transactions;

/// Router for every resource endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/transaction", post(transactions::post_transaction))
        .route("/transaction/:id", get(transactions::get_transaction))
        .route("/contract", post(contracts::post_contract))
        .route("/get/:bucket", get(state::get_bucket))
        .route("/get/:bucket/:key", get(state::get_key))
        .route("/jobs", get(system::list_jobs))
}
