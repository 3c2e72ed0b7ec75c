#![cfg(unix)]

use std::sync::Arc;

use hatchery_api::app::services::{AppOrchestrator, build_services};
use hatchery_api::config::{Config, ExecutorKind, IN_MEMORY_HEAP};
use hatchery_core::Ledger;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    orchestrator: Arc<AppOrchestrator>,
    handle: tokio::task::JoinHandle<()>,
    _library_dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let library_dir = tempfile::tempdir().expect("failed to create library dir");
        let config = Config {
            bucket: "hatchery".to_string(),
            heap_path: IN_MEMORY_HEAP.to_string(),
            library_path: library_dir.path().join("contracts"),
            executor: ExecutorKind::Host,
            ..Config::default()
        };
        let orchestrator = build_services(&config).expect("failed to wire services");

        // Same router as prod, bound to an ephemeral port.
        let app = hatchery_api::app::build_app(orchestrator.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            orchestrator,
            handle,
            _library_dir: library_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, client: &reqwest::Client, manifest: serde_json::Value) -> reqwest::Response {
        client.post(self.url("/contract")).json(&manifest).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.orchestrator.shutdown();
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn raw_transaction_round_trips_through_ledger() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/transaction"))
        .json(&json!({ "payload": "just a note" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let posted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(posted["content"], "just a note");

    let id = posted["id"].as_str().unwrap();
    let res = client.get(srv.url(&format!("/transaction/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched, posted);
}

#[tokio::test]
async fn contract_output_lands_in_heap_and_ledger() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = srv
        .register(&client, json!({ "txn_type": "echo", "image": "local/echo", "cmd": "cat" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/transaction"))
        .json(&json!({ "txn_type": "echo", "payload": { "a": 1, "b": "x" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["content"], json!({ "a": 1, "b": "x" }));

    let a: serde_json::Value = client
        .get(srv.url("/get/hatchery/a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(a, json!(1));

    let all: serde_json::Value = client
        .get(srv.url("/get/hatchery"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all, json!({ "a": 1, "b": "x" }));

    assert_eq!(srv.orchestrator.ledger().len(), 1);
}

#[tokio::test]
async fn unknown_unit_and_missing_entries_are_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/transaction"))
        .json(&json!({ "txn_type": "ghost", "payload": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unit_not_found");

    let res = client.get(srv.url("/get/hatchery/nothing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let missing = hatchery_core::TransactionId::new();
    let res = client.get(srv.url(&format!("/transaction/{missing}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/transaction/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failing_unit_is_bad_gateway_and_not_appended() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = srv
        .register(&client, json!({ "txn_type": "broken", "image": "local/broken", "cmd": "false" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(srv.url("/transaction"))
        .json(&json!({ "txn_type": "broken", "payload": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(srv.orchestrator.ledger().is_empty());
}

#[tokio::test]
async fn invalid_manifest_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = srv
        .register(&client, json!({ "txn_type": "nameless-image", "image": "" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .register(&client, json!({ "txn_type": "bad-cron", "image": "x", "cmd": "true", "cron": "sometimes" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scheduled_contract_is_listed_under_jobs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = srv
        .register(
            &client,
            json!({ "txn_type": "ticker", "image": "local/ticker", "cmd": "true", "cron": "50ms" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["scheduled"], true);

    let jobs: serde_json::Value = client.get(srv.url("/jobs")).send().await.unwrap().json().await.unwrap();
    assert_eq!(jobs["items"], json!(["ticker"]));

    // Re-registering without cron unschedules the unit.
    let res = srv
        .register(&client, json!({ "txn_type": "ticker", "image": "local/ticker", "cmd": "true" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let jobs: serde_json::Value = client.get(srv.url("/jobs")).send().await.unwrap().json().await.unwrap();
    assert_eq!(jobs["items"], json!([]));
}
