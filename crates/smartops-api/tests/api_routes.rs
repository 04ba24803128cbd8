//! Router-level tests: requests go through axum routing and extractors.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use smartops_api::build_router;
use smartops_lifecycle::{Lifecycle, QueueError, TaskQueue};
use smartops_state::{StateStore, TaskRecord};
use tower::ServiceExt;

const BLUEPRINT: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports:
  - port: 80
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 3
  template:
    metadata:
      labels:
        name: web
    spec:
      containers:
      - name: nginx
        image: nginx
";

#[derive(Default)]
struct RecordingQueue {
    sent: Mutex<Vec<TaskRecord>>,
}

impl TaskQueue for RecordingQueue {
    fn send(&self, task: &TaskRecord) -> Result<(), QueueError> {
        self.sent.lock().unwrap().push(task.clone());
        Ok(())
    }
}

fn test_router() -> (Router, Arc<RecordingQueue>) {
    let store = StateStore::open_in_memory().unwrap();
    let queue = Arc::new(RecordingQueue::default());
    (build_router(Lifecycle::new(store), queue.clone()), queue)
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Body>, json: bool) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if json {
        req = req.header("content-type", "application/json");
    }
    let req = req.body(body.unwrap_or_else(Body::empty)).unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    call(router, method, uri, Some(Body::from(body.to_string())), true).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    call(router, "GET", uri, None, false).await
}

#[tokio::test]
async fn app_setup_walks_the_creation_steps() {
    let (router, _) = test_router();

    let (status, body) = send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"]["state"], "CREATING_STEP_0");

    let (status, body) = send_json(
        &router,
        "PUT",
        "/api/v1/apps/1/sla",
        json!({"error_rate": "0.01", "latency": 200}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cost"], 100.0);

    let (status, body) = call(
        &router,
        "PUT",
        "/api/v1/apps/1/blueprint",
        Some(Body::from(BLUEPRINT)),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entrypoints"], json!(["web"]));

    let (_, body) = get(&router, "/api/v1/apps/1").await;
    assert_eq!(body["data"]["pods"], 3);
    assert_eq!(body["data"]["status"]["state"], "CREATING_STEP_2");

    let (status, _) = send_json(&router, "PATCH", "/api/v1/apps/1", json!({"entrypoint": "web"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send_json(
        &router,
        "PATCH",
        "/api/v1/apps/1",
        json!({"test_plan": {"url": "/", "load": 100}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"]["state"], "CREATING_STEP_4");
}

#[tokio::test]
async fn invalid_blueprint_is_not_acceptable() {
    let (router, _) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;

    let bad = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
    let (status, body) = call(&router, "PUT", "/api/v1/apps/1/blueprint", Some(Body::from(bad)), false).await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(body["success"], false);

    let (_, body) = get(&router, "/api/v1/apps/1/status").await;
    assert_eq!(body["data"]["state"], "CREATING_STEP_0");
}

#[tokio::test]
async fn unknown_entrypoint_is_a_bad_request() {
    let (router, _) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;
    call(&router, "PUT", "/api/v1/apps/1/blueprint", Some(Body::from(BLUEPRINT)), false).await;

    let (status, _) = send_json(&router, "PATCH", "/api/v1/apps/1", json!({"entrypoint": "db"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&router, "/api/v1/apps/1/status").await;
    assert_eq!(body["data"]["state"], "CREATING_STEP_2");
}

#[tokio::test]
async fn deploy_is_accepted_and_locks_the_app() {
    let (router, queue) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;
    call(&router, "PUT", "/api/v1/apps/1/blueprint", Some(Body::from(BLUEPRINT)), false).await;

    let (status, body) = call(&router, "POST", "/api/v1/apps/1/deploy", None, false).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["message"], "Deployment task sent.");
    assert_eq!(queue.sent.lock().unwrap()[0].name, "smartops.tasks.deploy_app");

    let (_, body) = get(&router, "/api/v1/apps/1/status").await;
    assert_eq!(body["data"]["state"], "LAUNCHING");

    // In flight: no edits, no deletes, no second deploy.
    let (status, _) = call(&router, "DELETE", "/api/v1/apps/1", None, false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&router, "POST", "/api/v1/apps/1/dryrun", None, false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(queue.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deploy_without_blueprint_is_not_found() {
    let (router, queue) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;

    let (status, _) = call(&router, "POST", "/api/v1/apps/1/deploy", None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(queue.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn capacity_plan_round_trip() {
    let (router, _) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;
    call(&router, "PUT", "/api/v1/apps/1/blueprint", Some(Body::from(BLUEPRINT)), false).await;
    call(&router, "POST", "/api/v1/apps/1/dryrun", None, false).await;

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/v1/apps/1/capacity-plans",
        json!({"name": "capacity_plan_1", "is_auto": true, "config": {"web": 2}}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan_id = body["data"]["id"].as_u64().unwrap();

    let (_, body) = get(&router, &format!("/api/v1/capacity-plans/{plan_id}")).await;
    assert_eq!(body["data"]["status"]["state"], "PLAN_GENERATED");
    let (_, body) = get(&router, "/api/v1/apps/1/capacity-plans").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = get(&router, "/api/v1/apps/1/status").await;
    assert_eq!(body["data"]["state"], "PLAN_GENERATED");
}

#[tokio::test]
async fn delete_app_then_gone() {
    let (router, _) = test_router();
    send_json(&router, "POST", "/api/v1/apps", json!({"name": "shop"})).await;

    let (status, _) = call(&router, "DELETE", "/api/v1/apps/1", None, false).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&router, "/api/v1/apps/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
