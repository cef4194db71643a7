//! HTTP transport tests driven through the router with `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use scene_bridge::server::http::router;
use scene_bridge::{Bridge, BridgeConfig};

fn start() -> (TempDir, Bridge) {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig {
        output_dir: dir.path().to_path_buf(),
        tick_interval_ms: 5,
        poll_interval_ms: 5,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::start(config).unwrap();
    (dir, bridge)
}

fn rpc_request(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn process_operations_over_http() {
    let (_dir, bridge) = start();
    let app = router(bridge.handler());

    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "process_operations",
        "params": [{"operations": [{"op": "add_box", "params": {"name": "B1", "size": [2, 2, 2]}}]}]
    });
    let response = app
        .oneshot(rpc_request("/rpc", &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [{"op": "add_box", "status": "ok", "result": "B1"}]
        })
    );
    bridge.shutdown();
}

#[tokio::test]
async fn rpc2_alias_and_named_params() {
    let (_dir, bridge) = start();
    let app = router(bridge.handler());

    let body = json!({
        "jsonrpc": "2.0",
        "id": "s1",
        "method": "process_script",
        "params": {"code": "```python\nimport math\nscene.add_box('A')\n```"}
    });
    let response = app
        .oneshot(rpc_request("/RPC2", &body.to_string()))
        .await
        .unwrap();
    let value = json_body(response).await;
    assert_eq!(value["result"]["status"], json!("ok"));
    assert!(value["result"]["artifact"].as_str().unwrap().ends_with(".svg"));
    assert_eq!(value["result"]["exportedArtifacts"].as_array().unwrap().len(), 2);
    bridge.shutdown();
}

#[tokio::test]
async fn sanitizer_rejection_is_an_rpc_error() {
    let (_dir, bridge) = start();
    let app = router(bridge.handler());

    let body = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "process_script",
        "params": ["import subprocess\nsubprocess.run(['ls'])"]
    });
    let response = app
        .oneshot(rpc_request("/rpc", &body.to_string()))
        .await
        .unwrap();
    let value = json_body(response).await;
    assert_eq!(value["error"]["code"], json!(-32001));
    assert_eq!(
        value["error"]["data"]["reason"],
        json!("forbidden call detected: subprocess.run")
    );
    bridge.shutdown();
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let (_dir, bridge) = start();
    let response = router(bridge.handler())
        .oneshot(rpc_request("/rpc", "{\"jsonrpc\": "))
        .await
        .unwrap();
    let value = json_body(response).await;
    assert_eq!(value["id"], Value::Null);
    assert_eq!(value["error"]["code"], json!(-32700));
    bridge.shutdown();
}

#[tokio::test]
async fn notification_has_no_body() {
    let (_dir, bridge) = start();
    let response = router(bridge.handler())
        .oneshot(rpc_request("/rpc", r#"{"jsonrpc": "2.0", "method": "ping"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    bridge.shutdown();
}

#[tokio::test]
async fn health_and_status() {
    let (_dir, bridge) = start();
    let handler = bridge.handler();

    let health = router(Arc::clone(&handler))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        json_body(health).await,
        json!({"status": "ok", "info": "scene bridge alive"})
    );

    let status = router(handler)
        .oneshot(rpc_request(
            "/rpc",
            r#"{"jsonrpc": "2.0", "id": 3, "method": "generation_status"}"#,
        ))
        .await
        .unwrap();
    let value = json_body(status).await;
    assert_eq!(value["result"]["status"], json!("idle"));
    assert_eq!(value["result"]["exportedArtifacts"], json!([]));
    bridge.shutdown();
}
