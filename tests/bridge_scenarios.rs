//! End-to-end scenarios through a running bridge: gateway, queues, executor
//! thread and scene.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use scene_bridge::types::{GenerationStatus, Operation, OperationBatch, ResponseStatus};
use scene_bridge::{Bridge, BridgeConfig, BridgeError, CallOutcome, OperationResult};

fn start() -> (TempDir, Bridge) {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig {
        output_dir: dir.path().join("out"),
        tick_interval_ms: 5,
        poll_interval_ms: 5,
        batch_timeout_secs: 10,
        script_timeout_secs: 10,
        preview_size: 128,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::start(config).unwrap();
    (dir, bridge)
}

fn batch(ops: &[(&str, serde_json::Value)]) -> OperationBatch {
    let operations = ops.iter().map(|(op, params)| Operation::new(*op, params.clone()));
    OperationBatch::new(operations.collect())
}

#[tokio::test]
async fn add_box_returns_its_name() {
    let (_dir, bridge) = start();
    let outcome = bridge
        .gateway()
        .process_operations(batch(&[("add_box", json!({"name": "B1", "size": [2, 2, 2]}))]))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!([{"op": "add_box", "status": "ok", "result": "B1"}])
    );
    bridge.shutdown();
}

#[tokio::test]
async fn unknown_op_does_not_stop_the_batch() {
    let (_dir, bridge) = start();
    let outcome = bridge
        .gateway()
        .process_operations(batch(&[
            ("explode", json!({})),
            ("add_box", json!({"name": "Kept"})),
        ]))
        .await
        .unwrap();

    let CallOutcome::Completed(results) = outcome else {
        panic!("timed out");
    };
    assert_eq!(
        results,
        vec![
            OperationResult::unsupported("explode"),
            OperationResult::ok("add_box", json!("Kept")),
        ]
    );
    bridge.shutdown();
}

#[tokio::test]
async fn concurrent_batches_each_get_their_own_results() {
    let (_dir, bridge) = start();
    let gateway = bridge.gateway().clone();

    let calls = (0..6).map(|i| {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let name = format!("Box{i}");
            let outcome = gateway
                .process_operations(batch(&[
                    ("add_box", json!({"name": name})),
                    ("translate", json!({"object": name, "vector": [i, 0, 0]})),
                ]))
                .await
                .unwrap();
            (name, outcome.completed().unwrap())
        })
    });

    for call in calls.collect::<Vec<_>>() {
        let (name, results) = call.await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], OperationResult::ok("add_box", json!(name)));
        assert_eq!(results[1].op, "translate");
        assert!(results[1].is_ok());
    }
    bridge.shutdown();
}

#[tokio::test]
async fn script_produces_artifacts_and_updates_status() {
    let (_dir, bridge) = start();
    let script = "\
import math
for i in range(3):
    scene.add_box('Leg', size=[0.1, 0.1, 1], location=(i, 0, 0))
scene.add_cylinder('Top', radius=1.5, depth=0.1, location=(1, 0, 1))
";
    let outcome = bridge.gateway().process_script(script).await.unwrap();
    let response = outcome.completed().unwrap();
    assert_eq!(response.status, ResponseStatus::Ok);

    let artifact = response.artifact.clone().unwrap();
    let exported = response.exported_artifacts.clone().unwrap();
    let output_dir = &bridge.config().output_dir;
    assert!(output_dir.join(&artifact).is_file());
    for file in &exported {
        assert!(output_dir.join(file).is_file(), "{file} was not written");
    }

    let status = bridge.gateway().generation_status();
    assert_eq!(status.status, GenerationStatus::Done);
    assert_eq!(status.artifact_name, Some(artifact));
    assert_eq!(status.exported_artifacts, exported);
    assert!(status.error.is_none());
    bridge.shutdown();
}

#[tokio::test]
async fn failing_script_reports_error_but_keeps_earlier_mutations() {
    let (_dir, bridge) = start();
    let outcome = bridge
        .gateway()
        .process_script("scene.add_box('Before')\nx = 1 / 0\n")
        .await
        .unwrap();
    let response = outcome.completed().unwrap();
    assert_eq!(response.status, ResponseStatus::Error);
    assert!(response.artifact.is_none());
    assert_eq!(
        response.error.as_deref(),
        Some("line 2: ZeroDivisionError: division by zero")
    );
    assert_eq!(bridge.gateway().generation_status().status, GenerationStatus::Error);

    // the box from line 1 is still in the scene
    let names = bridge
        .gateway()
        .process_operations(batch(&[("add_box", json!({"name": "Before"}))]))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(names[0], OperationResult::ok("add_box", json!("Before.001")));
    bridge.shutdown();
}

#[tokio::test]
async fn rejected_script_is_never_queued() {
    let (_dir, bridge) = start();
    let err = bridge
        .gateway()
        .process_script("import os\nos.system('ls')")
        .await
        .unwrap_err();
    let BridgeError::Rejected(rejection) = err else {
        panic!("expected a rejection, got {err}");
    };
    assert_eq!(rejection.reason(), "forbidden call detected: os.system");

    let status = bridge.gateway().generation_status();
    assert_eq!(status.status, GenerationStatus::Error);
    assert_eq!(status.error.as_deref(), Some("forbidden call detected: os.system"));
    bridge.shutdown();
}

#[tokio::test]
async fn hostile_nesting_is_rejected_and_the_bridge_keeps_serving() {
    let (_dir, bridge) = start();
    let scripts = [
        format!("x = {}1{}", "(".repeat(50_000), ")".repeat(50_000)),
        format!("x = 1{}", "+1".repeat(100_000)),
        format!("x = {}1", "-".repeat(100_000)),
    ];
    for script in &scripts {
        let err = bridge.gateway().process_script(script).await.unwrap_err();
        let BridgeError::Rejected(rejection) = err else {
            panic!("expected a rejection, got {err}");
        };
        assert!(rejection.is_syntax_error(), "{}", rejection.reason());
    }

    let outcome = bridge
        .gateway()
        .process_operations(batch(&[("add_box", json!({"name": "After"}))]))
        .await
        .unwrap();
    assert_eq!(outcome.completed().unwrap()[0], OperationResult::ok("add_box", json!("After")));
    bridge.shutdown();
}

#[tokio::test]
async fn slow_executor_times_out_and_late_response_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig {
        output_dir: dir.path().to_path_buf(),
        tick_interval_ms: 1500,
        poll_interval_ms: 5,
        batch_timeout_secs: 1,
        script_timeout_secs: 10,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::start(config).unwrap();
    // let the immediate first tick pass on an empty queue
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = bridge
        .gateway()
        .process_operations(batch(&[("add_box", json!({"name": "Late"}))]))
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"error": "timeout"}));

    // the abandoned task still runs: a script queued behind it sees the box
    let outcome = bridge
        .gateway()
        .process_script("count = len(scene.objects)\nratio = 1 / count\n")
        .await
        .unwrap();
    let response = outcome.completed().unwrap();
    assert_eq!(response.status, ResponseStatus::Ok, "{:?}", response.error);
    bridge.shutdown();
}

#[tokio::test]
async fn capabilities_and_ping() {
    let (_dir, bridge) = start();
    let gateway = bridge.gateway();
    assert_eq!(gateway.ping().status, "ok");
    let names: Vec<String> = gateway.list_capabilities().into_iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        ["reset", "add_box", "add_cylinder", "translate", "rotate", "boolean_diff", "export"]
    );
    bridge.shutdown();
}
