//! Firmware deployment through the full stack: REST request → task
//! executor → MQTT desired-state publish → telemetry feed → device state.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use helpers::TestHarness;

#[tokio::test]
async fn firmware_deploy_same_version_is_rejected_fast() {
    let mut harness = TestHarness::empty();
    let device = harness.add_ready_device(1883, false).await;

    let mut report = orc_protocol::PropertiesReport::default();
    report.versions.sensor_fw_version = "020000".into();
    device.handle.merge_properties(report).await.unwrap();

    let body = serde_json::json!({
        "device_id": 1883,
        "module": "sensor_fw",
        "desired_version": "020000",
        "package_uri": "http://x/fw.bin",
        "hash_value": "abc"
    });
    let response = harness
        .router
        .clone()
        .oneshot(
            Request::post("/firmwares")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    // The executor accepts the submission (it's a distinct task_id);
    // the same-version guard fails inside the spawned task itself.
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(device.channel.published().await.is_empty());

    let history_response = harness
        .router
        .clone()
        .oneshot(
            Request::get("/deploy_history?device_id=1883")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = history_response.into_body().collect().await.unwrap().to_bytes();
    let page: orc_protocol::pagination::Page<orc_protocol::DeployHistoryEntry> =
        serde_json::from_slice(&body).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, orc_protocol::TaskStatus::Error);
}

#[tokio::test]
async fn firmware_deploy_succeeds_after_device_reports_done() {
    let mut harness = TestHarness::empty();
    let device = harness.add_ready_device(1883, false).await;
    let mut notifications = harness.notifications.subscribe();

    let body = serde_json::json!({
        "device_id": 1883,
        "module": "sensor_fw",
        "desired_version": "020100",
        "package_uri": "http://x/fw.bin",
        "hash_value": "abc"
    });
    let response = harness
        .router
        .clone()
        .oneshot(
            Request::post("/firmwares")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let _desired_state = device.channel.next_published().await.unwrap();

    let telemetry = orc_protocol::topics::telemetry();
    let mut done = orc_protocol::PropertiesReport::default();
    done.ota.update_status = "Done".into();
    done.versions.sensor_fw_version = "020100".into();
    device
        .driver
        .dispatch(&telemetry, &serde_json::to_vec(&done).unwrap())
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(device.handle.snapshot().state.name(), "ready");

    let mut saw_started = false;
    let mut saw_finished_ok = false;
    while let Ok(n) = notifications.try_recv() {
        match n {
            orc_protocol::Notification::TaskStarted { task_kind, .. }
                if task_kind == orc_protocol::TaskKind::Firmware =>
            {
                saw_started = true;
            }
            orc_protocol::Notification::TaskFinished {
                task_kind, status, ..
            } if task_kind == orc_protocol::TaskKind::Firmware => {
                saw_finished_ok = status == orc_protocol::TaskStatus::Success;
            }
            _ => {}
        }
    }
    assert!(saw_started);
    assert!(saw_finished_ok);
}
