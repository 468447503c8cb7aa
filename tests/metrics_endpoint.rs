use serial_test::serial;
use std::time::Duration;
use tokio::time::sleep;

mod common;

// NOTE: Metrics use a global Prometheus registry.
// Tests are serial to avoid double-registration races.

#[tokio::test]
#[serial]
async fn metrics_endpoint_with_prometheus() {
    // ---
    common::setup_test_env();
    std::env::set_var("PASSKEY_METRICS_TYPE", "prom");

    let server = common::TestServer::new().await;

    // First, hit some endpoints to generate metrics
    let _ = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    let _ = server
        .client
        .post(server.url("/assertion/options"))
        .json(&serde_json::json!({ "username": "nobody" }))
        .send()
        .await
        .unwrap();
    let share_id = uuid::Uuid::new_v4();
    let _ = server
        .client
        .get(server.url(&format!("/shares/{share_id}")))
        .send()
        .await
        .unwrap();

    // Give metrics a moment to be recorded
    sleep(Duration::from_millis(50)).await;

    let res = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert!(
        res.status().is_success(),
        "Metrics endpoint should return success"
    );
    assert_eq!(
        res.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let body = res.text().await.unwrap();
    assert!(body.contains("http_request_duration_seconds"), "{body}");

    // Route templates, never concrete ids
    assert!(body.contains(r#"path="/shares/{id}""#), "{body}");
    assert!(!body.contains(&share_id.to_string()), "{body}");

    std::env::remove_var("PASSKEY_METRICS_TYPE");
}

#[tokio::test]
#[serial]
async fn metrics_endpoint_with_noop() {
    // ---
    common::setup_test_env();
    std::env::set_var("PASSKEY_METRICS_TYPE", "noop");

    let server = common::TestServer::new().await;
    let _ = server.client.get(server.url("/")).send().await.unwrap();

    let res = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();

    // Should still return success even with noop metrics
    assert!(
        res.status().is_success(),
        "Metrics endpoint should return success even with noop"
    );
    assert!(res.text().await.unwrap().is_empty());

    std::env::remove_var("PASSKEY_METRICS_TYPE");
}
