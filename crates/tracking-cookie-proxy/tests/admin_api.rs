//! Admin API served over a real listener.

mod common;

use common::TestProxy;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracking_cookie_proxy::admin_api::AdminApiServer;

async fn start_admin(proxy: &TestProxy) -> (SocketAddr, broadcast::Sender<()>) {
    let server = AdminApiServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        Arc::clone(&proxy.controller),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown, _) = broadcast::channel(1);
    let rx = shutdown.subscribe();
    tokio::spawn(async move { server.run(rx).await });
    (addr, shutdown)
}

#[tokio::test]
async fn test_admin_api_reports_and_resets_leaks() {
    let proxy = TestProxy::start().await;
    let (admin, shutdown) = start_admin(&proxy).await;
    let client = reqwest::Client::new();
    let base = format!("http://{admin}");

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["running"], true);

    let store = proxy.controller.leak_store();
    store.record_leak("S1", "tracker.test");
    store.record_leak("S1", "ads.test");

    let hosts: Value = client
        .get(format!("{base}/sessions/S1/leaky-hosts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        hosts,
        json!({"sessionId": "S1", "hosts": ["ads.test", "tracker.test"]})
    );

    let sessions: Value = client
        .get(format!("{base}/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions["sessions"], json!(["S1"]));

    let reset = client
        .delete(format!("{base}/sessions/S1"))
        .send()
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::NO_CONTENT);
    let again = client
        .delete(format!("{base}/sessions/S1"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    tracking_cookie_proxy::metrics::record_leak();
    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("pto_leaks_recorded_total"));

    let _ = shutdown.send(());
    proxy.stop().await;
}
