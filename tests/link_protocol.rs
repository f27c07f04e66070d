/// End-to-end tests for the TCP telemetry link
///
/// Run with: cargo test --test link_protocol -- --nocapture

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cubesat_ai_server::client::{send_and_receive, DEFAULT_TIMEOUT};
use cubesat_ai_server::types::{LinkRequest, SensorReadings};
use cubesat_ai_server::{stub, ConnectionAcceptor, LinkContext, ServerConfig};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start_server() -> (SocketAddr, Arc<LinkContext>) {
    let cfg = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..Default::default()
    };
    let ctx = Arc::new(LinkContext::from_config(&cfg));
    let acceptor = ConnectionAcceptor::bind(&cfg, Arc::clone(&ctx))
        .await
        .expect("bind");
    let addr = acceptor.local_addr().expect("local addr");
    tokio::spawn(acceptor.run());
    (addr, ctx)
}

async fn raw_exchange(addr: SocketAddr, body: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(body).await.expect("write");
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server should close the connection")
        .expect("read");
    out
}

fn nominal_sensors() -> SensorReadings {
    SensorReadings {
        battery_soc: Some(80.0),
        battery_voltage: Some(7.5),
        board_temp: Some(25.0),
        battery_current: Some(0.1),
        mppt_power: Some(3.0),
        panel_voltage: Some(7.8),
        bus_current: Some(0.3),
        mppt_duty: Some(0.6),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_nominal_telemetry_reply() {
    println!("\n=== Test: Nominal Telemetry ===");
    let (addr, _) = start_server().await;

    let req = LinkRequest { sensors: Some(nominal_sensors()), frame: None };
    let reply = send_and_receive(addr, &req, DEFAULT_TIMEOUT).await.expect("reply");

    assert_eq!(reply["anomaly"]["label"], "nominal");
    assert_eq!(reply["anomaly"]["recommended_action"], "none");
    assert_eq!(reply["anomaly"]["score"], 0.0);
    assert_eq!(reply["action"], "none");
    assert!(reply["timestamp"].as_f64().unwrap() > 0.0);
    assert!(reply.get("corrections").is_some());
    assert!(reply.get("obstacle").is_none());
    println!("✓ {}", reply);
}

#[tokio::test]
async fn test_frame_and_sensors_reply() {
    println!("\n=== Test: Frame + Sensors ===");
    let (addr, _) = start_server().await;

    let mut sensors = nominal_sensors();
    sensors.battery_soc = Some(20.0);
    let req = LinkRequest {
        sensors: Some(sensors),
        frame: Some("aGVsbG8gd29ybGQ=".into()),
    };
    let reply = send_and_receive(addr, &req, DEFAULT_TIMEOUT).await.expect("reply");

    assert_eq!(reply["obstacle"]["object"], "debris");
    assert_eq!(reply["obstacle"]["distance_m"], 20.0);
    assert_eq!(reply["anomaly"]["label"], "deep_discharge");
    assert_eq!(reply["action"], "shed_noncritical");
    println!("✓ {}", reply);
}

#[tokio::test]
async fn test_malformed_request_then_server_keeps_accepting() {
    println!("\n=== Test: Malformed Request ===");
    let (addr, _) = start_server().await;

    let out = raw_exchange(addr, b"not valid json").await;
    let v: Value = serde_json::from_slice(&out).expect("error reply is JSON");
    let obj = v.as_object().expect("object");
    assert_eq!(obj.len(), 1, "only the error key: {}", v);
    assert!(!obj["error"].as_str().unwrap().is_empty());
    println!("✓ Error reply: {}", v);

    let req = LinkRequest { sensors: Some(nominal_sensors()), frame: None };
    let reply = send_and_receive(addr, &req, DEFAULT_TIMEOUT).await.expect("reply");
    assert_eq!(reply["anomaly"]["label"], "nominal");
    println!("✓ Server still accepting");
}

#[tokio::test]
async fn test_undecodable_frame_keeps_telemetry() {
    println!("\n=== Test: Undecodable Frame ===");
    let (addr, ctx) = start_server().await;
    let out = raw_exchange(addr, br#"{"frame": "%%%", "sensors": {"battery_soc": 20.0}}"#).await;
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert!(v.get("error").is_none(), "unexpected error reply: {}", v);
    assert_eq!(v["obstacle"]["object"], "debris");
    assert_eq!(v["anomaly"]["label"], "deep_discharge");
    assert_eq!(ctx.evaluator.history().len(), 1);
    println!("✓ {}", v);
}

#[tokio::test]
async fn test_silent_client_does_not_block_others() {
    let (addr, _) = start_server().await;

    // connects and never sends
    let _idle = TcpStream::connect(addr).await.unwrap();

    let req = LinkRequest { sensors: Some(nominal_sensors()), frame: None };
    let reply = send_and_receive(addr, &req, DEFAULT_TIMEOUT).await.expect("reply");
    assert!(reply.get("anomaly").is_some());
}

#[tokio::test]
async fn test_bus_surge_across_connections() {
    println!("\n=== Test: Trend Rule Across Sessions ===");
    let (addr, _) = start_server().await;

    let first = LinkRequest { sensors: Some(nominal_sensors()), frame: None };
    send_and_receive(addr, &first, DEFAULT_TIMEOUT).await.unwrap();

    let mut surge = nominal_sensors();
    surge.battery_voltage = Some(7.2);
    surge.bus_current = Some(0.7);
    let reply = send_and_receive(addr, &LinkRequest { sensors: Some(surge), frame: None }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply["anomaly"]["label"], "power_bus_surge");
    assert_eq!(reply["action"], "shed_noncritical");
    println!("✓ History shared between sessions");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_fill_history() {
    println!("\n=== Test: Concurrent Sessions ===");
    let (addr, ctx) = start_server().await;

    let requests = (0..20).map(|_| {
        let req = LinkRequest {
            sensors: Some(stub::read_all_sensors(&mut rand::thread_rng())),
            frame: None,
        };
        async move { send_and_receive(addr, &req, DEFAULT_TIMEOUT).await }
    });
    let replies = futures::future::join_all(requests).await;

    for reply in &replies {
        let reply = reply.as_ref().expect("reply");
        let score = reply["anomaly"]["score"].as_f64().unwrap();
        let confidence = reply["anomaly"]["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert!((0.0..=1.0).contains(&confidence));
    }
    assert_eq!(ctx.evaluator.history().len(), 20);

    for s in ctx.evaluator.history().snapshot() {
        assert!(s.battery_soc >= 60.0, "no partially written records");
    }
    println!("✓ {} concurrent sessions recorded", replies.len());
}
