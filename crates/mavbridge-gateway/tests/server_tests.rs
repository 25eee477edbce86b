//! WebSocket 端到端测试

use futures_util::{SinkExt, StreamExt};
use mavbridge_driver::{AckLog, Listener, ListenerConfig, Sequencer, SequencerConfig, TelemetryStore};
use mavbridge_gateway::{Broadcaster, BridgeServer, CommandGateway, GatewayError, SessionRegistry};
use mavbridge_link::{MockLink, MockVehicle, VehicleBehavior};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_websocket_session_round_trip() {
    let link = Arc::new(MockLink::new());
    let store = Arc::new(TelemetryStore::new());
    let acks = Arc::new(AckLog::new());
    let _listener = Listener::spawn(
        link.clone(),
        Arc::clone(&store),
        Arc::clone(&acks),
        ListenerConfig::default(),
    )
    .unwrap();
    let _vehicle = MockVehicle::start(link.clone(), "GUIDED", false, VehicleBehavior::default());

    let config = SequencerConfig {
        mode_timeout_ms: 1_000,
        poll_interval_ms: 10,
        ..SequencerConfig::default()
    };
    let sequencer = Arc::new(Sequencer::new(link.clone(), Arc::clone(&store), acks, config));
    let registry = Arc::new(SessionRegistry::default());
    let gateway = Arc::new(CommandGateway::new(sequencer, Arc::clone(&registry)));

    let server = BridgeServer::bind("127.0.0.1:0", Arc::clone(&registry), gateway)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.run());
    let broadcast_task = tokio::spawn(
        Broadcaster::new(Arc::clone(&store), Arc::clone(&registry), Duration::from_millis(50)).run(),
    );

    let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

    // 连上后应收到遥测
    let mut saw_telemetry = false;
    let mut saw_status = false;
    let deadline = Instant::now() + Duration::from_secs(3);
    while !(saw_telemetry && saw_status) {
        assert!(Instant::now() < deadline, "frames not received in time");
        let msg = timeout(Duration::from_secs(3), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else {
            continue;
        };
        let frame: Value = serde_json::from_str(&text).unwrap();
        match frame["type"].as_str() {
            Some("telemetry") if !saw_telemetry => {
                saw_telemetry = true;
                assert_eq!(frame["mode"], "GUIDED");
                ws.send(Message::text(
                    r#"{"command":"set_mode","params":{"mode":"LOITER"}}"#.to_string(),
                ))
                .await
                .unwrap();
            },
            Some("status") => {
                assert_eq!(frame["message"], "Mode change to LOITER successful");
                assert_eq!(frame["success"], true);
                saw_status = true;
            },
            _ => {},
        }
    }

    ws.close(None).await.unwrap();
    let start = Instant::now();
    while !registry.is_empty() {
        assert!(start.elapsed() < Duration::from_secs(2), "session not removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    broadcast_task.abort();
    server_task.abort();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let registry = Arc::new(SessionRegistry::default());
    let link = Arc::new(MockLink::new());
    let sequencer = Arc::new(Sequencer::new(
        link,
        Arc::new(TelemetryStore::new()),
        Arc::new(AckLog::new()),
        SequencerConfig::default(),
    ));
    let gateway = Arc::new(CommandGateway::new(sequencer, Arc::clone(&registry)));

    let first = BridgeServer::bind("127.0.0.1:0", Arc::clone(&registry), Arc::clone(&gateway))
        .await
        .unwrap();
    let taken = first.local_addr().unwrap().to_string();

    match BridgeServer::bind(&taken, registry, gateway).await {
        Err(GatewayError::Bind { addr, .. }) => assert_eq!(addr, taken),
        Err(other) => panic!("Expected bind error, got {}", other),
        Ok(_) => panic!("Expected bind error"),
    }
}
