//! 网关集成测试
//!
//! MockLink + MockVehicle + 监听线程 + 序列器 + 网关 + 注册表，
//! 从客户端 JSON 帧一直走到状态帧。

use mavbridge_driver::{AckLog, Listener, ListenerConfig, Sequencer, SequencerConfig, TelemetryStore};
use mavbridge_gateway::{Broadcaster, CommandGateway, SessionRegistry};
use mavbridge_link::{MockLink, MockVehicle, VehicleBehavior};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Bridge {
    link: Arc<MockLink>,
    store: Arc<TelemetryStore>,
    registry: Arc<SessionRegistry>,
    gateway: CommandGateway,
    _listener: Listener,
}

fn config(timeout_ms: u64) -> SequencerConfig {
    SequencerConfig {
        mode_timeout_ms: timeout_ms,
        position_fix_timeout_ms: timeout_ms,
        arm_timeout_ms: timeout_ms,
        takeoff_ack_timeout_ms: timeout_ms,
        disarm_settle_ms: 0,
        mode_settle_ms: 0,
        arm_settle_ms: 0,
        poll_interval_ms: 10,
        ..SequencerConfig::default()
    }
}

fn bridge(config: SequencerConfig) -> Bridge {
    let link = Arc::new(MockLink::new());
    let store = Arc::new(TelemetryStore::new());
    let acks = Arc::new(AckLog::new());
    let listener = Listener::spawn(
        link.clone(),
        Arc::clone(&store),
        Arc::clone(&acks),
        ListenerConfig::default(),
    )
    .expect("spawn listener");
    let sequencer = Arc::new(Sequencer::new(link.clone(), Arc::clone(&store), acks, config));
    let registry = Arc::new(SessionRegistry::default());
    let gateway = CommandGateway::new(sequencer, Arc::clone(&registry));
    Bridge {
        link,
        store,
        registry,
        gateway,
        _listener: listener,
    }
}

/// 读取下一条状态帧（跳过遥测帧）
async fn next_status(rx: &mut mpsc::Receiver<Arc<str>>) -> Value {
    loop {
        let payload = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for status")
            .expect("session queue closed");
        let frame: Value = serde_json::from_str(&payload).unwrap();
        if frame["type"] == "status" {
            return frame;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_command_single_status_no_requests() {
    let bridge = bridge(config(200));
    let (session, mut rx) = bridge.registry.add("client");

    let handle = bridge
        .gateway
        .handle_text(session, r#"{"command":"do_a_flip","params":{}}"#);
    assert!(handle.is_none());

    let status = next_status(&mut rx).await;
    assert_eq!(status["message"], "Unknown command: do_a_flip");
    assert_eq!(status["success"], false);
    assert!(status["timestamp"].as_f64().unwrap() > 0.0);

    // 只有一条
    assert!(rx.try_recv().is_err());
    assert!(bridge.link.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_mode_rtl_end_to_end() {
    let bridge = bridge(config(2_000));
    let behavior = VehicleBehavior {
        mode_delay_beats: 2,
        ..VehicleBehavior::default()
    };
    let _vehicle = MockVehicle::start(bridge.link.clone(), "GUIDED", false, behavior);
    let (session, mut rx) = bridge.registry.add("client");

    let handle = bridge
        .gateway
        .handle_text(session, r#"{"command":"set_mode","params":{"mode":"RTL"}}"#)
        .expect("command dispatched");
    handle.await.unwrap();

    let status = next_status(&mut rx).await;
    assert_eq!(status["success"], true, "status: {}", status);
    assert_eq!(status["message"], "Mode change to RTL successful");
    assert_eq!(bridge.store.snapshot().get_str("mode"), Some("RTL"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_mode_rtl_times_out() {
    let bridge = bridge(config(300));
    let behavior = VehicleBehavior {
        accept_mode_changes: false,
        ..VehicleBehavior::default()
    };
    let _vehicle = MockVehicle::start(bridge.link.clone(), "GUIDED", false, behavior);
    let (session, mut rx) = bridge.registry.add("client");

    let start = Instant::now();
    bridge
        .gateway
        .handle_text(session, r#"{"command":"set_mode","params":{"mode":"RTL"}}"#)
        .expect("command dispatched")
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));

    let status = next_status(&mut rx).await;
    assert_eq!(status["success"], false);
    let message = status["message"].as_str().unwrap();
    assert!(message.contains("timed out"), "message: {}", message);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_command_does_not_block_broadcast() {
    let bridge = bridge(config(1_500));
    // 不应答解锁：arm 流程会一直等到超时
    let behavior = VehicleBehavior {
        arm_response: None,
        ..VehicleBehavior::default()
    };
    let _vehicle = MockVehicle::start(bridge.link.clone(), "GUIDED", false, behavior);
    let (session, mut rx) = bridge.registry.add("client");

    let handle = bridge
        .gateway
        .handle_text(session, r#"{"command":"arm"}"#)
        .expect("command dispatched");

    let broadcaster = Broadcaster::new(
        Arc::clone(&bridge.store),
        Arc::clone(&bridge.registry),
        Duration::from_millis(50),
    );
    let ticker = tokio::spawn(broadcaster.run());

    // 流程还在等待时，遥测照常送达
    let payload = timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("telemetry stalled by running command")
        .unwrap();
    let frame: Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(frame["type"], "telemetry");
    assert!(!handle.is_finished());

    handle.await.unwrap();
    let status = next_status(&mut rx).await;
    assert_eq!(status["success"], false);
    assert!(
        status["message"]
            .as_str()
            .unwrap()
            .starts_with("Arm command failed"),
        "status: {}",
        status
    );
    ticker.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_and_data_frames_are_ignored() {
    let bridge = bridge(config(200));
    let (session, mut rx) = bridge.registry.add("client");

    assert!(bridge.gateway.handle_text(session, "{not json").is_none());
    assert!(
        bridge
            .gateway
            .handle_text(session, r#"{"hello":"vehicle"}"#)
            .is_none()
    );
    assert!(bridge.registry.contains(session));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_param_reported_as_error() {
    let bridge = bridge(config(200));
    let (session, mut rx) = bridge.registry.add("client");

    assert!(
        bridge
            .gateway
            .handle_text(session, r#"{"command":"takeoff","params":{"altitude":"very"}}"#)
            .is_none()
    );
    let status = next_status(&mut rx).await;
    assert_eq!(status["success"], false);
    assert!(
        status["message"]
            .as_str()
            .unwrap()
            .starts_with("Error executing takeoff: invalid parameter 'altitude'")
    );
    assert!(bridge.link.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reaches_every_session() {
    let bridge = bridge(config(200));
    let (session, mut rx_a) = bridge.registry.add("a");
    let (_other, mut rx_b) = bridge.registry.add("b");

    bridge
        .gateway
        .handle_text(session, r#"{"command":"land"}"#)
        .expect("command dispatched")
        .await
        .unwrap();

    assert_eq!(next_status(&mut rx_a).await["message"], "Landing command sent");
    assert_eq!(next_status(&mut rx_b).await["message"], "Landing command sent");
}
