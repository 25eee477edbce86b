//! 周期性遥测广播

use crate::frame::telemetry_frame;
use crate::registry::{BroadcastReport, SessionRegistry};
use mavbridge_driver::TelemetryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, trace};

/// 遥测广播器
pub struct Broadcaster {
    store: Arc<TelemetryStore>,
    registry: Arc<SessionRegistry>,
    period: Duration,
}

impl Broadcaster {
    pub fn new(store: Arc<TelemetryStore>, registry: Arc<SessionRegistry>, period: Duration) -> Self {
        Self {
            store,
            registry,
            period,
        }
    }

    /// 广播一次
    ///
    /// 没有会话或快照为空时跳过，返回 `None`。
    pub fn tick(&self) -> Option<BroadcastReport> {
        if self.registry.is_empty() {
            return None;
        }
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return None;
        }

        match telemetry_frame(&snapshot) {
            Ok(payload) => Some(self.registry.broadcast(&payload)),
            Err(e) => {
                error!("Failed to serialize telemetry: {}", e);
                None
            },
        }
    }

    /// 按固定周期广播，直到任务被取消
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Some(report) = self.tick() {
                trace!(
                    "Telemetry broadcast: {} delivered, {} dropped",
                    report.delivered, report.dropped
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<TelemetryStore>, Arc<SessionRegistry>, Broadcaster) {
        let store = Arc::new(TelemetryStore::new());
        let registry = Arc::new(SessionRegistry::default());
        let broadcaster = Broadcaster::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Duration::from_millis(100),
        );
        (store, registry, broadcaster)
    }

    #[test]
    fn test_skip_without_sessions_or_data() {
        let (store, registry, broadcaster) = setup();
        store.merge([("roll", 1.0)]);
        assert!(broadcaster.tick().is_none());

        let (_id, _rx) = registry.add("client");
        assert!(broadcaster.tick().is_some());
    }

    #[test]
    fn test_skip_with_empty_store() {
        let (_store, registry, broadcaster) = setup();
        let (_id, mut rx) = registry.add("client");
        assert!(broadcaster.tick().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tick_sends_tagged_snapshot() {
        let (store, registry, broadcaster) = setup();
        let (_id, mut rx) = registry.add("client");
        store.merge([("mode", "RTL")]);

        let report = broadcaster.tick().unwrap();
        assert_eq!(report.delivered, 1);
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "telemetry");
        assert_eq!(frame["mode"], "RTL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_broadcasts_periodically() {
        let (store, registry, broadcaster) = setup();
        let (_id, mut rx) = registry.add("client");
        store.merge([("yaw", 90.0)]);

        let task = tokio::spawn(broadcaster.run());
        for _ in 0..3 {
            let frame = rx.recv().await.unwrap();
            assert!(frame.contains("\"telemetry\""));
        }
        task.abort();
    }
}
