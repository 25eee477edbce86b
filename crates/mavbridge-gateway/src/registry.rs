//! 客户端会话注册表
//!
//! 每个会话只保存一个有界发送队列，实际写 socket 由该会话自己的写任务完成，
//! 广播时只做非阻塞的 `try_send`。
//!
//! 广播遍历的是会话集合的一份快照，投递失败的会话在整轮结束后才移除；
//! 一个会话失败不影响其他会话。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// 会话 ID（从 1 开始单调递增）
pub type SessionId = u64;

/// 出站帧
pub type Payload = Arc<str>;

/// 已注册的会话
#[derive(Debug, Clone)]
struct Session {
    peer: String,
    tx: mpsc::Sender<Payload>,
    /// 连续因队列满丢弃的帧数
    consecutive_drops: Arc<AtomicU32>,
}

/// 单次投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Dropped,
    Failed,
}

/// 一轮广播的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    /// 本轮被移除的会话
    pub removed: Vec<SessionId>,
}

/// 会话注册表
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    max_consecutive_drops: u32,
}

impl SessionRegistry {
    /// # 参数
    /// - `queue_capacity`: 每个会话的出站队列长度
    /// - `max_consecutive_drops`: 连续丢帧超过该值视为会话已失效
    pub fn new(queue_capacity: usize, max_consecutive_drops: u32) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            max_consecutive_drops,
        }
    }

    /// 注册新会话，返回 ID 和该会话的出站队列接收端
    pub fn add(&self, peer: impl Into<String>) -> (SessionId, mpsc::Receiver<Payload>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let session = Session {
            peer: peer.into(),
            tx,
            consecutive_drops: Arc::new(AtomicU32::new(0)),
        };
        self.sessions.write().insert(id, session);
        (id, rx)
    }

    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// 向所有会话广播一帧
    pub fn broadcast(&self, payload: &str) -> BroadcastReport {
        let payload: Payload = Arc::from(payload);

        // 先复制一份会话列表，投递期间不持有锁
        let targets: Vec<(SessionId, Session)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, session) in &targets {
            match self.deliver(*id, session, &payload) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Failed => failed.push(*id),
            }
        }

        if !failed.is_empty() {
            let mut sessions = self.sessions.write();
            for id in failed {
                if let Some(session) = sessions.remove(&id) {
                    info!("Removed client {} ({}) after failed delivery", id, session.peer);
                    report.removed.push(id);
                }
            }
            info!("{} client(s) connected", sessions.len());
        }

        report
    }

    fn deliver(&self, id: SessionId, session: &Session, payload: &Payload) -> Delivery {
        match session.tx.try_send(Arc::clone(payload)) {
            Ok(()) => {
                session.consecutive_drops.store(0, Ordering::Relaxed);
                Delivery::Delivered
            },
            Err(TrySendError::Closed(_)) => {
                debug!("Client {} outbound queue closed", id);
                Delivery::Failed
            },
            Err(TrySendError::Full(_)) => {
                let drops = session.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops > self.max_consecutive_drops {
                    warn!("Client {} dropped {} frames in a row, disconnecting", id, drops);
                    Delivery::Failed
                } else {
                    Delivery::Dropped
                }
            },
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(64, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let registry = SessionRegistry::default();
        assert!(registry.is_empty());
        let (a, _rx_a) = registry.add("127.0.0.1:5001");
        let (b, _rx_b) = registry.add("127.0.0.1:5002");
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_broadcast_isolates_failed_session() {
        let registry = SessionRegistry::default();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for port in 0..5 {
            let (id, rx) = registry.add(format!("10.0.0.1:{}", 6000 + port));
            ids.push(id);
            receivers.push(Some(rx));
        }
        // 第 3 个会话的传输已断开
        receivers[2] = None;

        let report = registry.broadcast("hello");
        assert_eq!(report.delivered, 4);
        assert_eq!(report.removed, vec![ids[2]]);
        assert!(!registry.contains(ids[2]));
        assert_eq!(registry.len(), 4);

        for rx in receivers.iter_mut().flatten() {
            assert_eq!(rx.try_recv().unwrap().as_ref(), "hello");
        }
    }

    #[test]
    fn test_slow_session_dropped_after_limit() {
        let registry = SessionRegistry::new(1, 2);
        let (slow, _rx_slow) = registry.add("slow");
        let (fast, mut rx_fast) = registry.add("fast");

        for i in 0..4 {
            let report = registry.broadcast(&format!("frame {}", i));
            rx_fast.try_recv().unwrap();
            if i < 3 {
                assert!(registry.contains(slow), "removed too early at frame {}", i);
            } else {
                assert_eq!(report.removed, vec![slow]);
            }
        }
        assert!(!registry.contains(slow));
        assert!(registry.contains(fast));
    }
}
