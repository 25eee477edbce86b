//! COMMAND_ACK 记录
//!
//! 监听线程是链路的唯一读者，收到的应答全部追加到这里。
//! 等待方在发送请求前取一个游标，之后只看游标之后的应答，
//! 多个并发流程互不"抢走"对方的应答。

use mavbridge_link::{AckResult, CommandKind};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// 默认保留的应答条数
const DEFAULT_CAPACITY: usize = 64;

/// 一条应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub seq: u64,
    pub command: CommandKind,
    pub result: AckResult,
}

/// 应答游标（指向下一条将要写入的序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AckCursor(u64);

struct AckInner {
    next_seq: u64,
    records: VecDeque<AckRecord>,
}

/// 有界、带序号的应答日志
pub struct AckLog {
    inner: Mutex<AckInner>,
    capacity: usize,
}

impl AckLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(AckInner {
                next_seq: 0,
                records: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
        }
    }

    /// 追加一条应答，返回其序号
    pub fn push(&self, command: CommandKind, result: AckResult) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(AckRecord {
            seq,
            command,
            result,
        });
        seq
    }

    pub fn cursor(&self) -> AckCursor {
        AckCursor(self.inner.lock().next_seq)
    }

    /// 游标之后、指定命令的所有应答（按到达顺序）
    pub fn since(&self, cursor: AckCursor, command: CommandKind) -> Vec<AckRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.seq >= cursor.0 && r.command == command)
            .copied()
            .collect()
    }
}

impl Default for AckLog {
    fn default() -> Self {
        Self::new()
    }
}
