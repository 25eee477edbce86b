//! 驱动层错误类型定义

use mavbridge_link::{AckResult, LinkError};
use thiserror::Error;

/// 命令流程错误
///
/// 除 `Link` 外都是流程内的"正常失败"（前置条件、超时、拒绝），
/// `Link` 表示请求根本没能发出去。
#[derive(Error, Debug)]
pub enum SequencerError {
    /// 模式名不在模式表中
    #[error("Unknown mode: {mode}")]
    UnknownMode { mode: String },

    /// 超时内快照未报告目标模式
    #[error("Mode change to {mode} timed out after {timeout_ms} ms")]
    ModeChangeTimeout { mode: String, timeout_ms: u64 },

    /// 超时内未获得 GPS 定位
    #[error("No position fix within {timeout_ms} ms")]
    NoPositionFix { timeout_ms: u64 },

    /// 解锁/起飞前切换引导模式失败
    #[error("Could not enter {mode} mode: {source}")]
    ModePreconditionFailed {
        mode: String,
        #[source]
        source: Box<SequencerError>,
    },

    /// 飞控拒绝解锁
    #[error("Arm rejected by vehicle ({result})")]
    ArmRejected { result: AckResult },

    /// 超时内未看到解锁心跳
    #[error("Arm not confirmed within {timeout_ms} ms")]
    ArmTimeout { timeout_ms: u64 },

    /// 超时内未收到起飞应答
    #[error("Takeoff not acknowledged within {timeout_ms} ms")]
    TakeoffAckTimeout { timeout_ms: u64 },

    /// 飞控拒绝起飞
    #[error("Takeoff rejected by vehicle ({result})")]
    TakeoffRejected { result: AckResult },

    /// 链路发送失败
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

/// 驱动层错误（线程生命周期）
#[derive(Error, Debug)]
pub enum DriverError {
    /// 线程创建失败
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_error_display() {
        let msg = SequencerError::ModeChangeTimeout {
            mode: "RTL".to_string(),
            timeout_ms: 10_000,
        }
        .to_string();
        assert!(msg.contains("RTL") && msg.contains("10000"), "message: {}", msg);

        let msg = SequencerError::ArmRejected {
            result: AckResult::Denied,
        }
        .to_string();
        assert_eq!(msg, "Arm rejected by vehicle (DENIED)");

        let msg = SequencerError::UnknownMode {
            mode: "WARP".to_string(),
        }
        .to_string();
        assert_eq!(msg, "Unknown mode: WARP");
    }

    #[test]
    fn test_precondition_keeps_source() {
        use std::error::Error;

        let err = SequencerError::ModePreconditionFailed {
            mode: "GUIDED".to_string(),
            source: Box::new(SequencerError::ModeChangeTimeout {
                mode: "GUIDED".to_string(),
                timeout_ms: 100,
            }),
        };
        assert!(err.to_string().contains("timed out"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_link_error() {
        let err: SequencerError = LinkError::Closed.into();
        assert!(matches!(err, SequencerError::Link(LinkError::Closed)));
    }
}
