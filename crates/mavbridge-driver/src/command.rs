//! 高层命令与执行结果

use crate::store::unix_timestamp;
use serde::Serialize;

/// 客户端可下发的命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Takeoff { altitude: f32 },
    Land,
    Arm,
    Disarm,
    Return,
    SetMode { mode: String },
    GotoPosition { north: f32, east: f32, down: f32 },
}

impl Command {
    /// 线上协议中的命令名
    pub fn name(&self) -> &'static str {
        match self {
            Command::Takeoff { .. } => "takeoff",
            Command::Land => "land",
            Command::Arm => "arm",
            Command::Disarm => "disarm",
            Command::Return => "return",
            Command::SetMode { .. } => "set_mode",
            Command::GotoPosition { .. } => "goto_position",
        }
    }

    /// 是否为需要等待飞控确认的多步流程
    ///
    /// 这类流程同一时刻只能有一个在执行；只发送一次请求的命令不受限制，
    /// 降落可以随时打断正在等待的流程。
    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            Command::Takeoff { .. } | Command::Arm | Command::Return | Command::SetMode { .. }
        )
    }
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    /// Unix 时间戳（秒）
    pub timestamp: f64,
}

impl CommandOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: unix_timestamp(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: unix_timestamp(),
        }
    }
}
