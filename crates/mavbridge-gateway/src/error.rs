//! 网关层错误类型定义

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// 网关层错误类型
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 监听端口绑定失败（启动期致命）
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket 握手或收发错误
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// 配置取值非法
    #[error("Invalid server config '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// JSON 序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 客户端请求错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },
}
