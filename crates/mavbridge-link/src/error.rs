//! 链路层错误类型定义

use thiserror::Error;

/// 链路层错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    /// 底层 IO 错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 接收超时（没有新消息，非致命）
    #[error("Read timeout")]
    Timeout,

    /// 链路已关闭
    #[error("Link closed")]
    Closed,

    /// 消息解码失败
    #[error("Decode error: {0}")]
    Decode(String),

    /// 请求编码/发送失败
    #[error("Encode error: {0}")]
    Encode(String),

    /// 启动时未收到飞控心跳
    #[error("No heartbeat from vehicle within {timeout_ms} ms")]
    NoHeartbeat { timeout_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_display() {
        assert_eq!(LinkError::Timeout.to_string(), "Read timeout");
        assert_eq!(LinkError::Closed.to_string(), "Link closed");

        let msg = LinkError::NoHeartbeat { timeout_ms: 30_000 }.to_string();
        assert!(msg.contains("30000"), "message: {}", msg);

        let msg = LinkError::Decode("bad crc".to_string()).to_string();
        assert!(msg.contains("bad crc"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: LinkError = io.into();
        assert!(matches!(err, LinkError::Io(_)));
    }
}
