//! # mavbridge-gateway
//!
//! 客户端一侧：会话注册表、遥测广播、命令网关和 WebSocket 服务端。
//!
//! 全部运行在 tokio 事件循环上；命令流程通过 `spawn_blocking` 放到阻塞线程池，
//! 慢命令不会拖住遥测广播或其他会话。

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod registry;
pub mod server;

pub use broadcaster::Broadcaster;
pub use config::ServerConfig;
pub use error::{GatewayError, RequestError};
pub use frame::{CommandRequest, Inbound, parse_inbound, status_frame, telemetry_frame};
pub use gateway::CommandGateway;
pub use registry::{BroadcastReport, SessionId, SessionRegistry};
pub use server::BridgeServer;
