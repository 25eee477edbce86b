//! # mavbridge-link
//!
//! 飞控链路抽象层。
//!
//! 上层（监听线程、命令序列器）只依赖 [`VehicleLink`] trait：
//! - 阻塞接收一条已解码的 [`LinkMessage`]
//! - 发送一条 [`LinkRequest`]（fire-and-forget，不等待应答）
//! - 查询链路当前认为的飞行模式名称
//! - 模式名称到数值 ID 的查找
//!
//! 真实链路由 [`MavlinkLink`] 基于 `mavlink` crate 实现；
//! 测试使用 `mock` feature 下的 `MockLink`。

pub mod error;
pub mod mavlink_link;
pub mod message;
pub mod mode;

#[cfg(feature = "mock")]
pub mod mock;

pub use error::LinkError;
pub use mavlink_link::{LinkConfig, MavlinkLink};
pub use message::{AckResult, CommandKind, LinkMessage, LinkRequest};
pub use mode::FlightModeMap;

#[cfg(feature = "mock")]
pub use mock::{MockLink, MockVehicle, VehicleBehavior};

/// 飞控链路接口
///
/// 实现者必须可以跨线程共享：监听线程独占 `recv()`，
/// 命令序列器在工作线程上并发调用 `send()`。
pub trait VehicleLink: Send + Sync {
    /// 阻塞等待下一条已解码消息
    ///
    /// 允许返回 [`LinkError::Timeout`]，调用方应视为"暂无消息"并继续。
    fn recv(&self) -> Result<LinkMessage, LinkError>;

    /// 发送一条请求，不等待应答
    fn send(&self, request: LinkRequest) -> Result<(), LinkError>;

    /// 链路根据最近心跳得出的飞行模式名称
    fn flight_mode(&self) -> Option<String>;

    /// 模式名称 -> 自定义模式 ID（大小写不敏感）
    fn mode_id(&self, name: &str) -> Option<u32>;
}
