//! # mavbridge-driver
//!
//! 遥测聚合与命令序列层。
//!
//! ## 模块
//!
//! - [`store`]: 遥测快照存储（`ArcSwap`，整组原子替换）
//! - [`listener`]: 链路监听线程，把飞控消息折叠进快照
//! - [`ack`]: COMMAND_ACK 日志（带游标）
//! - [`sequencer`]: 解锁、起飞、模式切换等带保护的流程
//!
//! ## 数据流
//!
//! ```text
//! VehicleLink ──recv──> Listener ──merge──> TelemetryStore ──snapshot──> Broadcaster
//!      ^                   │                      │
//!      │                   └──push──> AckLog      │
//!      └──────send────── Sequencer <──poll────────┘
//! ```

pub mod ack;
pub mod command;
pub mod config;
pub mod error;
pub mod listener;
pub mod sequencer;
pub mod store;

pub use ack::{AckCursor, AckLog, AckRecord};
pub use command::{Command, CommandOutcome};
pub use config::{ListenerConfig, SequencerConfig};
pub use error::{DriverError, SequencerError};
pub use listener::{Listener, ListenerHealth, ListenerStatsSnapshot, fold_message};
pub use sequencer::Sequencer;
pub use store::{TelemetrySnapshot, TelemetryStore, TelemetryValue, unix_timestamp};
