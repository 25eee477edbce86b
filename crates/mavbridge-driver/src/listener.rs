//! 链路监听线程
//!
//! 独占链路的接收端：逐条拉取已解码消息，按类别换算成遥测字段并合并进
//! [`TelemetryStore`]；COMMAND_ACK 追加进 [`AckLog`]。
//! 任何单条消息的错误都只记录日志，循环继续。

use crate::ack::AckLog;
use crate::config::ListenerConfig;
use crate::error::DriverError;
use crate::store::{TelemetryStore, TelemetryValue, unix_timestamp};
use mavbridge_link::message::MODE_FLAG_SAFETY_ARMED;
use mavbridge_link::{LinkError, LinkMessage, VehicleLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 心跳尚未给出模式名时使用
const UNKNOWN_MODE: &str = "UNKNOWN";

/// 电池剩余电量/电流的"未知"哨兵值
const BATTERY_UNKNOWN: i16 = -1;

/// 监听线程计数器
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// 成功接收的消息数
    pub received: AtomicU64,
    /// 接收/解码错误数
    pub errors: AtomicU64,
    /// 不关心的消息数
    pub ignored: AtomicU64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStatsSnapshot {
    pub received: u64,
    pub errors: u64,
    pub ignored: u64,
}

/// 把一条消息换算成遥测字段
///
/// `link_mode` 只对心跳有意义（链路当前认为的模式名）。
/// 不关心的类别返回空列表。
pub fn fold_message(
    msg: &LinkMessage,
    link_mode: Option<String>,
    config: &ListenerConfig,
) -> Vec<(&'static str, TelemetryValue)> {
    match msg {
        LinkMessage::Attitude { roll, pitch, yaw } => vec![
            ("roll", (*roll as f64).to_degrees().into()),
            ("pitch", (*pitch as f64).to_degrees().into()),
            ("yaw", (*yaw as f64).to_degrees().into()),
        ],
        LinkMessage::GlobalPosition {
            lat,
            lon,
            alt,
            relative_alt,
            vx,
            vz,
        } => vec![
            ("lat", (*lat as f64 / 1e7).into()),
            ("lon", (*lon as f64 / 1e7).into()),
            ("alt", (*alt as f64 / 1000.0).into()),
            ("relative_alt", (*relative_alt as f64 / 1000.0).into()),
            ("ground_speed", (*vx as f64 / 100.0).into()),
            ("vertical_speed", (*vz as f64 / 100.0).into()),
        ],
        LinkMessage::VfrHud {
            airspeed,
            groundspeed,
            heading,
            throttle,
            alt,
            climb,
        } => vec![
            ("airspeed", (*airspeed).into()),
            ("groundspeed", (*groundspeed).into()),
            ("heading", (*heading as i64).into()),
            ("throttle", (*throttle).into()),
            ("hud_alt", (*alt).into()),
            ("climb", (*climb).into()),
        ],
        LinkMessage::GpsRaw {
            fix_type,
            satellites_visible,
            eph,
        } => vec![
            ("gps_satellites", (*satellites_visible).into()),
            ("gps_hdop", (*eph as f64 / 100.0).into()),
            ("gps_fix", (*fix_type >= config.gps_min_fix_type).into()),
            ("gps_fix_type", (*fix_type).into()),
        ],
        LinkMessage::BatteryStatus {
            voltages,
            current_battery,
            battery_remaining,
        } => {
            // u16::MAX 表示该电芯未上报
            let voltage = voltages
                .first()
                .filter(|&&mv| mv != u16::MAX)
                .map(|&mv| mv as f64 / 1000.0)
                .unwrap_or(0.0);
            let current = if *current_battery == BATTERY_UNKNOWN {
                0.0
            } else {
                *current_battery as f64 / 100.0
            };
            let remaining = if *battery_remaining as i16 == BATTERY_UNKNOWN {
                100
            } else {
                *battery_remaining as i64
            };
            vec![
                ("battery_voltage", voltage.into()),
                ("battery_current", current.into()),
                ("battery_percentage", remaining.into()),
            ]
        },
        LinkMessage::Heartbeat {
            base_mode,
            system_status,
            ..
        } => vec![
            ("armed", (base_mode & MODE_FLAG_SAFETY_ARMED != 0).into()),
            (
                "mode",
                link_mode.unwrap_or_else(|| UNKNOWN_MODE.to_string()).into(),
            ),
            ("system_status", (*system_status).into()),
            ("timestamp", unix_timestamp().into()),
        ],
        LinkMessage::CommandAck { .. } | LinkMessage::Other(_) => Vec::new(),
    }
}

/// 监听主循环
///
/// # 参数
/// - `link`: 飞控链路（本线程是唯一调用 `recv` 的地方）
/// - `store`: 遥测存储
/// - `acks`: 应答日志
/// - `config`: 监听配置
/// - `is_running`: 运行标志
/// - `stats`: 计数器
pub fn listen_loop(
    link: Arc<dyn VehicleLink>,
    store: Arc<TelemetryStore>,
    acks: Arc<AckLog>,
    config: ListenerConfig,
    is_running: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
) {
    let backoff = Duration::from_millis(config.error_backoff_ms);

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Listener: is_running flag is false, exiting");
            break;
        }

        let msg = match link.recv() {
            Ok(msg) => {
                stats.received.fetch_add(1, Ordering::Relaxed);
                msg
            },
            Err(LinkError::Timeout) => continue,
            Err(LinkError::Closed) => {
                info!("Listener: vehicle link closed, exiting");
                is_running.store(false, Ordering::Release);
                break;
            },
            Err(e) => {
                error!("Listener: link receive error: {}", e);
                stats.errors.fetch_add(1, Ordering::Relaxed);
                thread::sleep(backoff);
                continue;
            },
        };

        if let LinkMessage::CommandAck { command, result } = msg {
            let seq = acks.push(command, result);
            debug!("COMMAND_ACK #{}: {:?} -> {}", seq, command, result);
            continue;
        }

        let link_mode = match msg {
            LinkMessage::Heartbeat { .. } => link.flight_mode(),
            _ => None,
        };
        let fields = fold_message(&msg, link_mode, &config);
        if fields.is_empty() {
            stats.ignored.fetch_add(1, Ordering::Relaxed);
            trace!("Ignoring {} message", msg.category());
            continue;
        }
        store.merge(fields);
    }

    trace!("Listener: loop exited");
}

trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map(|_| ()),
            // 真实链路的 recv() 可能一直阻塞，watchdog 线程随进程退出回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 监听线程状态句柄
///
/// 链路关闭后 `is_running()` 变为 `false`，上层据此停止服务。
#[derive(Debug, Clone)]
pub struct ListenerHealth {
    is_running: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
}

impl ListenerHealth {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot()
    }
}

/// 监听线程句柄
///
/// Drop 时停止线程并等待其退出（带超时）。
pub struct Listener {
    handle: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
    shutdown_timeout: Duration,
}

impl Listener {
    /// 启动监听线程
    pub fn spawn(
        link: Arc<dyn VehicleLink>,
        store: Arc<TelemetryStore>,
        acks: Arc<AckLog>,
        config: ListenerConfig,
    ) -> Result<Self, DriverError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ListenerStats::default());
        let shutdown_timeout = Duration::from_millis(config.shutdown_timeout_ms);

        let running = Arc::clone(&is_running);
        let loop_stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("link-listener".into())
            .spawn(move || listen_loop(link, store, acks, config, running, loop_stats))
            .map_err(|source| DriverError::Spawn {
                name: "link-listener",
                source,
            })?;

        Ok(Self {
            handle: Some(handle),
            is_running,
            stats,
            shutdown_timeout,
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot()
    }

    /// 可克隆的状态句柄，供其他线程或异步任务观察监听线程是否已退出
    pub fn health(&self) -> ListenerHealth {
        ListenerHealth {
            is_running: Arc::clone(&self.is_running),
            stats: Arc::clone(&self.stats),
        }
    }

    /// 停止并等待线程退出
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join_timeout(self.shutdown_timeout) {
                warn!("Listener thread did not exit cleanly: {:?}", e);
            } else {
                let stats = self.stats.snapshot();
                info!(
                    "Listener stopped (received {}, errors {}, ignored {})",
                    stats.received, stats.errors, stats.ignored
                );
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}
