//! 监听器与命令序列器配置
//!
//! 时间参数统一用毫秒整数，便于直接写进 TOML。

use serde::Deserialize;
use std::time::Duration;

/// 命令序列器配置
///
/// # Example
///
/// ```
/// use mavbridge_driver::SequencerConfig;
///
/// // 默认配置（模式切换 10s，GPS 等待 30s，轮询 100ms）
/// let config = SequencerConfig::default();
///
/// // 测试里常用的短超时
/// let config = SequencerConfig {
///     mode_timeout_ms: 200,
///     poll_interval_ms: 10,
///     ..SequencerConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// 模式切换等待超时
    pub mode_timeout_ms: u64,
    /// 解锁前等待 GPS 定位的超时
    pub position_fix_timeout_ms: u64,
    /// 解锁确认超时
    pub arm_timeout_ms: u64,
    /// 起飞应答超时
    pub takeoff_ack_timeout_ms: u64,
    /// 起飞前上锁后的等待
    pub disarm_settle_ms: u64,
    /// 切到引导模式后的等待
    pub mode_settle_ms: u64,
    /// 解锁成功后、发起飞前的等待
    pub arm_settle_ms: u64,
    /// 轮询间隔
    pub poll_interval_ms: u64,
    /// 接受外部位置指令的模式
    pub guided_mode: String,
    /// 返航模式
    pub return_mode: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            mode_timeout_ms: 10_000,
            position_fix_timeout_ms: 30_000,
            arm_timeout_ms: 10_000,
            takeoff_ack_timeout_ms: 10_000,
            disarm_settle_ms: 2_000,
            mode_settle_ms: 1_000,
            arm_settle_ms: 2_000,
            poll_interval_ms: 100,
            guided_mode: "GUIDED".to_string(),
            return_mode: "RTL".to_string(),
        }
    }
}

impl SequencerConfig {
    pub fn mode_timeout(&self) -> Duration {
        Duration::from_millis(self.mode_timeout_ms)
    }

    pub fn position_fix_timeout(&self) -> Duration {
        Duration::from_millis(self.position_fix_timeout_ms)
    }

    pub fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.arm_timeout_ms)
    }

    pub fn takeoff_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.takeoff_ack_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // 0 会让轮询退化成忙等
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// 链路监听器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// `gps_fix` 为 true 所需的最小 fix_type（SITL 下 1 即可）
    pub gps_min_fix_type: u8,
    /// 接收出错后的退避时间
    pub error_backoff_ms: u64,
    /// 关闭时等待线程退出的时间
    pub shutdown_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            gps_min_fix_type: 1,
            error_backoff_ms: 100,
            shutdown_timeout_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.mode_timeout(), Duration::from_secs(10));
        assert_eq!(config.position_fix_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.guided_mode, "GUIDED");
        assert_eq!(config.return_mode, "RTL");
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = SequencerConfig {
            poll_interval_ms: 0,
            ..SequencerConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
