//! 服务端配置

use crate::error::GatewayError;
use serde::Deserialize;
use std::time::Duration;

/// 遥测广播频率允许范围（Hz）
pub const MIN_TELEMETRY_RATE_HZ: f64 = 0.01;
pub const MAX_TELEMETRY_RATE_HZ: f64 = 1000.0;

const DEFAULT_TELEMETRY_RATE_HZ: f64 = 10.0;

/// WebSocket 服务端配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind: String,
    /// 遥测广播频率（Hz）
    pub telemetry_rate_hz: f64,
    /// 每个会话的出站队列长度
    pub session_queue: usize,
    /// 连续丢帧上限，超过后断开该会话
    pub max_consecutive_drops: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".to_string(),
            telemetry_rate_hz: DEFAULT_TELEMETRY_RATE_HZ,
            session_queue: 64,
            max_consecutive_drops: 50,
        }
    }
}

impl ServerConfig {
    /// 检查取值范围
    pub fn validate(&self) -> Result<(), GatewayError> {
        let rate = self.telemetry_rate_hz;
        if !(MIN_TELEMETRY_RATE_HZ..=MAX_TELEMETRY_RATE_HZ).contains(&rate) {
            return Err(GatewayError::InvalidConfig {
                field: "telemetry_rate_hz",
                reason: format!(
                    "{} is outside {}..={} Hz",
                    rate, MIN_TELEMETRY_RATE_HZ, MAX_TELEMETRY_RATE_HZ
                ),
            });
        }
        if self.session_queue == 0 {
            return Err(GatewayError::InvalidConfig {
                field: "session_queue",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// 广播周期
    ///
    /// 非法频率（NaN 或非正数）退回默认值，其余钳制到允许范围内，结果总是非零。
    pub fn telemetry_period(&self) -> Duration {
        let rate = if self.telemetry_rate_hz.is_finite() && self.telemetry_rate_hz > 0.0 {
            self.telemetry_rate_hz
                .clamp(MIN_TELEMETRY_RATE_HZ, MAX_TELEMETRY_RATE_HZ)
        } else {
            DEFAULT_TELEMETRY_RATE_HZ
        };
        Duration::from_secs_f64(1.0 / rate)
    }
}
