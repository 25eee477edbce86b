//! 客户端 JSON 帧
//!
//! 入站：`{"command": <string>, "params": {...}}`，没有 `command` 的帧只记录日志。
//! 出站：
//! - 遥测 `{"type": "telemetry", ...fields}`
//! - 状态 `{"type": "status", "message": ..., "timestamp": ..., "success": ...}`

use crate::error::RequestError;
use mavbridge_driver::{Command, CommandOutcome, TelemetrySnapshot};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 起飞高度默认值（米）
const DEFAULT_ALTITUDE: f32 = 10.0;
/// 模式切换默认模式
const DEFAULT_MODE: &str = "GUIDED";
/// 航点默认 NED 坐标
const DEFAULT_NORTH: f32 = 0.0;
const DEFAULT_EAST: f32 = 0.0;
const DEFAULT_DOWN: f32 = -10.0;

/// 入站命令请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    /// 缺省或 `null` 视为空
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// 入站帧
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(CommandRequest),
    /// 没有 `command` 键的普通数据
    Data(Value),
}

/// 解析一帧文本
pub fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("command").is_some() {
        Ok(Inbound::Command(serde_json::from_value(value)?))
    } else {
        Ok(Inbound::Data(value))
    }
}

impl CommandRequest {
    /// 校验命令名并转换参数
    pub fn to_command(&self) -> Result<Command, RequestError> {
        match self.command.as_str() {
            "takeoff" => Ok(Command::Takeoff {
                altitude: self.number("altitude", DEFAULT_ALTITUDE)?,
            }),
            "land" => Ok(Command::Land),
            "arm" => Ok(Command::Arm),
            "disarm" => Ok(Command::Disarm),
            "return" => Ok(Command::Return),
            "set_mode" => Ok(Command::SetMode {
                mode: self.text("mode", DEFAULT_MODE)?,
            }),
            "goto_position" => Ok(Command::GotoPosition {
                north: self.number("north", DEFAULT_NORTH)?,
                east: self.number("east", DEFAULT_EAST)?,
                down: self.number("down", DEFAULT_DOWN)?,
            }),
            other => Err(RequestError::UnknownCommand(other.to_string())),
        }
    }

    /// 数值参数：接受 JSON 数字或数字字符串，缺省/null 用默认值
    fn number(&self, name: &'static str, default: f32) -> Result<f32, RequestError> {
        let invalid = |reason: String| RequestError::InvalidParam { name, reason };
        let value = match self.params.get(name) {
            None | Some(Value::Null) => return Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| invalid(format!("{} is not representable", n)))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid(format!("{:?}: {}", s, e)))?,
            Some(other) => return Err(invalid(format!("expected a number, got {}", other))),
        };

        // 超出 f32 范围的值转换后变成 inf
        let narrowed = value as f32;
        if !narrowed.is_finite() {
            return Err(invalid(format!("{} is out of range", value)));
        }
        Ok(narrowed)
    }

    fn text(&self, name: &'static str, default: &str) -> Result<String, RequestError> {
        match self.params.get(name) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(RequestError::InvalidParam {
                name,
                reason: format!("expected a string, got {}", other),
            }),
        }
    }
}

#[derive(Serialize)]
struct TelemetryFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    fields: &'a TelemetrySnapshot,
}

#[derive(Serialize)]
struct StatusFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    timestamp: f64,
    success: bool,
}

/// 序列化遥测帧
pub fn telemetry_frame(snapshot: &TelemetrySnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&TelemetryFrame {
        kind: "telemetry",
        fields: snapshot,
    })
}

/// 序列化状态帧
pub fn status_frame(outcome: &CommandOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StatusFrame {
        kind: "status",
        message: &outcome.message,
        timestamp: outcome.timestamp,
        success: outcome.success,
    })
}
