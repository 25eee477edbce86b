//! 链路消息与请求类型
//!
//! [`LinkMessage`] 保留飞控原生单位（弧度、1e-7 度、毫米、cm/s、mV、cA），
//! 单位换算由上层监听器负责。

use std::fmt;

/// HEARTBEAT.base_mode 中的解锁标志位（MAV_MODE_FLAG_SAFETY_ARMED）
pub const MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

/// 已解码的飞控消息（按类别）
#[derive(Debug, Clone, PartialEq)]
pub enum LinkMessage {
    /// ATTITUDE（弧度）
    Attitude { roll: f32, pitch: f32, yaw: f32 },
    /// GLOBAL_POSITION_INT
    GlobalPosition {
        /// 纬度（1e-7 度）
        lat: i32,
        /// 经度（1e-7 度）
        lon: i32,
        /// 海拔（毫米）
        alt: i32,
        /// 相对起飞点高度（毫米）
        relative_alt: i32,
        /// 北向速度（cm/s）
        vx: i16,
        /// 地向速度（cm/s）
        vz: i16,
    },
    /// VFR_HUD
    VfrHud {
        airspeed: f32,
        groundspeed: f32,
        heading: i16,
        throttle: u16,
        alt: f32,
        climb: f32,
    },
    /// GPS_RAW_INT
    GpsRaw {
        fix_type: u8,
        satellites_visible: u8,
        /// 水平精度因子 * 100
        eph: u16,
    },
    /// BATTERY_STATUS
    BatteryStatus {
        /// 各电芯电压（mV），`u16::MAX` 表示未上报
        voltages: Vec<u16>,
        /// 电流（cA），-1 表示未知
        current_battery: i16,
        /// 剩余电量（%），-1 表示未知
        battery_remaining: i8,
    },
    /// HEARTBEAT
    Heartbeat {
        base_mode: u8,
        custom_mode: u32,
        system_status: u8,
    },
    /// COMMAND_ACK
    CommandAck {
        command: CommandKind,
        result: AckResult,
    },
    /// 其他未关注的消息
    Other(&'static str),
}

impl LinkMessage {
    /// 消息类别名（用于日志）
    pub fn category(&self) -> &'static str {
        match self {
            LinkMessage::Attitude { .. } => "ATTITUDE",
            LinkMessage::GlobalPosition { .. } => "GLOBAL_POSITION_INT",
            LinkMessage::VfrHud { .. } => "VFR_HUD",
            LinkMessage::GpsRaw { .. } => "GPS_RAW_INT",
            LinkMessage::BatteryStatus { .. } => "BATTERY_STATUS",
            LinkMessage::Heartbeat { .. } => "HEARTBEAT",
            LinkMessage::CommandAck { .. } => "COMMAND_ACK",
            LinkMessage::Other(name) => name,
        }
    }

    /// 构造心跳消息（测试和模拟链路使用）
    pub fn heartbeat(custom_mode: u32, armed: bool) -> Self {
        LinkMessage::Heartbeat {
            base_mode: if armed { MODE_FLAG_SAFETY_ARMED } else { 0 },
            custom_mode,
            system_status: 4, // MAV_STATE_ACTIVE
        }
    }
}

/// 被应答的命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// MAV_CMD_COMPONENT_ARM_DISARM (400)
    ArmDisarm,
    /// MAV_CMD_NAV_TAKEOFF (22)
    Takeoff,
    /// MAV_CMD_NAV_LAND (21)
    Land,
    /// MAV_CMD_DO_SET_MODE (176)
    SetMode,
    Other(u16),
}

impl CommandKind {
    pub fn from_id(id: u16) -> Self {
        match id {
            400 => CommandKind::ArmDisarm,
            22 => CommandKind::Takeoff,
            21 => CommandKind::Land,
            176 => CommandKind::SetMode,
            other => CommandKind::Other(other),
        }
    }
}

/// COMMAND_ACK 结果码（MAV_RESULT）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    Cancelled,
    Other(u8),
}

impl AckResult {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AckResult::Accepted,
            1 => AckResult::TemporarilyRejected,
            2 => AckResult::Denied,
            3 => AckResult::Unsupported,
            4 => AckResult::Failed,
            5 => AckResult::InProgress,
            6 => AckResult::Cancelled,
            other => AckResult::Other(other),
        }
    }

    pub fn is_accepted(self) -> bool {
        self == AckResult::Accepted
    }

    /// 明确拒绝（IN_PROGRESS 只是中间状态，不算拒绝）
    pub fn is_rejection(self) -> bool {
        !matches!(self, AckResult::Accepted | AckResult::InProgress)
    }
}

impl fmt::Display for AckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckResult::Accepted => write!(f, "ACCEPTED"),
            AckResult::TemporarilyRejected => write!(f, "TEMPORARILY_REJECTED"),
            AckResult::Denied => write!(f, "DENIED"),
            AckResult::Unsupported => write!(f, "UNSUPPORTED"),
            AckResult::Failed => write!(f, "FAILED"),
            AckResult::InProgress => write!(f, "IN_PROGRESS"),
            AckResult::Cancelled => write!(f, "CANCELLED"),
            AckResult::Other(code) => write!(f, "RESULT_{}", code),
        }
    }
}

/// 发往飞控的请求（固定参数集）
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRequest {
    Arm,
    Disarm,
    SetMode { custom_mode: u32 },
    /// 起飞到指定高度（米），位置参数置零表示"当前位置"
    Takeoff { altitude: f32 },
    Land,
    /// 本地 NED 位置目标（米）
    PositionTarget { north: f32, east: f32, down: f32 },
}

impl LinkRequest {
    pub fn name(&self) -> &'static str {
        match self {
            LinkRequest::Arm => "arm",
            LinkRequest::Disarm => "disarm",
            LinkRequest::SetMode { .. } => "set_mode",
            LinkRequest::Takeoff { .. } => "takeoff",
            LinkRequest::Land => "land",
            LinkRequest::PositionTarget { .. } => "position_target",
        }
    }
}
