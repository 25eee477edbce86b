//! MAVLink 链路适配器
//!
//! 基于 `mavlink` crate（common 方言）实现 [`VehicleLink`]。
//! 连接建立后先等待第一条飞控心跳，记录目标 system/component ID，
//! 之后只解码来自目标系统的消息。

use crate::error::LinkError;
use crate::message::{AckResult, CommandKind, LinkMessage, LinkRequest};
use crate::mode::FlightModeMap;
use crate::VehicleLink;
use arc_swap::ArcSwapOption;
use mavlink::common::{
    COMMAND_LONG_DATA, HEARTBEAT_DATA, MavCmd, MavFrame, MavMessage, MavType,
    PositionTargetTypemask, SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader, Message};
use std::io::ErrorKind;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

type Connection = Box<dyn MavConnection<MavMessage> + Sync + Send>;

/// DO_SET_MODE param1：MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
const CUSTOM_MODE_ENABLED: f32 = 1.0;

/// SET_POSITION_TARGET_LOCAL_NED 掩码：只启用 x/y/z 位置
const POSITION_ONLY_MASK: u16 = 0b0000_1111_1111_1000;

/// 链路配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// mavlink 连接串，如 `udpin:0.0.0.0:14550`、`tcpout:127.0.0.1:5760`
    pub address: String,
    /// 启动时等待首个心跳的超时（毫秒）
    pub heartbeat_timeout_ms: u64,
    /// 本端 system id（地面站惯例 255）
    pub system_id: u8,
    /// 本端 component id（MAV_COMP_ID_MISSIONPLANNER）
    pub component_id: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "udpin:0.0.0.0:14550".to_string(),
            heartbeat_timeout_ms: 30_000,
            system_id: 255,
            component_id: 190,
        }
    }
}

/// MAVLink 链路
pub struct MavlinkLink {
    conn: Arc<Connection>,
    header: MavHeader,
    target_system: u8,
    target_component: u8,
    modes: FlightModeMap,
    flight_mode: ArcSwapOption<String>,
}

impl MavlinkLink {
    /// 建立连接并等待飞控心跳
    ///
    /// 超时未收到心跳返回 [`LinkError::NoHeartbeat`]。
    pub fn connect(config: &LinkConfig) -> Result<Self, LinkError> {
        info!("Connecting to vehicle link at {}", config.address);
        let conn: Arc<Connection> = Arc::new(mavlink::connect::<MavMessage>(&config.address)?);

        // mavlink 的 recv() 本身不带超时，握手放到辅助线程里等
        let (tx, rx) = crossbeam_channel::bounded::<(MavHeader, HEARTBEAT_DATA)>(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let handshake_conn = Arc::clone(&conn);
        let handshake_abandoned = Arc::clone(&abandoned);
        thread::Builder::new()
            .name("link-handshake".into())
            .spawn(move || wait_for_vehicle(&handshake_conn, &tx, &handshake_abandoned))?;

        let timeout = Duration::from_millis(config.heartbeat_timeout_ms);
        let (vehicle, heartbeat) = rx.recv_timeout(timeout).map_err(|_| {
            // 辅助线程在下一次 recv 返回后退出
            abandoned.store(true, Ordering::Release);
            LinkError::NoHeartbeat {
                timeout_ms: config.heartbeat_timeout_ms,
            }
        })?;

        let modes = FlightModeMap::copter();
        let mode = modes.name(heartbeat.custom_mode);
        info!(
            "Heartbeat from system {} component {} (mode {})",
            vehicle.system_id, vehicle.component_id, mode
        );

        Ok(Self {
            conn,
            header: MavHeader {
                system_id: config.system_id,
                component_id: config.component_id,
                sequence: 0,
            },
            target_system: vehicle.system_id,
            target_component: vehicle.component_id,
            modes,
            flight_mode: ArcSwapOption::from_pointee(Some(mode)),
        })
    }

    fn decode(&self, header: MavHeader, msg: MavMessage) -> LinkMessage {
        if header.system_id != self.target_system {
            return LinkMessage::Other(msg.message_name());
        }

        match msg {
            MavMessage::ATTITUDE(d) => LinkMessage::Attitude {
                roll: d.roll,
                pitch: d.pitch,
                yaw: d.yaw,
            },
            MavMessage::GLOBAL_POSITION_INT(d) => LinkMessage::GlobalPosition {
                lat: d.lat,
                lon: d.lon,
                alt: d.alt,
                relative_alt: d.relative_alt,
                vx: d.vx,
                vz: d.vz,
            },
            MavMessage::VFR_HUD(d) => LinkMessage::VfrHud {
                airspeed: d.airspeed,
                groundspeed: d.groundspeed,
                heading: d.heading,
                throttle: d.throttle,
                alt: d.alt,
                climb: d.climb,
            },
            MavMessage::GPS_RAW_INT(d) => LinkMessage::GpsRaw {
                fix_type: d.fix_type as u8,
                satellites_visible: d.satellites_visible,
                eph: d.eph,
            },
            MavMessage::BATTERY_STATUS(d) => LinkMessage::BatteryStatus {
                voltages: d.voltages.to_vec(),
                current_battery: d.current_battery,
                battery_remaining: d.battery_remaining,
            },
            MavMessage::HEARTBEAT(d) => {
                // 同一系统里的云台、相机等组件也会发心跳
                if header.component_id != self.target_component {
                    return LinkMessage::Other("HEARTBEAT");
                }
                self.flight_mode
                    .store(Some(Arc::new(self.modes.name(d.custom_mode))));
                LinkMessage::Heartbeat {
                    base_mode: d.base_mode.bits(),
                    custom_mode: d.custom_mode,
                    system_status: d.system_status as u8,
                }
            },
            MavMessage::COMMAND_ACK(d) => LinkMessage::CommandAck {
                command: CommandKind::from_id(d.command as u16),
                result: AckResult::from_u8(d.result as u8),
            },
            other => LinkMessage::Other(other.message_name()),
        }
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
            command,
            target_system: self.target_system,
            target_component: self.target_component,
            confirmation: 0,
        })
    }

    fn encode(&self, request: &LinkRequest) -> MavMessage {
        match *request {
            LinkRequest::Arm => self.command_long(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            LinkRequest::Disarm => self.command_long(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            LinkRequest::SetMode { custom_mode } => self.command_long(
                MavCmd::MAV_CMD_DO_SET_MODE,
                [CUSTOM_MODE_ENABLED, custom_mode as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
            ),
            LinkRequest::Takeoff { altitude } => self.command_long(
                MavCmd::MAV_CMD_NAV_TAKEOFF,
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude],
            ),
            LinkRequest::Land => {
                self.command_long(MavCmd::MAV_CMD_NAV_LAND, [0.0; 7])
            },
            LinkRequest::PositionTarget { north, east, down } => {
                MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                    time_boot_ms: 0,
                    x: north,
                    y: east,
                    z: down,
                    vx: 0.0,
                    vy: 0.0,
                    vz: 0.0,
                    afx: 0.0,
                    afy: 0.0,
                    afz: 0.0,
                    yaw: 0.0,
                    yaw_rate: 0.0,
                    type_mask: PositionTargetTypemask::from_bits_truncate(POSITION_ONLY_MASK),
                    target_system: self.target_system,
                    target_component: self.target_component,
                    coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
                })
            },
        }
    }
}

/// 握手线程主体：等到第一条非地面站心跳，或调用方放弃等待
fn wait_for_vehicle(
    conn: &Connection,
    tx: &Sender<(MavHeader, HEARTBEAT_DATA)>,
    abandoned: &AtomicBool,
) {
    while !abandoned.load(Ordering::Acquire) {
        match conn.recv() {
            Ok((header, MavMessage::HEARTBEAT(data))) => {
                if data.mavtype == MavType::MAV_TYPE_GCS {
                    continue;
                }
                if tx.send((header, data)).is_err() {
                    debug!("Handshake abandoned before the first heartbeat");
                }
                return;
            },
            Ok(_) => {},
            Err(e) => {
                debug!("Handshake receive error: {}", e);
                thread::sleep(Duration::from_millis(100));
            },
        }
    }
    debug!("Handshake thread exiting");
}

impl VehicleLink for MavlinkLink {
    fn recv(&self) -> Result<LinkMessage, LinkError> {
        match self.conn.recv() {
            Ok((header, msg)) => Ok(self.decode(header, msg)),
            Err(MessageReadError::Io(e)) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Err(LinkError::Timeout),
                ErrorKind::UnexpectedEof => Err(LinkError::Closed),
                _ => Err(LinkError::Io(e)),
            },
            Err(e) => Err(LinkError::Decode(e.to_string())),
        }
    }

    fn send(&self, request: LinkRequest) -> Result<(), LinkError> {
        let msg = self.encode(&request);
        self.conn.send(&self.header, &msg).map_err(|e| {
            warn!("Failed to send {} request: {}", request.name(), e);
            LinkError::Encode(e.to_string())
        })?;
        debug!("Sent {:?}", request);
        Ok(())
    }

    fn flight_mode(&self) -> Option<String> {
        self.flight_mode.load_full().map(|mode| mode.as_ref().clone())
    }

    fn mode_id(&self, name: &str) -> Option<u32> {
        self.modes.id(name)
    }
}
