//! Mock 链路
//!
//! 不依赖飞控的 [`VehicleLink`] 实现：
//! - 测试通过 [`MockLink::push`] 注入飞控消息，[`MockLink::push_error`] 注入接收错误
//! - 所有发出的请求按顺序记录，可用 [`MockLink::sent`] 检查
//! - 可选 responder 根据请求生成回复消息，模拟飞控行为
//!
//! [`MockVehicle`] 在 `MockLink` 之上模拟一架飞行器：周期性发心跳和 GPS，
//! 按 [`VehicleBehavior`] 响应模式切换、解锁、起飞请求。

use crate::error::LinkError;
use crate::message::{AckResult, CommandKind, LinkMessage, LinkRequest};
use crate::mode::FlightModeMap;
use crate::VehicleLink;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Responder = Box<dyn FnMut(&LinkRequest) -> Vec<LinkMessage> + Send>;

/// Mock 链路
pub struct MockLink {
    inbound_tx: Sender<Result<LinkMessage, LinkError>>,
    inbound_rx: Receiver<Result<LinkMessage, LinkError>>,
    sent: Mutex<Vec<LinkRequest>>,
    responder: Mutex<Option<Responder>>,
    modes: FlightModeMap,
    flight_mode: Mutex<Option<String>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
    recv_timeout: Duration,
}

impl MockLink {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            modes: FlightModeMap::copter(),
            flight_mode: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            recv_timeout: Duration::from_millis(20),
        }
    }

    /// 注入一条飞控消息
    pub fn push(&self, msg: LinkMessage) {
        let _ = self.inbound_tx.send(Ok(msg));
    }

    /// 注入一次接收错误，按入队顺序由 `recv` 返回
    pub fn push_error(&self, error: LinkError) {
        let _ = self.inbound_tx.send(Err(error));
    }

    /// 按模式名注入心跳
    pub fn push_heartbeat(&self, mode: &str, armed: bool) {
        let custom_mode = self.modes.id(mode).unwrap_or(0);
        self.push(LinkMessage::heartbeat(custom_mode, armed));
    }

    /// 设置请求应答器（每次 `send` 后调用，返回值注入接收队列）
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&LinkRequest) -> Vec<LinkMessage> + Send + 'static,
    {
        *self.responder.lock() = Some(Box::new(responder));
    }

    /// 已发送请求（按发送顺序）
    pub fn sent(&self) -> Vec<LinkRequest> {
        self.sent.lock().clone()
    }

    /// 让后续 `send` 全部失败
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// 关闭链路，之后 `recv` 返回 [`LinkError::Closed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleLink for MockLink {
    fn recv(&self) -> Result<LinkMessage, LinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }

        match self.inbound_rx.recv_timeout(self.recv_timeout) {
            Ok(Ok(msg)) => {
                if let LinkMessage::Heartbeat { custom_mode, .. } = msg {
                    *self.flight_mode.lock() = Some(self.modes.name(custom_mode));
                }
                Ok(msg)
            },
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn send(&self, request: LinkRequest) -> Result<(), LinkError> {
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(LinkError::Encode(format!(
                "mock link refused {} request",
                request.name()
            )));
        }

        self.sent.lock().push(request.clone());

        let replies = match self.responder.lock().as_mut() {
            Some(responder) => responder(&request),
            None => Vec::new(),
        };
        for reply in replies {
            self.push(reply);
        }
        Ok(())
    }

    fn flight_mode(&self) -> Option<String> {
        self.flight_mode.lock().clone()
    }

    fn mode_id(&self, name: &str) -> Option<u32> {
        self.modes.id(name)
    }
}

/// 模拟飞行器的响应方式
#[derive(Debug, Clone)]
pub struct VehicleBehavior {
    /// 每个周期上报的 GPS fix_type
    pub gps_fix_type: u8,
    /// 收到模式切换后，再过多少个心跳才生效
    pub mode_delay_beats: u32,
    /// 是否接受模式切换
    pub accept_mode_changes: bool,
    /// 解锁应答；`None` 表示既不应答也不解锁
    pub arm_response: Option<AckResult>,
    /// 起飞应答；`None` 表示不应答
    pub takeoff_response: Option<AckResult>,
    /// 心跳周期
    pub beat_interval: Duration,
}

impl Default for VehicleBehavior {
    fn default() -> Self {
        Self {
            gps_fix_type: 3,
            mode_delay_beats: 0,
            accept_mode_changes: true,
            arm_response: Some(AckResult::Accepted),
            takeoff_response: Some(AckResult::Accepted),
            beat_interval: Duration::from_millis(20),
        }
    }
}

#[derive(Debug)]
struct VehicleState {
    mode: u32,
    armed: bool,
    pending_mode: Option<(u32, u32)>,
}

/// 基于 [`MockLink`] 的模拟飞行器
pub struct MockVehicle {
    state: Arc<Mutex<VehicleState>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockVehicle {
    /// 启动模拟（接管 `link` 的 responder）
    pub fn start(link: Arc<MockLink>, mode: &str, armed: bool, behavior: VehicleBehavior) -> Self {
        let state = Arc::new(Mutex::new(VehicleState {
            mode: link.mode_id(mode).unwrap_or(0),
            armed,
            pending_mode: None,
        }));

        let responder_state = Arc::clone(&state);
        let responder_behavior = behavior.clone();
        link.set_responder(move |request| {
            let mut state = responder_state.lock();
            let ack = |command, result| vec![LinkMessage::CommandAck { command, result }];
            match *request {
                LinkRequest::SetMode { custom_mode } => {
                    if responder_behavior.accept_mode_changes {
                        state.pending_mode =
                            Some((custom_mode, responder_behavior.mode_delay_beats));
                        ack(CommandKind::SetMode, AckResult::Accepted)
                    } else {
                        ack(CommandKind::SetMode, AckResult::Denied)
                    }
                },
                LinkRequest::Arm => match responder_behavior.arm_response {
                    Some(result) => {
                        if result.is_accepted() {
                            state.armed = true;
                        }
                        ack(CommandKind::ArmDisarm, result)
                    },
                    None => Vec::new(),
                },
                LinkRequest::Disarm => {
                    state.armed = false;
                    ack(CommandKind::ArmDisarm, AckResult::Accepted)
                },
                LinkRequest::Takeoff { .. } => match responder_behavior.takeoff_response {
                    Some(result) => ack(CommandKind::Takeoff, result),
                    None => Vec::new(),
                },
                LinkRequest::Land => ack(CommandKind::Land, AckResult::Accepted),
                LinkRequest::PositionTarget { .. } => Vec::new(),
            }
        });

        let running = Arc::new(AtomicBool::new(true));
        let beat_running = Arc::clone(&running);
        let beat_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            while beat_running.load(Ordering::Acquire) {
                thread::sleep(behavior.beat_interval);
                let (mode, armed) = {
                    let mut state = beat_state.lock();
                    if let Some((target, beats)) = state.pending_mode {
                        if beats == 0 {
                            state.mode = target;
                            state.pending_mode = None;
                        } else {
                            state.pending_mode = Some((target, beats - 1));
                        }
                    }
                    (state.mode, state.armed)
                };
                link.push(LinkMessage::heartbeat(mode, armed));
                link.push(LinkMessage::GpsRaw {
                    fix_type: behavior.gps_fix_type,
                    satellites_visible: 10,
                    eph: 80,
                });
            }
        });

        Self {
            state,
            running,
            handle: Some(handle),
        }
    }

    pub fn armed(&self) -> bool {
        self.state.lock().armed
    }

    pub fn mode(&self) -> u32 {
        self.state.lock().mode
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockVehicle {
    fn drop(&mut self) {
        self.stop();
    }
}
