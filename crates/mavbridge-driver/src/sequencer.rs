//! 命令序列器
//!
//! 每次调用执行一个带保护的飞行流程。所有等待都是对遥测快照或应答日志的
//! 轮询，每一步有独立的截止时间；任何一步超时则整个流程失败，不做重试。
//!
//! 解锁和起飞有前置条件：
//! - 解锁：GPS 定位 -> 引导模式 -> 发送解锁 -> 等待解锁心跳或拒绝应答
//! - 起飞：已解锁则先上锁 -> 引导模式 -> 解锁 -> 发送起飞 -> 等待起飞应答
//!
//! 其余命令（上锁、降落、航点）只发送请求，不等待。
//!
//! 流程是阻塞的，应在独立的工作线程上运行。多步流程（解锁、起飞、模式切换、返航）
//! 经 [`Sequencer::execute`] 串行执行，后到的流程等前一个结束；
//! 只发送一次请求的命令不排队。

use crate::ack::{AckCursor, AckLog};
use crate::command::{Command, CommandOutcome};
use crate::config::SequencerConfig;
use crate::error::SequencerError;
use crate::store::{TelemetryStore, unix_timestamp};
use mavbridge_link::{AckResult, CommandKind, LinkRequest, VehicleLink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 命令序列器
pub struct Sequencer {
    link: Arc<dyn VehicleLink>,
    store: Arc<TelemetryStore>,
    acks: Arc<AckLog>,
    config: SequencerConfig,
    /// 多步流程互斥
    procedure: Mutex<()>,
}

impl Sequencer {
    pub fn new(
        link: Arc<dyn VehicleLink>,
        store: Arc<TelemetryStore>,
        acks: Arc<AckLog>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            link,
            store,
            acks,
            config,
            procedure: Mutex::new(()),
        }
    }

    /// 执行一条命令并生成结果
    ///
    /// 流程失败（前置条件、超时、拒绝）和链路错误都转换为失败的结果，不会 panic。
    pub fn execute(&self, command: &Command) -> CommandOutcome {
        let _guard = if command.is_guarded() {
            Some(match self.procedure.try_lock() {
                Some(guard) => guard,
                None => {
                    info!("Waiting for running procedure before {} command", command.name());
                    self.procedure.lock()
                },
            })
        } else {
            None
        };

        info!("Executing {} command", command.name());
        match command {
            Command::Takeoff { altitude } => self.report(
                command,
                self.takeoff(*altitude),
                "Takeoff command successful".to_string(),
                "Takeoff command failed",
            ),
            Command::Land => self.report(
                command,
                self.land(),
                "Landing command sent".to_string(),
                "Landing command failed",
            ),
            Command::Arm => self.report(
                command,
                self.arm(),
                "Arm command successful".to_string(),
                "Arm command failed",
            ),
            Command::Disarm => self.report(
                command,
                self.disarm(),
                "Disarm command sent".to_string(),
                "Disarm command failed",
            ),
            Command::Return => self.report(
                command,
                self.return_to_launch(),
                "RTL command successful".to_string(),
                "RTL command failed",
            ),
            Command::SetMode { mode } => {
                let mode = mode.trim().to_ascii_uppercase();
                self.report(
                    command,
                    self.set_mode(&mode),
                    format!("Mode change to {} successful", mode),
                    &format!("Mode change to {} failed", mode),
                )
            },
            Command::GotoPosition { north, east, down } => self.report(
                command,
                self.goto_position(*north, *east, *down),
                format!("Moving to position N:{}, E:{}, D:{}", north, east, down),
                "Goto command failed",
            ),
        }
    }

    fn report(
        &self,
        command: &Command,
        result: Result<(), SequencerError>,
        success: String,
        failed: &str,
    ) -> CommandOutcome {
        match result {
            Ok(()) => {
                info!("{}", success);
                CommandOutcome::success(success)
            },
            Err(SequencerError::Link(e)) => {
                error!("Error executing {}: {}", command.name(), e);
                CommandOutcome::failure(format!("Error executing {}: {}", command.name(), e))
            },
            Err(e) => {
                warn!("{}: {}", failed, e);
                CommandOutcome::failure(format!("{}: {}", failed, e))
            },
        }
    }

    /// 切换模式并等待快照报告目标模式（使用配置的超时）
    pub fn set_mode(&self, mode: &str) -> Result<(), SequencerError> {
        self.change_mode(mode, self.config.mode_timeout())
    }

    /// 切换模式并等待快照报告目标模式
    ///
    /// 未知模式名立即失败；超时只在截止时间到达之后才返回。
    pub fn change_mode(&self, mode: &str, timeout: Duration) -> Result<(), SequencerError> {
        let target = mode.trim().to_ascii_uppercase();
        let custom_mode = self
            .link
            .mode_id(&target)
            .ok_or_else(|| SequencerError::UnknownMode {
                mode: target.clone(),
            })?;

        info!("Requesting mode change to {} ({})", target, custom_mode);
        self.link.send(LinkRequest::SetMode { custom_mode })?;

        let reached = self.poll_until(timeout, || {
            let snapshot = self.store.snapshot();
            match snapshot.get_str("mode") {
                Some(current) if current.eq_ignore_ascii_case(&target) => Some(Ok(())),
                _ => None,
            }
        });

        reached.unwrap_or_else(|| {
            warn!("Mode change to {} timed out", target);
            Err(SequencerError::ModeChangeTimeout {
                mode: target,
                timeout_ms: timeout.as_millis() as u64,
            })
        })
    }

    /// 解锁
    pub fn arm(&self) -> Result<(), SequencerError> {
        self.wait_for_position_fix()?;
        self.enter_guided()?;
        self.settle(self.config.mode_settle_ms);

        let cursor = self.acks.cursor();
        let requested_at = unix_timestamp();
        info!("Sending arm request");
        self.link.send(LinkRequest::Arm)?;

        let timeout = self.config.arm_timeout();
        let confirmed = self.poll_until(timeout, || {
            if let Some(result) = self.first_rejection(cursor, CommandKind::ArmDisarm) {
                return Some(Err(SequencerError::ArmRejected { result }));
            }

            // 只认请求之后收到的心跳，避免读到上锁前残留的 armed=true
            let snapshot = self.store.snapshot();
            let fresh = snapshot
                .get_f64("timestamp")
                .is_some_and(|t| t >= requested_at);
            if fresh && snapshot.get_bool("armed") == Some(true) {
                return Some(Ok(()));
            }
            None
        });

        confirmed.unwrap_or(Err(SequencerError::ArmTimeout {
            timeout_ms: self.config.arm_timeout_ms,
        }))
    }

    /// 上锁（不等待确认）
    pub fn disarm(&self) -> Result<(), SequencerError> {
        info!("Sending disarm request");
        self.link.send(LinkRequest::Disarm)?;
        Ok(())
    }

    /// 起飞到指定高度
    pub fn takeoff(&self, altitude: f32) -> Result<(), SequencerError> {
        // 飞控要求起飞前的解锁必须是一次"干净"的上锁->解锁
        if self.store.snapshot().get_bool("armed") == Some(true) {
            info!("Vehicle already armed, disarming before takeoff");
            self.link.send(LinkRequest::Disarm)?;
            self.settle(self.config.disarm_settle_ms);
        }

        self.enter_guided()?;
        self.settle(self.config.mode_settle_ms);
        self.arm()?;
        self.settle(self.config.arm_settle_ms);

        let cursor = self.acks.cursor();
        info!("Sending takeoff request to {} m", altitude);
        self.link.send(LinkRequest::Takeoff { altitude })?;

        let timeout = self.config.takeoff_ack_timeout();
        let acked = self.poll_until(timeout, || {
            self.acks
                .since(cursor, CommandKind::Takeoff)
                .into_iter()
                .find(|ack| ack.result != AckResult::InProgress)
                .map(|ack| {
                    if ack.result.is_accepted() {
                        Ok(())
                    } else {
                        Err(SequencerError::TakeoffRejected { result: ack.result })
                    }
                })
        });

        acked.unwrap_or(Err(SequencerError::TakeoffAckTimeout {
            timeout_ms: self.config.takeoff_ack_timeout_ms,
        }))
    }

    /// 降落（不等待确认）
    pub fn land(&self) -> Result<(), SequencerError> {
        info!("Sending land request");
        self.link.send(LinkRequest::Land)?;
        Ok(())
    }

    /// 返航：切换到返航模式
    pub fn return_to_launch(&self) -> Result<(), SequencerError> {
        let mode = self.config.return_mode.clone();
        self.set_mode(&mode)
    }

    /// 本地 NED 位置目标（该请求没有应答协议）
    pub fn goto_position(&self, north: f32, east: f32, down: f32) -> Result<(), SequencerError> {
        info!("Sending position target N:{} E:{} D:{}", north, east, down);
        self.link
            .send(LinkRequest::PositionTarget { north, east, down })?;
        Ok(())
    }

    fn wait_for_position_fix(&self) -> Result<(), SequencerError> {
        let timeout = self.config.position_fix_timeout();
        let fixed = self.poll_until(timeout, || {
            match self.store.snapshot().get_bool("gps_fix") {
                Some(true) => Some(Ok(())),
                _ => None,
            }
        });

        fixed.unwrap_or_else(|| {
            warn!("No GPS position fix after {:?}", timeout);
            Err(SequencerError::NoPositionFix {
                timeout_ms: self.config.position_fix_timeout_ms,
            })
        })
    }

    fn enter_guided(&self) -> Result<(), SequencerError> {
        let mode = self.config.guided_mode.clone();
        self.set_mode(&mode).map_err(|e| match e {
            SequencerError::Link(_) => e,
            other => SequencerError::ModePreconditionFailed {
                mode,
                source: Box::new(other),
            },
        })
    }

    fn first_rejection(&self, cursor: AckCursor, command: CommandKind) -> Option<AckResult> {
        self.acks
            .since(cursor, command)
            .into_iter()
            .map(|ack| ack.result)
            .find(|result| result.is_rejection())
    }

    fn settle(&self, millis: u64) {
        if millis > 0 {
            debug!("Settling for {} ms", millis);
            thread::sleep(Duration::from_millis(millis));
        }
    }

    /// 轮询直到 `check` 给出结果或超时
    ///
    /// 超时返回 `None`。截止时间从调用时刻算起，最后一次检查发生在截止时间之后。
    fn poll_until<T>(
        &self,
        timeout: Duration,
        mut check: impl FnMut() -> Option<Result<T, SequencerError>>,
    ) -> Option<Result<T, SequencerError>> {
        let start = Instant::now();
        let poll_interval = self.config.poll_interval();

        loop {
            if let Some(result) = check() {
                return Some(result);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return None;
            }

            let remaining = timeout.saturating_sub(elapsed);
            thread::sleep(poll_interval.min(remaining));
        }
    }
}
