//! 命令网关
//!
//! 校验客户端命令，把流程交给阻塞线程池执行，结果作为状态帧广播给所有会话。
//! 事件循环本身从不等待流程完成。

use crate::error::RequestError;
use crate::frame::{CommandRequest, Inbound, parse_inbound, status_frame};
use crate::registry::{SessionId, SessionRegistry};
use mavbridge_driver::{CommandOutcome, Sequencer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 命令网关
pub struct CommandGateway {
    sequencer: Arc<Sequencer>,
    registry: Arc<SessionRegistry>,
}

impl CommandGateway {
    pub fn new(sequencer: Arc<Sequencer>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            sequencer,
            registry,
        }
    }

    /// 处理会话发来的一帧文本
    ///
    /// 返回已派发流程的句柄（测试可以等待它），其余情况返回 `None`。
    pub fn handle_text(&self, session: SessionId, text: &str) -> Option<JoinHandle<()>> {
        match parse_inbound(text) {
            Ok(Inbound::Command(request)) => {
                info!("Client {} sent command {}", session, request.command);
                self.dispatch(request)
            },
            Ok(Inbound::Data(value)) => {
                info!("Received data from client {}: {}", session, value);
                None
            },
            Err(e) => {
                warn!("Malformed frame from client {}: {}", session, e);
                None
            },
        }
    }

    /// 校验并派发一条命令
    pub fn dispatch(&self, request: CommandRequest) -> Option<JoinHandle<()>> {
        let command = match request.to_command() {
            Ok(command) => command,
            Err(e @ RequestError::UnknownCommand(_)) => {
                warn!("{}", e);
                self.publish(&CommandOutcome::failure(e.to_string()));
                return None;
            },
            Err(e) => {
                warn!("Rejected {} command: {}", request.command, e);
                self.publish(&CommandOutcome::failure(format!(
                    "Error executing {}: {}",
                    request.command, e
                )));
                return None;
            },
        };

        let sequencer = Arc::clone(&self.sequencer);
        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            let name = command.name();
            let worker = tokio::task::spawn_blocking(move || sequencer.execute(&command));
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Command {} worker failed: {}", name, e);
                    CommandOutcome::failure(format!("Error executing {}: {}", name, e))
                },
            };
            publish(&registry, &outcome);
        });
        Some(handle)
    }

    /// 广播一条状态帧
    pub fn publish(&self, outcome: &CommandOutcome) {
        publish(&self.registry, outcome);
    }
}

fn publish(registry: &SessionRegistry, outcome: &CommandOutcome) {
    match status_frame(outcome) {
        Ok(payload) => {
            registry.broadcast(&payload);
        },
        Err(e) => error!("Failed to serialize status: {}", e),
    }
}
