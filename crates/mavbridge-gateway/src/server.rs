//! WebSocket 服务端
//!
//! 每个连接两个任务：
//! - 读循环：文本帧交给 [`CommandGateway`]，关闭或出错时注销会话
//! - 写任务：把会话出站队列里的帧写回 socket，写失败即退出（队列随之关闭）

use crate::error::GatewayError;
use crate::gateway::CommandGateway;
use crate::registry::{SessionId, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// 桥接服务端
pub struct BridgeServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    gateway: Arc<CommandGateway>,
}

impl BridgeServer {
    /// 绑定监听地址
    pub async fn bind(
        addr: &str,
        registry: Arc<SessionRegistry>,
        gateway: Arc<CommandGateway>,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("WebSocket server listening on ws://{}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry,
            gateway,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.listener.local_addr()?)
    }

    /// 接受连接，直到任务被取消
    pub async fn run(self) -> Result<(), GatewayError> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                },
            };

            let registry = Arc::clone(&self.registry);
            let gateway = Arc::clone(&self.gateway);
            tokio::spawn(async move {
                if let Err(e) = serve_session(stream, peer, registry, gateway).await {
                    warn!("Session {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn serve_session(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<SessionRegistry>,
    gateway: Arc<CommandGateway>,
) -> Result<(), GatewayError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let (id, mut outbound) = registry.add(peer.to_string());
    info!(
        "Client {} connected from {}. Total clients: {}",
        id,
        peer,
        registry.len()
    );

    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if let Err(e) = sink.send(Message::text(payload.to_string())).await {
                debug!("Client {} write failed: {}", id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                gateway.handle_text(id, &text);
            },
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame from client {}", id),
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                debug!("Client {} read failed: {}", id, e);
                break;
            },
        }
    }

    disconnect(&registry, id);
    writer.abort();
    Ok(())
}

fn disconnect(registry: &SessionRegistry, id: SessionId) {
    if registry.remove(id) {
        info!(
            "Client {} disconnected. Total clients: {}",
            id,
            registry.len()
        );
    }
}
