//! # mavbridge
//!
//! 飞控 MAVLink 链路与 WebSocket 客户端之间的桥接进程。
//!
//! ```bash
//! # SITL 默认输出到 udp 14550
//! mavbridge --link udpin:0.0.0.0:14550 --bind 127.0.0.1:8765
//!
//! # 使用配置文件，命令行参数优先
//! mavbridge --config mavbridge.toml --telemetry-rate 5
//! ```
//!
//! 启动顺序：连接链路并等待首个心跳（失败即退出）→ 启动监听线程 →
//! 绑定 WebSocket 端口（失败即退出）→ 遥测广播 + 接受连接，直到 Ctrl+C。

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::BridgeConfig;
use mavbridge_driver::{AckLog, Listener, ListenerHealth, Sequencer, TelemetryStore};
use mavbridge_gateway::{Broadcaster, BridgeServer, CommandGateway, SessionRegistry};
use mavbridge_link::{LinkConfig, MavlinkLink, VehicleLink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 监听线程存活检查周期
const LINK_CHECK_PERIOD: Duration = Duration::from_millis(200);

/// mavbridge - MAVLink / WebSocket 桥接
#[derive(Parser, Debug)]
#[command(name = "mavbridge")]
#[command(about = "Bridge a MAVLink vehicle to WebSocket clients", long_about = None)]
#[command(version)]
struct Args {
    /// 配置文件路径（TOML）
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// mavlink 连接串
    ///
    /// 例如: udpin:0.0.0.0:14550, tcpout:127.0.0.1:5760, serial:/dev/ttyACM0:57600
    #[arg(long)]
    link: Option<String>,

    /// WebSocket 监听地址
    ///
    /// 默认: 127.0.0.1:8765
    #[arg(long)]
    bind: Option<String>,

    /// 等待首个心跳的超时（毫秒）
    #[arg(long)]
    heartbeat_timeout_ms: Option<u64>,

    /// 遥测广播频率（Hz）
    #[arg(long)]
    telemetry_rate: Option<f64>,
}

impl Args {
    fn resolve(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };
        if let Some(link) = &self.link {
            config.link.address = link.clone();
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(timeout) = self.heartbeat_timeout_ms {
            config.link.heartbeat_timeout_ms = timeout;
        }
        if let Some(rate) = self.telemetry_rate {
            config.server.telemetry_rate_hz = rate;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive("mavbridge=info".parse()?),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = args.resolve()?;

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: BridgeConfig) -> Result<()> {
    // 1. 链路：握手是阻塞的
    let link_config: LinkConfig = config.link.into();
    let link = tokio::task::spawn_blocking(move || MavlinkLink::connect(&link_config))
        .await
        .context("Link handshake task failed")?
        .context("Failed to connect to vehicle")?;
    let link: Arc<dyn VehicleLink> = Arc::new(link);

    // 2. 遥测与监听线程
    let store = Arc::new(TelemetryStore::new());
    let acks = Arc::new(AckLog::new());
    let listener = Listener::spawn(
        Arc::clone(&link),
        Arc::clone(&store),
        Arc::clone(&acks),
        config.telemetry.clone(),
    )?;

    // 3. 客户端一侧
    let sequencer = Arc::new(Sequencer::new(
        link,
        Arc::clone(&store),
        acks,
        config.sequencer.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new(
        config.server.session_queue,
        config.server.max_consecutive_drops,
    ));
    let gateway = Arc::new(CommandGateway::new(sequencer, Arc::clone(&registry)));
    let server = BridgeServer::bind(&config.server.bind, Arc::clone(&registry), gateway)
        .await
        .context("Failed to start WebSocket server")?;

    let broadcaster = Broadcaster::new(store, registry, config.server.telemetry_period());
    let mut broadcast_task = tokio::spawn(broadcaster.run());
    let mut server_task = tokio::spawn(server.run());
    let health = listener.health();

    info!("Bridge running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal. Shutting down...");
            signal.context("Failed to listen for Ctrl+C")
        },
        joined = &mut server_task => match joined {
            Ok(Ok(())) => Err(anyhow::anyhow!("WebSocket server stopped")),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("WebSocket server stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("WebSocket server task failed")),
        },
        joined = &mut broadcast_task => match joined {
            Ok(()) => Err(anyhow::anyhow!("Telemetry broadcaster stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("Telemetry broadcaster task failed")),
        },
        () = link_lost(health) => Err(anyhow::anyhow!("Vehicle link closed")),
    };

    broadcast_task.abort();
    server_task.abort();
    tokio::task::spawn_blocking(move || listener.shutdown())
        .await
        .context("Listener shutdown task failed")?;
    info!("Bridge stopped");

    result
}

/// 监听线程退出（链路关闭）时返回
async fn link_lost(health: ListenerHealth) {
    let mut ticker = tokio::time::interval(LINK_CHECK_PERIOD);
    loop {
        ticker.tick().await;
        if !health.is_running() {
            let stats = health.stats();
            error!(
                "Link listener exited (received {}, errors {})",
                stats.received, stats.errors
            );
            return;
        }
    }
}
