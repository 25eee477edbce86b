//! 配置文件
//!
//! TOML，所有字段都有默认值：
//!
//! ```toml
//! [link]
//! address = "udpin:0.0.0.0:14550"
//! heartbeat_timeout_ms = 30000
//!
//! [server]
//! bind = "127.0.0.1:8765"
//! telemetry_rate_hz = 10.0
//!
//! [sequencer]
//! mode_timeout_ms = 10000
//! guided_mode = "GUIDED"
//!
//! [telemetry]
//! gps_min_fix_type = 1
//! ```

use anyhow::{Context, Result};
use mavbridge_driver::{ListenerConfig, SequencerConfig};
use mavbridge_gateway::ServerConfig;
use mavbridge_link::LinkConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// `[link]` 段
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub address: String,
    pub heartbeat_timeout_ms: u64,
    pub system_id: u8,
    pub component_id: u8,
}

impl Default for LinkSection {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            address: link.address,
            heartbeat_timeout_ms: link.heartbeat_timeout_ms,
            system_id: link.system_id,
            component_id: link.component_id,
        }
    }
}

impl From<LinkSection> for LinkConfig {
    fn from(section: LinkSection) -> Self {
        LinkConfig {
            address: section.address,
            heartbeat_timeout_ms: section.heartbeat_timeout_ms,
            system_id: section.system_id,
            component_id: section.component_id,
        }
    }
}

/// 桥接程序配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub link: LinkSection,
    pub server: ServerConfig,
    pub sequencer: SequencerConfig,
    pub telemetry: ListenerConfig,
}

impl BridgeConfig {
    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 检查取值范围（命令行覆盖之后调用）
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        Ok(())
    }
}
