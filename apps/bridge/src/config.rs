//! 配置文件
//!
//! TOML 格式，所有段都可省略：
//!
//! ```toml
//! [bridge]
//! poll_interval_ms = 6000
//!
//! [store]
//! path = "bridge-store.bin"
//!
//! [simulation]
//! join_after_ms = 2000
//! confirm_after_ms = 500
//!
//! [[simulation.motors]]
//! address = "1A2B3C"
//! position = 20
//! speed = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use somfy_driver::{BridgeConfig, WireAddress};

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub store: StoreSection,
    pub simulation: SimulationSection,
}

/// 持久化存储
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// 存储文件路径
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bridge-store.bin"),
        }
    }
}

/// 模拟总线和网络
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// 启动后多久加入网络
    pub join_after_ms: u64,
    /// 发现模式下多久后自动按下确认
    pub confirm_after_ms: u64,
    pub motors: Vec<MotorSection>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            join_after_ms: 2_000,
            confirm_after_ms: 500,
            motors: vec![
                MotorSection {
                    address: "1A2B3C".to_string(),
                    position: 20,
                    speed: 10,
                },
                MotorSection {
                    address: "0A0B0C".to_string(),
                    position: 75,
                    speed: 10,
                },
            ],
        }
    }
}

/// 单个模拟电机
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorSection {
    /// 十六进制节点 ID（显示格式）
    pub address: String,
    #[serde(default)]
    pub position: u8,
    /// 百分比/秒
    #[serde(default = "default_speed")]
    pub speed: u32,
}

fn default_speed() -> u32 {
    10
}

impl MotorSection {
    pub fn wire_address(&self) -> Result<WireAddress> {
        self.address
            .parse()
            .with_context(|| format!("Invalid motor address {:?}", self.address))
    }
}

impl AppConfig {
    /// 加载配置（文件不存在时使用默认值）
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        for motor in &config.simulation.motors {
            motor.wire_address()?;
        }
        Ok(config)
    }
}
