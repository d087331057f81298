//! 状态显示（仅供参考，核心逻辑不依赖显示状态）

use std::fmt;

use somfy_protocol::WireAddress;
use tracing::debug;

use crate::{Device, Mode, Registry};

/// 发现模式下已找到设备时的提示
pub const DISCOVERY_HINT: &str = "Press BTN to finish";

/// 单个设备的显示状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Offline,
    /// 位置未知
    Unknown,
    Position { current: u8, target: Option<u8> },
}

/// 单个设备的显示行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLine {
    pub address: WireAddress,
    pub status: DeviceStatus,
}

impl DeviceLine {
    pub fn from_device(device: &Device) -> Self {
        let status = match device.clamped_percentage() {
            _ if !device.online => DeviceStatus::Offline,
            None => DeviceStatus::Unknown,
            Some(current) => DeviceStatus::Position {
                current,
                target: device.commanded.then_some(device.commanded_percentage),
            },
        };
        Self {
            address: device.address,
            status,
        }
    }
}

impl fmt::Display for DeviceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.address)?;
        match self.status {
            DeviceStatus::Offline => f.write_str("offline"),
            DeviceStatus::Unknown => f.write_str("N/A"),
            DeviceStatus::Position { current, target: None } => write!(f, "{}%", current),
            DeviceStatus::Position {
                current,
                target: Some(target),
            } => write!(f, "{}% -> {}%", current, target),
        }
    }
}

/// 一帧显示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub mode: Mode,
    pub hint: Option<&'static str>,
    pub lines: Vec<DeviceLine>,
    /// 长时间无活动时关闭屏幕
    pub screen_on: bool,
}

impl StatusView {
    /// 由当前模式和注册表生成
    pub fn build(mode: Mode, registry: &Registry, screen_on: bool) -> Self {
        let hint = (mode == Mode::Discovery && !registry.is_empty()).then_some(DISCOVERY_HINT);
        Self {
            mode,
            hint,
            lines: registry.iter().map(DeviceLine::from_device).collect(),
            screen_on,
        }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.mode)?;
        if let Some(hint) = self.hint {
            write!(f, " {}", hint)?;
        }
        for line in &self.lines {
            write!(f, " | {}", line)?;
        }
        Ok(())
    }
}

/// 状态显示
pub trait StatusDisplay {
    fn render(&mut self, view: &StatusView);
}

/// 以日志输出显示内容（只在内容变化时输出）
#[derive(Debug, Default)]
pub struct TracingDisplay {
    last: Option<StatusView>,
}

impl TracingDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusDisplay for TracingDisplay {
    fn render(&mut self, view: &StatusView) {
        if self.last.as_ref() == Some(view) {
            return;
        }
        if view.screen_on {
            debug!("Display: {}", view);
        } else {
            debug!("Display off");
        }
        self.last = Some(view.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lines() {
        let address = WireAddress::from_node_id([0xAA, 0xBB, 0xCC]);
        let mut device = Device::discovered(address, 0);
        assert_eq!(DeviceLine::from_device(&device).to_string(), "AABBCC: N/A");

        device.apply_position(42, 0);
        device.set_target(50, 0);
        assert_eq!(DeviceLine::from_device(&device).to_string(), "AABBCC: 42% -> 50%");

        device.commanded = false;
        device.apply_position(155, 0);
        assert_eq!(DeviceLine::from_device(&device).to_string(), "AABBCC: 99%");

        device.mark_unreachable(60_000, 30_000);
        assert_eq!(DeviceLine::from_device(&device).to_string(), "AABBCC: offline");
    }

    #[test]
    fn test_discovery_hint() {
        let mut registry = Registry::new();
        assert_eq!(StatusView::build(Mode::Discovery, &registry, true).hint, None);

        registry.insert(WireAddress::new(1, 2, 3), 0);
        let view = StatusView::build(Mode::Discovery, &registry, true);
        assert_eq!(view.hint, Some(DISCOVERY_HINT));
        assert!(view.to_string().starts_with("[Discovery] Press BTN to finish"));

        assert_eq!(StatusView::build(Mode::Operation, &registry, true).hint, None);
    }
}
