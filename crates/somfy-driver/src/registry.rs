//! 设备注册表
//!
//! 按地址升序排列、无重复、容量固定的设备集合。注册表只会增长，
//! 唯一的收缩方式是 [`Registry::clear`]（恢复出厂设置）。

use smallvec::SmallVec;
use somfy_protocol::WireAddress;
use tracing::{debug, info};

use crate::Device;

/// 注册表容量
pub const MAX_DEVICES: usize = 4;

/// 插入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 已插入到该索引
    Inserted(usize),
    /// 地址已存在
    Duplicate,
    /// 注册表已满，新设备被忽略
    Full,
}

/// 设备注册表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    devices: SmallVec<[Device; MAX_DEVICES]>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由持久化的地址列表重建（经过排序插入，重复地址被丢弃）
    pub fn from_addresses<I>(addresses: I, now: u64) -> Self
    where
        I: IntoIterator<Item = WireAddress>,
    {
        let mut registry = Self::new();
        for address in addresses {
            registry.insert(address, now);
        }
        registry
    }

    /// 按序插入新设备
    pub fn insert(&mut self, address: WireAddress, now: u64) -> InsertOutcome {
        let mut index = self.devices.len();
        for (i, device) in self.devices.iter().enumerate() {
            if device.address == address {
                return InsertOutcome::Duplicate;
            }
            if device.address > address {
                index = i;
                break;
            }
        }
        if self.is_full() {
            debug!("Registry full, ignoring motor {}", address);
            return InsertOutcome::Full;
        }
        info!("Discovered new motor: {}", address);
        self.devices.insert(index, Device::discovered(address, now));
        InsertOutcome::Inserted(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.devices.len() >= MAX_DEVICES
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index)
    }

    /// 按地址查找
    pub fn find(&self, address: WireAddress) -> Option<&Device> {
        self.devices.iter().find(|d| d.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    /// 注册表顺序的地址列表
    pub fn addresses(&self) -> impl Iterator<Item = WireAddress> + '_ {
        self.devices.iter().map(|d| d.address)
    }

    /// 在线设备中最小的已知位置（截断到 0..=99）
    pub fn min_percentage(&self) -> Option<u8> {
        self.devices.iter().filter_map(Device::channel_value).min()
    }

    /// 是否有设备处于指令中
    pub fn any_commanded(&self) -> bool {
        self.devices.iter().any(|d| d.commanded || d.stop_requested)
    }

    /// 取出并清除所有设备的 `report_needed` 标志
    pub fn take_report_needed(&mut self) -> bool {
        let mut needed = false;
        for device in &mut self.devices {
            needed |= std::mem::take(&mut device.report_needed);
        }
        needed
    }

    /// 清空（恢复出厂设置）
    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
