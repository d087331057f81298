//! 网状网络通道映射
//!
//! 网络层暴露 N+1 个逻辑通道：通道 0 为聚合通道，通道 `i + 1` 对应注册表中的第 `i` 个设备。
//! 每个通道都有读/写语义（位置 0..=99，越小越开）以及瞬时的上/下/停控制信号。

use std::fmt;

use somfy_protocol::MAX_PERCENTAGE;
use tracing::debug;

use crate::{Device, Registry};

/// 逻辑通道编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// 聚合通道
    pub const AGGREGATE: Self = Self(0);

    /// 第 `index` 个设备的通道
    pub fn device(index: usize) -> Self {
        Self(index as u8 + 1)
    }

    /// 对应的设备索引（聚合通道返回 `None`）
    pub fn device_index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    pub fn is_aggregate(self) -> bool {
        self == Self::AGGREGATE
    }

    /// 注册表对应的全部通道（聚合通道在前）
    pub fn all(device_count: usize) -> impl Iterator<Item = Self> {
        (0..=device_count).map(|i| Self(i as u8))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// 网络侧对通道的请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequest {
    /// 设置位置
    Set(u8),
    /// 全开
    Up,
    /// 全关
    Down,
    /// 停止
    Stop,
}

/// 网状网络层
pub trait MeshNetwork {
    /// 是否已是网络成员
    fn is_member(&self) -> bool;

    /// 请求入网（开始学习/包含流程）
    fn request_inclusion(&mut self);

    /// 取出网络侧对某通道的一个待处理请求
    fn take_request(&mut self, channel: ChannelId) -> Option<ChannelRequest>;

    /// 发布通道当前值（`None` 表示未知）
    fn publish(&mut self, channel: ChannelId, value: Option<u8>);

    /// 对某通道发送主动上报
    fn send_report(&mut self, channel: ChannelId);
}

impl<M: MeshNetwork + ?Sized> MeshNetwork for &mut M {
    fn is_member(&self) -> bool {
        (**self).is_member()
    }

    fn request_inclusion(&mut self) {
        (**self).request_inclusion()
    }

    fn take_request(&mut self, channel: ChannelId) -> Option<ChannelRequest> {
        (**self).take_request(channel)
    }

    fn publish(&mut self, channel: ChannelId, value: Option<u8>) {
        (**self).publish(channel, value)
    }

    fn send_report(&mut self, channel: ChannelId) {
        (**self).send_report(channel)
    }
}

/// 读取通道值
///
/// 聚合通道返回在线设备中最小的已知位置；设备通道在未知或离线时返回 `None`。
pub fn channel_value(registry: &Registry, channel: ChannelId) -> Option<u8> {
    match channel.device_index() {
        None => registry.min_percentage(),
        Some(index) => registry.get(index).and_then(|d| d.channel_value()),
    }
}

/// 将网络请求转换为设备的目标/停止请求
///
/// 聚合通道的请求作用于所有设备。返回受影响的设备数。
pub fn apply_request(registry: &mut Registry, channel: ChannelId, request: ChannelRequest, now: u64) -> usize {
    debug!("Channel {} request {:?}", channel, request);
    let apply = |device: &mut Device| match request {
        ChannelRequest::Set(percentage) => device.set_target(percentage.min(MAX_PERCENTAGE), now),
        ChannelRequest::Up => device.set_target(0, now),
        ChannelRequest::Down => device.set_target(MAX_PERCENTAGE, now),
        ChannelRequest::Stop => device.request_stop(),
    };

    match channel.device_index() {
        None => {
            let mut count = 0;
            for device in registry.iter_mut() {
                apply(device);
                count += 1;
            }
            count
        },
        Some(index) => match registry.get_mut(index) {
            Some(device) => {
                apply(device);
                1
            },
            None => 0,
        },
    }
}
