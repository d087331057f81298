//! 主机端模拟的网络层和控制面板
//!
//! 网络层在启动一段时间后视为已入网，按脚本依次投递通道请求；
//! 面板在启动一段时间后按一次确认键，并可模拟一次按住按钮；
//! 恢复出厂后重新安排一次确认。

use std::collections::{BTreeMap, VecDeque};

use somfy_driver::{
    ChannelId, ChannelRequest, Clock, ControlPanel, Gesture, HoldTracker, MeshNetwork,
};
use tracing::{debug, info};

/// 解析 `CH=VALUE` 形式的通道请求，VALUE 为百分比或 `up`/`down`/`stop`
pub fn parse_request(s: &str) -> Result<(ChannelId, ChannelRequest), String> {
    let (channel, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CH=VALUE, got {:?}", s))?;
    let channel: u8 = channel
        .trim()
        .parse()
        .map_err(|_| format!("invalid channel {:?}", channel))?;
    let request = match value.trim().to_ascii_lowercase().as_str() {
        "up" | "open" => ChannelRequest::Up,
        "down" | "close" => ChannelRequest::Down,
        "stop" => ChannelRequest::Stop,
        pct => ChannelRequest::Set(
            pct.parse()
                .map_err(|_| format!("invalid percentage {:?}", pct))?,
        ),
    };
    Ok((ChannelId(channel), request))
}

/// 模拟网络层
pub struct SimulatedMesh<C> {
    clock: C,
    started_at: u64,
    join_after_ms: u64,
    inclusion_requests: usize,
    pending: VecDeque<(ChannelId, ChannelRequest)>,
    values: BTreeMap<ChannelId, Option<u8>>,
}

impl<C: Clock> SimulatedMesh<C> {
    pub fn new(clock: C, join_after_ms: u64) -> Self {
        let started_at = clock.now_ms();
        Self {
            clock,
            started_at,
            join_after_ms,
            inclusion_requests: 0,
            pending: VecDeque::new(),
            values: BTreeMap::new(),
        }
    }

    /// 排队一个通道请求
    pub fn queue(&mut self, channel: ChannelId, request: ChannelRequest) {
        self.pending.push_back((channel, request));
    }

    pub fn inclusion_requests(&self) -> usize {
        self.inclusion_requests
    }

    /// 最近一次发布的通道值
    pub fn value(&self, channel: ChannelId) -> Option<Option<u8>> {
        self.values.get(&channel).copied()
    }
}

impl<C: Clock> MeshNetwork for SimulatedMesh<C> {
    fn is_member(&self) -> bool {
        self.clock.now_ms().saturating_sub(self.started_at) >= self.join_after_ms
    }

    fn request_inclusion(&mut self) {
        self.inclusion_requests += 1;
    }

    fn take_request(&mut self, channel: ChannelId) -> Option<ChannelRequest> {
        let index = self.pending.iter().position(|(c, _)| *c == channel)?;
        self.pending.remove(index).map(|(_, request)| request)
    }

    fn publish(&mut self, channel: ChannelId, value: Option<u8>) {
        if self.values.insert(channel, value) != Some(value) {
            debug!("Channel {} = {:?}", channel, value);
        }
    }

    fn send_report(&mut self, channel: ChannelId) {
        match self.values.get(&channel).copied().flatten() {
            Some(value) => info!("Report {}: {}%", channel, value),
            None => info!("Report {}: unknown", channel),
        }
    }
}

/// 脚本化控制面板
pub struct ScriptedPanel<C> {
    clock: C,
    started_at: u64,
    confirm_after_ms: u64,
    /// 下一次确认按下的时刻，按下后清空
    confirm_at: Option<u64>,
    hold_ms: Option<u64>,
    tracker: HoldTracker,
}

impl<C: Clock> ScriptedPanel<C> {
    /// `hold_ms` 为启动时按住按钮的时长
    pub fn new(clock: C, confirm_after_ms: u64, hold_ms: Option<u64>) -> Self {
        let started_at = clock.now_ms();
        Self {
            clock,
            started_at,
            confirm_after_ms,
            confirm_at: Some(started_at + confirm_after_ms),
            hold_ms,
            tracker: HoldTracker::new(),
        }
    }

    fn elapsed(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_at)
    }
}

impl<C: Clock> ControlPanel for ScriptedPanel<C> {
    fn confirm_pressed(&mut self) -> bool {
        match self.confirm_at {
            Some(at) if self.clock.now_ms() >= at => {
                self.confirm_at = None;
                debug!("Confirm pressed");
                true
            },
            _ => false,
        }
    }

    fn take_gesture(&mut self) -> Option<Gesture> {
        let hold_ms = self.hold_ms?;
        if !self.tracker.is_pressed() {
            self.tracker.press(self.started_at);
        }
        if self.elapsed() < hold_ms {
            return None;
        }
        self.hold_ms = None;
        let released_at = self.started_at + hold_ms;
        let gesture = self.tracker.release(released_at);
        info!("Button released after {} ms: {:?}", hold_ms, gesture);
        if gesture == Some(Gesture::FactoryReset) {
            self.confirm_at = Some(released_at + self.confirm_after_ms);
        }
        gesture
    }
}
