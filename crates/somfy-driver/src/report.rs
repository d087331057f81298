//! 主动上报调度
//!
//! 重要事件（指令完成、停止、超时、上下线）立即上报；其余变化按节流间隔上报：
//! 近期有活动时 10s 一次，否则 300s 一次。

use tracing::debug;

use crate::{BridgeConfig, ChannelId, MeshNetwork};

/// 上报调度器
#[derive(Debug, Clone)]
pub struct ReportScheduler {
    active_interval_ms: u64,
    idle_interval_ms: u64,
    activity_window_ms: u64,
    last_report_sent: Option<u64>,
    last_activity: Option<u64>,
}

impl ReportScheduler {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            active_interval_ms: config.active_report_interval_ms,
            idle_interval_ms: config.idle_report_interval_ms,
            activity_window_ms: config.activity_window_ms,
            last_report_sent: None,
            last_activity: None,
        }
    }

    /// 记录一次值得关注的活动（位置变化、指令、按钮）
    pub fn mark_activity(&mut self, now: u64) {
        self.last_activity = Some(now);
    }

    pub fn last_activity(&self) -> Option<u64> {
        self.last_activity
    }

    pub fn last_report_sent(&self) -> Option<u64> {
        self.last_report_sent
    }

    /// 最近一段时间内是否有活动
    pub fn is_active(&self, now: u64) -> bool {
        self.last_activity
            .is_some_and(|t| now.saturating_sub(t) < self.activity_window_ms)
    }

    /// 当前的节流间隔
    pub fn interval_ms(&self, now: u64) -> u64 {
        if self.is_active(now) {
            self.active_interval_ms
        } else {
            self.idle_interval_ms
        }
    }

    /// 上报一次（必要时）
    ///
    /// 重要事件立即上报；否则在距上次上报达到节流间隔时上报（从未上报视为到期）。
    /// 上报覆盖聚合通道和每个设备通道。返回是否发送了上报。
    pub fn notify<M: MeshNetwork + ?Sized>(
        &mut self,
        important: bool,
        now: u64,
        mesh: &mut M,
        device_count: usize,
    ) -> bool {
        let due = important
            || self
                .last_report_sent
                .is_none_or(|t| now.saturating_sub(t) >= self.interval_ms(now));
        if !due {
            return false;
        }

        debug!(
            "Sending unsolicited report ({} channel(s), important: {})",
            device_count + 1,
            important
        );
        for channel in ChannelId::all(device_count) {
            mesh.send_report(channel);
        }
        self.last_report_sent = Some(now);
        true
    }
}
