//! 单个电机的状态
//!
//! 每个设备携带自己的指令/卡住检测状态机：
//!
//! ```text
//! Idle ──set_target──► Commanded ──► {Satisfied, Stopped, TimedOut} ──► Idle
//! ```
//!
//! 所有时间戳均为 [`Clock`](somfy_link::Clock) 给出的毫秒数。

use somfy_protocol::{MAX_PERCENTAGE, MoveTarget, WireAddress};

use crate::BridgeConfig;

/// 一次指令评估的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// 无需动作（空闲，或指令已发送、等待到位）
    None,
    /// 发送停止帧
    Stop,
    /// 已到位
    Satisfied,
    /// 指令超时，不再重试
    TimedOut,
    /// 发送移动指令
    Move(MoveTarget),
}

/// 一次成功状态读取带来的变化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionUpdate {
    /// 位置是否变化
    pub changed: bool,
    /// 是否从离线恢复
    pub came_online: bool,
}

/// 电机设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: WireAddress,
    /// 最近一次读取的位置（`None` 表示首次读取成功之前）
    ///
    /// 解码时不做截断，可能大于 99。
    pub current_percentage: Option<u8>,
    pub online: bool,
    pub commanded: bool,
    pub commanded_percentage: u8,
    pub command_sent: bool,
    pub command_acked: bool,
    pub stop_requested: bool,
    pub command_issued_at: u64,
    pub last_status_at: u64,
    pub last_position_value: Option<u8>,
    pub last_position_change_at: u64,
    pub unjam_attempts: u8,
    pub last_unjam_attempt_at: Option<u64>,
    /// 需要立即上报（由状态机和轮询设置，由上报调度消费）
    pub report_needed: bool,
}

impl Device {
    /// 新发现的设备：位置未知，在线，所有标志清零
    pub fn discovered(address: WireAddress, now: u64) -> Self {
        Self {
            address,
            current_percentage: None,
            online: true,
            commanded: false,
            commanded_percentage: 0,
            command_sent: false,
            command_acked: false,
            stop_requested: false,
            command_issued_at: now,
            last_status_at: now,
            last_position_value: None,
            last_position_change_at: now,
            unjam_attempts: 0,
            last_unjam_attempt_at: None,
            report_needed: false,
        }
    }

    /// 设置目标位置（截断到 0..=99）
    ///
    /// 新目标重新开放解卡尝试次数。
    pub fn set_target(&mut self, percentage: u8, now: u64) {
        self.commanded = true;
        self.command_sent = false;
        self.command_acked = false;
        self.commanded_percentage = percentage.min(MAX_PERCENTAGE);
        self.command_issued_at = now;
        self.unjam_attempts = 0;
        self.last_unjam_attempt_at = None;
    }

    /// 请求停止
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// 截断到 0..=99 的当前位置
    pub fn clamped_percentage(&self) -> Option<u8> {
        self.current_percentage.map(|p| p.min(MAX_PERCENTAGE))
    }

    /// 对网状网络发布的值（未知或离线时为 `None`）
    pub fn channel_value(&self) -> Option<u8> {
        if self.online { self.clamped_percentage() } else { None }
    }

    /// 当前位置是否已在目标容差之内（位置未知时视为未到位）
    pub fn is_satisfied(&self, tolerance: u8) -> bool {
        self.current_percentage
            .is_some_and(|p| p.abs_diff(self.commanded_percentage) < tolerance)
    }

    /// 评估一次指令状态机，按顺序第一条匹配的规则生效
    ///
    /// 停止、到位和超时会清除 `commanded` 并设置 `report_needed`。
    /// 返回 [`CommandAction::Move`] 时由调用方发送指令并调用 [`Device::mark_sent`]。
    ///
    /// 已发送的指令不会每个周期重发：只有卡住检测（[`Device::try_unjam`]）
    /// 清除发送标志后才会再次发送，因此每个目标的重发次数有上限。
    pub fn step(&mut self, now: u64, config: &BridgeConfig) -> CommandAction {
        if self.stop_requested {
            self.stop_requested = false;
            self.commanded = false;
            self.report_needed = true;
            return CommandAction::Stop;
        }
        if !self.commanded {
            return CommandAction::None;
        }
        if self.is_satisfied(config.satisfied_tolerance) {
            self.commanded = false;
            self.report_needed = true;
            return CommandAction::Satisfied;
        }
        if now.saturating_sub(self.command_issued_at) > config.command_timeout_ms {
            self.commanded = false;
            self.report_needed = true;
            return CommandAction::TimedOut;
        }
        if !self.command_sent {
            return CommandAction::Move(MoveTarget::for_percentage(self.commanded_percentage));
        }
        CommandAction::None
    }

    /// 移动指令已发出
    pub fn mark_sent(&mut self) {
        self.command_sent = true;
    }

    /// 记录一次成功的状态读取
    pub fn apply_position(&mut self, percentage: u8, now: u64) -> PositionUpdate {
        let came_online = !self.online;
        self.online = true;
        self.last_status_at = now;
        self.current_percentage = Some(percentage);

        let changed = self.last_position_value != Some(percentage);
        if changed {
            self.last_position_value = Some(percentage);
            self.last_position_change_at = now;
            self.unjam_attempts = 0;
            self.last_unjam_attempt_at = None;
            if self.command_sent {
                self.command_acked = true;
            }
        }
        if came_online {
            self.report_needed = true;
        }
        PositionUpdate { changed, came_online }
    }

    /// 记录一轮失败的状态读取
    ///
    /// 距上次成功读取达到离线超时后翻转为离线，每个离线周期只翻转一次。
    pub fn mark_unreachable(&mut self, now: u64, offline_timeout_ms: u64) -> bool {
        if self.online && now.saturating_sub(self.last_status_at) >= offline_timeout_ms {
            self.online = false;
            self.report_needed = true;
            return true;
        }
        false
    }

    /// 卡住检测：位置静止过久时清除发送/确认标志，促使下个周期重发
    ///
    /// 静止时间从位置最后变化和指令下发两者中较晚的一个算起。
    pub fn try_unjam(&mut self, now: u64, config: &BridgeConfig) -> bool {
        if !self.commanded || !self.command_sent {
            return false;
        }
        let stalled_since = self.last_position_change_at.max(self.command_issued_at);
        if now.saturating_sub(stalled_since) < config.jam_stall_ms {
            return false;
        }
        if self.unjam_attempts >= config.max_unjam_attempts {
            return false;
        }
        if self
            .last_unjam_attempt_at
            .is_some_and(|t| now.saturating_sub(t) < config.jam_retry_gap_ms)
        {
            return false;
        }
        self.command_sent = false;
        self.command_acked = false;
        self.unjam_attempts += 1;
        self.last_unjam_attempt_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: WireAddress = WireAddress::new(0x10, 0x20, 0x30);

    fn config() -> BridgeConfig {
        BridgeConfig::default()
    }

    #[test]
    fn test_discovered_defaults() {
        let device = Device::discovered(ADDR, 1_000);
        assert_eq!(device.current_percentage, None);
        assert!(device.online);
        assert!(!device.commanded && !device.command_sent && !device.command_acked);
        assert_eq!(device.last_status_at, 1_000);
        assert_eq!(device.channel_value(), None);
    }

    #[test]
    fn test_set_target_clamps_and_resets() {
        let mut device = Device::discovered(ADDR, 0);
        device.command_sent = true;
        device.command_acked = true;
        device.unjam_attempts = 10;

        device.set_target(120, 500);
        assert!(device.commanded);
        assert!(!device.command_sent && !device.command_acked);
        assert_eq!(device.commanded_percentage, 99);
        assert_eq!(device.command_issued_at, 500);
        assert_eq!(device.unjam_attempts, 0);
    }

    #[test]
    fn test_step_rule_order() {
        let config = config();
        let mut device = Device::discovered(ADDR, 0);
        device.apply_position(40, 0);

        // 停止优先于到位
        device.set_target(41, 0);
        device.request_stop();
        assert_eq!(device.step(10, &config), CommandAction::Stop);
        assert!(!device.commanded && !device.stop_requested && device.report_needed);

        device.report_needed = false;
        device.set_target(41, 0);
        assert_eq!(device.step(10, &config), CommandAction::Satisfied);
        assert!(device.report_needed);

        device.set_target(80, 0);
        assert_eq!(
            device.step(10, &config),
            CommandAction::Move(MoveTarget::Position(80))
        );
        device.mark_sent();
        assert_eq!(device.step(20, &config), CommandAction::None);
        device.command_acked = true;
        assert_eq!(device.step(30, &config), CommandAction::None);

        assert_eq!(device.step(60_001, &config), CommandAction::TimedOut);
        assert!(!device.commanded);
        assert_eq!(device.step(60_002, &config), CommandAction::None);
    }

    #[test]
    fn test_unknown_position_is_not_satisfied() {
        let mut device = Device::discovered(ADDR, 0);
        device.set_target(0, 0);
        assert!(!device.is_satisfied(2));
        assert_eq!(
            device.step(0, &config()),
            CommandAction::Move(MoveTarget::OpenLimit)
        );
    }

    #[test]
    fn test_apply_position_acks_only_after_send() {
        let mut device = Device::discovered(ADDR, 0);
        device.set_target(50, 0);

        let update = device.apply_position(10, 100);
        assert!(update.changed && !update.came_online);
        assert!(!device.command_acked);

        device.mark_sent();
        let update = device.apply_position(10, 200);
        assert!(!update.changed);
        assert!(!device.command_acked);

        device.apply_position(15, 300);
        assert!(device.command_acked);
        assert_eq!(device.last_position_change_at, 300);
    }

    #[test]
    fn test_offline_flips_once() {
        let mut device = Device::discovered(ADDR, 0);
        assert!(!device.mark_unreachable(29_999, 30_000));
        assert!(device.mark_unreachable(30_000, 30_000));
        assert!(!device.mark_unreachable(40_000, 30_000));
        assert!(!device.online);

        let update = device.apply_position(99, 41_000);
        assert!(update.came_online);
        assert!(device.online);
    }

    #[test]
    fn test_decoded_position_is_not_clamped() {
        let mut device = Device::discovered(ADDR, 0);
        device.apply_position(155, 0);
        assert_eq!(device.current_percentage, Some(155));
        assert_eq!(device.clamped_percentage(), Some(99));
    }

    #[test]
    fn test_unjam_spacing_and_bound() {
        let config = config();
        let mut device = Device::discovered(ADDR, 0);
        device.apply_position(20, 0);
        device.set_target(80, 0);
        device.mark_sent();

        assert!(!device.try_unjam(3_999, &config));
        assert!(device.try_unjam(4_000, &config));
        assert!(!device.command_sent);

        device.mark_sent();
        assert!(!device.try_unjam(5_999, &config));
        assert!(device.try_unjam(6_000, &config));

        let mut now = 6_000;
        while device.unjam_attempts < config.max_unjam_attempts {
            now += config.jam_retry_gap_ms;
            device.mark_sent();
            assert!(device.try_unjam(now, &config));
        }
        device.mark_sent();
        assert!(!device.try_unjam(now + 10_000, &config));
        assert_eq!(device.unjam_attempts, 10);
    }
}
