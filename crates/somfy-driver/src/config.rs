//! 桥接器配置
//!
//! 所有时间均以毫秒表示，默认值与现场固件一致。

use std::time::Duration;

use somfy_link::LinkConfig;

/// 桥接器配置
///
/// # Example
///
/// ```
/// use somfy_driver::BridgeConfig;
///
/// // 默认配置（6s 轮询，30s 离线超时）
/// let config = BridgeConfig::default();
///
/// // 自定义配置
/// let config = BridgeConfig {
///     poll_interval_ms: 2_000,
///     offline_timeout_ms: 10_000,
///     ..BridgeConfig::default()
/// };
/// assert_eq!(config.status_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BridgeConfig {
    /// 单次读帧的时间预算
    pub read_budget_ms: u64,
    /// 发现广播后的监听窗口
    pub discovery_listen_ms: u64,
    /// 每个设备每轮状态查询的最大尝试次数
    pub status_retries: u32,
    /// 状态查询发送后到读取应答前的等待
    pub status_retry_delay_ms: u64,
    /// 移动指令重复发送次数（链路冗余）
    pub move_repeat: u32,
    /// 重复发送之间的间隔
    pub move_gap_ms: u64,
    /// 目标与当前位置之差小于该值即视为到位
    pub satisfied_tolerance: u8,
    /// 指令超时
    pub command_timeout_ms: u64,
    /// 位置静止多久视为卡住
    pub jam_stall_ms: u64,
    /// 两次解卡尝试之间的最小间隔
    pub jam_retry_gap_ms: u64,
    /// 每个目标最多的解卡尝试次数
    pub max_unjam_attempts: u8,
    /// 无成功轮询多久视为离线
    pub offline_timeout_ms: u64,
    /// 空闲时的轮询周期（有活动指令时每个周期都轮询）
    pub poll_interval_ms: u64,
    /// 运行模式的周期
    pub operation_tick_ms: u64,
    /// 发现模式的周期
    pub discovery_tick_ms: u64,
    /// 近期有活动时的上报间隔
    pub active_report_interval_ms: u64,
    /// 空闲时的上报间隔
    pub idle_report_interval_ms: u64,
    /// "近期活动" 的时间窗口
    pub activity_window_ms: u64,
    /// 无活动多久后关闭屏幕
    pub screen_idle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_budget_ms: 30,
            discovery_listen_ms: 100,
            status_retries: 5,
            status_retry_delay_ms: 80,
            move_repeat: 2,
            move_gap_ms: 40,
            satisfied_tolerance: 2,
            command_timeout_ms: 60_000,
            jam_stall_ms: 4_000,
            jam_retry_gap_ms: 2_000,
            max_unjam_attempts: 10,
            offline_timeout_ms: 30_000,
            poll_interval_ms: 6_000,
            operation_tick_ms: 300,
            discovery_tick_ms: 200,
            active_report_interval_ms: 10_000,
            idle_report_interval_ms: 300_000,
            activity_window_ms: 30_000,
            screen_idle_ms: 60_000,
        }
    }
}

impl BridgeConfig {
    /// 单次读帧的时间预算
    pub fn read_budget(&self) -> Duration {
        Duration::from_millis(self.read_budget_ms)
    }

    /// 对应的链路层配置
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            read_budget_ms: self.read_budget_ms,
            ..LinkConfig::default()
        }
    }
}
