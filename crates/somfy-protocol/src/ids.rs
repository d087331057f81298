//! 消息类型常量定义和枚举
//!
//! 线上的消息类型均为逻辑消息号按位取反后的值。

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 请求帧（本机 -> 电机）
// ============================================================================

/// 广播发现所有电机
pub const ID_DISCOVER_ALL: u8 = 0xBF;

/// 查询电机状态（位置）
pub const ID_REPORT_MOTOR_STATUS: u8 = 0xF3;

/// 移动电机（绝对位置或限位，由负载区分）
pub const ID_MOVE_TO: u8 = 0xFC;

/// 停止电机
pub const ID_STOP: u8 = 0xFD;

// ============================================================================
// 应答帧（电机 -> 本机）
// ============================================================================

/// 发现应答
pub const ID_HERE_IS_MOTOR: u8 = 0x9F;

/// 位置应答
pub const ID_HERE_IS_POSITION: u8 = 0xF2;

// ============================================================================
// 帧结构常量
// ============================================================================

/// 最大负载长度
pub const MAX_PAYLOAD_LEN: usize = 16;

/// 帧头长度（类型 + 长度 + 节点类型）
pub const HEADER_LEN: usize = 3;

/// 校验和长度
pub const CHECKSUM_LEN: usize = 2;

/// 最大帧长度
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + CHECKSUM_LEN;

/// 本机发出帧的保留字节
pub const NODE_TYPE_RESERVED: u8 = 0xFF;

/// 本机（主控）的线上源地址
pub const MASTER_ADDRESS: [u8; 3] = [0x80, 0x80, 0x80];

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageId {
    DiscoverAll = 0xBF,
    ReportMotorStatus = 0xF3,
    /// 绝对位置与限位移动共用同一个消息号
    MoveTo = 0xFC,
    Stop = 0xFD,
    HereIsMotor = 0x9F,
    HereIsPosition = 0xF2,
}

impl MessageId {
    /// 是否为电机应答
    pub fn is_reply(self) -> bool {
        matches!(self, Self::HereIsMotor | Self::HereIsPosition)
    }
}
