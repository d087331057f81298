//! # Somfy Protocol
//!
//! Somfy 电机串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 消息类型常量定义
//! - `address`: 3 字节线上地址
//! - `codec`: 帧编码、校验和、长度字节混淆
//! - `control`: 请求帧构建
//! - `feedback`: 应答帧解析
//!
//! ## 帧格式
//!
//! ```text
//! [type, 0xFF - len(payload) - 5, node_type, payload..., checksum_hi, checksum_lo]
//! ```
//!
//! 校验和为前面所有字节的 16 位累加和，高位在前（大端字节序）。

pub mod address;
pub mod codec;
pub mod control;
pub mod feedback;
pub mod ids;

// 重新导出常用类型
pub use address::*;
pub use codec::*;
pub use control::*;
pub use feedback::*;
pub use ids::*;

use smallvec::SmallVec;
use thiserror::Error;

/// 负载缓冲区（栈上预留最大负载长度，避免堆分配）
pub type Payload = SmallVec<[u8; MAX_PAYLOAD_LEN]>;

/// Somfy 串口帧的统一抽象
///
/// # 在架构中的位置
///
/// ```text
/// Protocol Layer (somfy-protocol)
///     ↓ TryFrom<&Frame> 解析 / to_frame() 构建
/// Frame (此类型)
///     ↓ 编码/流式解码在链路层实现
/// Link Layer (somfy-link)
///     ↓ 半双工串口
/// Hardware
/// ```
///
/// `node_type` 是帧头的保留字节：本机发出的帧固定为 `0xFF`，
/// 电机应答中携带电机的节点类型。它参与校验和，但不属于负载。
///
/// # 示例
///
/// ```rust
/// use somfy_protocol::{Frame, MessageId};
///
/// let frame = Frame::new(MessageId::DiscoverAll.into(), &[0x80, 0x80, 0x80, 0, 0, 0]).unwrap();
/// assert_eq!(frame.payload_slice().len(), 6);
/// assert_eq!(frame.message_id(), Some(MessageId::DiscoverAll));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// 消息类型（原始字节）
    pub msg_type: u8,

    /// 节点类型（保留字节）
    pub node_type: u8,

    /// 帧负载（0-16 字节）
    pub payload: Payload,
}

impl Frame {
    /// 创建本机发出的帧（节点类型固定为保留值 `0xFF`）
    pub fn new(msg_type: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        Self::with_node_type(msg_type, NODE_TYPE_RESERVED, payload)
    }

    /// 创建指定节点类型的帧（主要用于模拟电机应答）
    pub fn with_node_type(msg_type: u8, node_type: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            msg_type,
            node_type,
            payload: Payload::from_slice(payload),
        })
    }

    /// 获取负载切片
    pub fn payload_slice(&self) -> &[u8] {
        &self.payload
    }

    /// 解析消息类型（未知类型返回 None）
    pub fn message_id(&self) -> Option<MessageId> {
        MessageId::try_from(self.msg_type).ok()
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Result<EncodedFrame, ProtocolError> {
        encode_with_node_type(self.msg_type, self.node_type, &self.payload)
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Invalid length byte: 0x{0:02X}")]
    InvalidLengthByte(u8),

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Checksum mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    ChecksumMismatch { computed: u16, received: u16 },

    #[error("Unexpected message type: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedMessage { expected: u8, actual: u8 },

    #[error("Invalid payload length: expected at least {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
