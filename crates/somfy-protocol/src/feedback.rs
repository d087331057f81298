//! 应答帧解析
//!
//! 应答负载以 `[源地址(3), 目标地址(3)]` 开头，源地址即电机自身地址。

use crate::{
    Frame, ID_HERE_IS_MOTOR, ID_HERE_IS_POSITION, MessageId, Payload, ProtocolError, WireAddress,
};

fn expect_type(frame: &Frame, expected: u8) -> Result<(), ProtocolError> {
    if frame.msg_type != expected {
        return Err(ProtocolError::UnexpectedMessage {
            expected,
            actual: frame.msg_type,
        });
    }
    Ok(())
}

fn expect_len(frame: &Frame, expected: usize) -> Result<(), ProtocolError> {
    if frame.payload.len() < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: frame.payload.len(),
        });
    }
    Ok(())
}

/// 发现应答 (0x9F)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HereIsMotor {
    /// 电机线上地址
    pub address: WireAddress,
    /// 电机节点类型
    pub node_type: u8,
}

impl TryFrom<&Frame> for HereIsMotor {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        expect_type(frame, ID_HERE_IS_MOTOR)?;
        expect_len(frame, 3)?;

        Ok(Self {
            address: WireAddress::from_slice(&frame.payload)?,
            node_type: frame.node_type,
        })
    }
}

/// 位置应答 (0xF2)
///
/// # 负载布局
///
/// ```text
/// [src(3), dst(3), ticks_lo, ticks_hi, ~percentage, ...]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HereIsPosition {
    /// 应答电机地址
    pub address: WireAddress,
    /// 位置百分比（`0xFF - 原始字节`，不做截断，可能超过 99）
    pub percentage: u8,
    /// 原始位置脉冲数（未混淆处理）
    pub ticks: u16,
}

/// 百分比字节在负载中的偏移
const PERCENTAGE_OFFSET: usize = 8;

impl TryFrom<&Frame> for HereIsPosition {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        expect_type(frame, ID_HERE_IS_POSITION)?;
        expect_len(frame, PERCENTAGE_OFFSET + 1)?;

        let payload = &frame.payload;
        Ok(Self {
            address: WireAddress::from_slice(payload)?,
            percentage: 0xFF - payload[PERCENTAGE_OFFSET],
            ticks: u16::from_le_bytes([payload[6], payload[7]]),
        })
    }
}

impl HereIsPosition {
    /// 构建应答帧（用于模拟电机）
    pub fn to_frame(self, node_type: u8) -> Frame {
        let mut payload = Payload::new();
        payload.extend_from_slice(&self.address.bytes());
        payload.extend_from_slice(&crate::MASTER_ADDRESS);
        payload.extend_from_slice(&self.ticks.to_le_bytes());
        payload.push(0xFF - self.percentage);
        Frame {
            msg_type: MessageId::HereIsPosition.into(),
            node_type,
            payload,
        }
    }
}

impl HereIsMotor {
    /// 构建应答帧（用于模拟电机）
    pub fn to_frame(self) -> Frame {
        let mut payload = Payload::new();
        payload.extend_from_slice(&self.address.bytes());
        payload.extend_from_slice(&crate::MASTER_ADDRESS);
        Frame {
            msg_type: MessageId::HereIsMotor.into(),
            node_type: self.node_type,
            payload,
        }
    }
}
