//! 请求帧构建
//!
//! 所有请求负载以 `[源地址(3), 目标地址(3)]` 开头，源地址固定为 [`MASTER_ADDRESS`]。

use crate::{
    Frame, ID_MOVE_TO, ID_REPORT_MOTOR_STATUS, ID_STOP, MASTER_ADDRESS, MessageId,
    NODE_TYPE_RESERVED, Payload, ProtocolError, WireAddress,
};

/// 位置百分比上限（0 = 全开，99 = 全关）
pub const MAX_PERCENTAGE: u8 = 99;

/// 移动子功能：绝对位置（百分比）
const MOVE_FUNC_POSITION: u8 = 0xFB;
/// 移动子功能：上行到限位（全开）
const MOVE_FUNC_UP_LIMIT: u8 = 0xFE;
/// 移动子功能：下行到限位（全关）
const MOVE_FUNC_DOWN_LIMIT: u8 = 0xFF;

fn addressed_payload(target: WireAddress) -> Payload {
    let mut payload = Payload::new();
    payload.extend_from_slice(&MASTER_ADDRESS);
    payload.extend_from_slice(&target.bytes());
    payload
}

fn frame(id: MessageId, payload: Payload) -> Frame {
    Frame {
        msg_type: id.into(),
        node_type: NODE_TYPE_RESERVED,
        payload,
    }
}

/// 广播发现指令 (0xBF)
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoverAllCommand;

impl DiscoverAllCommand {
    /// 转换为帧（目标地址为全 0 广播）
    pub fn to_frame(self) -> Frame {
        frame(
            MessageId::DiscoverAll,
            addressed_payload(WireAddress::new(0, 0, 0)),
        )
    }
}

/// 电机状态查询指令 (0xF3)
#[derive(Debug, Clone, Copy)]
pub struct MotorStatusRequest {
    pub address: WireAddress,
}

impl MotorStatusRequest {
    pub fn new(address: WireAddress) -> Self {
        Self { address }
    }

    /// 转换为帧
    pub fn to_frame(self) -> Frame {
        frame(MessageId::ReportMotorStatus, addressed_payload(self.address))
    }
}

/// 移动目标
///
/// 绝对位置与限位移动共用消息号 0xFC，由负载中的子功能字节区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    /// 上行到限位（全开，0%）
    OpenLimit,
    /// 下行到限位（全关，99%）
    CloseLimit,
    /// 移动到绝对位置百分比
    Position(u8),
}

impl MoveTarget {
    /// 根据目标百分比选择移动方式
    ///
    /// 0 使用上限位，>= 99 使用下限位，其余使用绝对位置。
    pub fn for_percentage(percentage: u8) -> Self {
        match percentage {
            0 => Self::OpenLimit,
            p if p >= MAX_PERCENTAGE => Self::CloseLimit,
            p => Self::Position(p),
        }
    }

    /// 子功能及参数字节（已混淆）
    fn encode(self) -> [u8; 4] {
        match self {
            Self::OpenLimit => [MOVE_FUNC_UP_LIMIT, 0xFF, 0xFF, 0xFF],
            Self::CloseLimit => [MOVE_FUNC_DOWN_LIMIT, 0xFF, 0xFF, 0xFF],
            Self::Position(p) => [MOVE_FUNC_POSITION, 0xFF - p, 0xFF, 0xFF],
        }
    }
}

/// 移动指令 (0xFC)
#[derive(Debug, Clone, Copy)]
pub struct MoveCommand {
    pub address: WireAddress,
    pub target: MoveTarget,
}

impl MoveCommand {
    pub fn new(address: WireAddress, target: MoveTarget) -> Self {
        Self { address, target }
    }

    /// 转换为帧
    pub fn to_frame(self) -> Frame {
        let mut payload = addressed_payload(self.address);
        payload.extend_from_slice(&self.target.encode());
        frame(MessageId::MoveTo, payload)
    }
}

/// 停止指令 (0xFD)
#[derive(Debug, Clone, Copy)]
pub struct StopCommand {
    pub address: WireAddress,
}

impl StopCommand {
    pub fn new(address: WireAddress) -> Self {
        Self { address }
    }

    /// 转换为帧（一个保留参数字节）
    pub fn to_frame(self) -> Frame {
        let mut payload = addressed_payload(self.address);
        payload.push(0xFF);
        frame(MessageId::Stop, payload)
    }
}

/// 校验请求帧类型并取出目标地址（负载第 3..6 字节）
fn request_target(frame: &Frame, expected: u8, min_len: usize) -> Result<WireAddress, ProtocolError> {
    if frame.msg_type != expected {
        return Err(ProtocolError::UnexpectedMessage {
            expected,
            actual: frame.msg_type,
        });
    }
    if frame.payload.len() < min_len {
        return Err(ProtocolError::InvalidLength {
            expected: min_len,
            actual: frame.payload.len(),
        });
    }
    WireAddress::from_slice(&frame.payload[3..])
}

impl TryFrom<&Frame> for MotorStatusRequest {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let address = request_target(frame, ID_REPORT_MOTOR_STATUS, 6)?;
        Ok(Self { address })
    }
}

impl TryFrom<&Frame> for MoveCommand {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let address = request_target(frame, ID_MOVE_TO, 10)?;
        let target = match frame.payload[6] {
            MOVE_FUNC_UP_LIMIT => MoveTarget::OpenLimit,
            MOVE_FUNC_DOWN_LIMIT => MoveTarget::CloseLimit,
            MOVE_FUNC_POSITION => MoveTarget::Position(0xFF - frame.payload[7]),
            other => {
                return Err(ProtocolError::InvalidValue {
                    field: "move_function".to_string(),
                    value: other,
                });
            },
        };
        Ok(Self { address, target })
    }
}

impl TryFrom<&Frame> for StopCommand {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let address = request_target(frame, ID_STOP, 6)?;
        Ok(Self { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: WireAddress = WireAddress::new(0x5F, 0xC0, 0xEC);

    #[test]
    fn test_discover_all_payload() {
        let frame = DiscoverAllCommand.to_frame();
        assert_eq!(frame.msg_type, 0xBF);
        assert_eq!(frame.payload_slice(), &[0x80, 0x80, 0x80, 0, 0, 0]);
    }

    #[test]
    fn test_status_request_payload() {
        let frame = MotorStatusRequest::new(ADDR).to_frame();
        assert_eq!(frame.msg_type, 0xF3);
        assert_eq!(frame.payload_slice(), &[0x80, 0x80, 0x80, 0x5F, 0xC0, 0xEC]);
    }

    #[test]
    fn test_move_target_selection() {
        assert_eq!(MoveTarget::for_percentage(0), MoveTarget::OpenLimit);
        assert_eq!(MoveTarget::for_percentage(99), MoveTarget::CloseLimit);
        assert_eq!(MoveTarget::for_percentage(150), MoveTarget::CloseLimit);
        assert_eq!(MoveTarget::for_percentage(1), MoveTarget::Position(1));
        assert_eq!(MoveTarget::for_percentage(50), MoveTarget::Position(50));
    }

    #[test]
    fn test_move_to_position_payload() {
        let frame = MoveCommand::new(ADDR, MoveTarget::Position(50)).to_frame();
        assert_eq!(frame.msg_type, 0xFC);
        assert_eq!(
            frame.payload_slice(),
            &[0x80, 0x80, 0x80, 0x5F, 0xC0, 0xEC, 0xFB, 0xCD, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_move_to_limits_payload() {
        let up = MoveCommand::new(ADDR, MoveTarget::OpenLimit).to_frame();
        assert_eq!(&up.payload_slice()[6..], &[0xFE, 0xFF, 0xFF, 0xFF]);

        let down = MoveCommand::new(ADDR, MoveTarget::CloseLimit).to_frame();
        assert_eq!(&down.payload_slice()[6..], &[0xFF, 0xFF, 0xFF, 0xFF]);

        // 与抓包一致
        let bytes = up.encode().unwrap();
        assert_eq!(&bytes[bytes.len() - 2..], &[0x0A, 0x71]);
    }

    #[test]
    fn test_requests_parse_back() {
        let status = MotorStatusRequest::new(ADDR).to_frame();
        assert_eq!(MotorStatusRequest::try_from(&status).unwrap().address, ADDR);

        for target in [MoveTarget::OpenLimit, MoveTarget::CloseLimit, MoveTarget::Position(37)] {
            let parsed = MoveCommand::try_from(&MoveCommand::new(ADDR, target).to_frame()).unwrap();
            assert_eq!(parsed.address, ADDR);
            assert_eq!(parsed.target, target);
        }

        let stop = StopCommand::new(ADDR).to_frame();
        assert_eq!(StopCommand::try_from(&stop).unwrap().address, ADDR);
        assert!(MoveCommand::try_from(&stop).is_err());
    }

    #[test]
    fn test_stop_payload() {
        let frame = StopCommand::new(ADDR).to_frame();
        assert_eq!(frame.msg_type, 0xFD);
        assert_eq!(
            frame.payload_slice(),
            &[0x80, 0x80, 0x80, 0x5F, 0xC0, 0xEC, 0xFF]
        );
    }
}
