//! 帧编码与整帧解码
//!
//! 长度字节经过混淆：`0xFF - len(payload) - 5`。
//! 流式（带时间预算）的解码在链路层实现，这里只处理完整的字节缓冲区。

use smallvec::SmallVec;

use crate::{
    CHECKSUM_LEN, Frame, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, NODE_TYPE_RESERVED, Payload,
    ProtocolError,
};

/// 编码后的帧（栈上缓冲）
pub type EncodedFrame = SmallVec<[u8; MAX_FRAME_LEN]>;

/// 16 位累加校验和
#[inline]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// 负载长度 -> 混淆后的长度字节
///
/// 超过 [`MAX_PAYLOAD_LEN`] 的长度返回 None。
#[inline]
pub fn length_byte(payload_len: usize) -> Option<u8> {
    if payload_len > MAX_PAYLOAD_LEN {
        return None;
    }
    Some(0xFF - 5 - payload_len as u8)
}

/// 长度字节 -> 负载长度（不含节点类型字节）
///
/// 长度字节描述的是 "节点类型 + 负载" 共 `0xFF - len - 4` 字节，
/// 因此负载长度为 `0xFF - len - 5`。无法表示的长度返回 None。
#[inline]
pub fn payload_len_from_length_byte(len_byte: u8) -> Option<usize> {
    0xFFu8
        .checked_sub(len_byte)
        .and_then(|v| v.checked_sub(5))
        .map(usize::from)
}

/// 编码帧（节点类型为保留值 `0xFF`）
///
/// # 示例
///
/// ```rust
/// use somfy_protocol::encode_frame;
///
/// let bytes = encode_frame(0xBF, &[0x80, 0x80, 0x80, 0, 0, 0]).unwrap();
/// assert_eq!(&bytes[..3], &[0xBF, 0xF4, 0xFF]);
/// ```
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Result<EncodedFrame, ProtocolError> {
    encode_with_node_type(msg_type, NODE_TYPE_RESERVED, payload)
}

/// 编码帧（指定节点类型）
pub fn encode_with_node_type(
    msg_type: u8,
    node_type: u8,
    payload: &[u8],
) -> Result<EncodedFrame, ProtocolError> {
    let len_byte = length_byte(payload.len()).ok_or(ProtocolError::PayloadTooLong {
        len: payload.len(),
        max: MAX_PAYLOAD_LEN,
    })?;

    let mut out = EncodedFrame::new();
    out.push(msg_type);
    out.push(len_byte);
    out.push(node_type);
    out.extend_from_slice(payload);

    let sum = checksum(&out);
    out.extend_from_slice(&sum.to_be_bytes());
    Ok(out)
}

/// 从缓冲区开头解码一帧，返回帧和消耗的字节数
///
/// 不做重同步：缓冲区必须以消息类型字节开头。
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(ProtocolError::Truncated {
            expected: HEADER_LEN + CHECKSUM_LEN,
            actual: bytes.len(),
        });
    }

    let len_byte = bytes[1];
    let payload_len =
        payload_len_from_length_byte(len_byte).ok_or(ProtocolError::InvalidLengthByte(len_byte))?;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            len: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let total = HEADER_LEN + payload_len + CHECKSUM_LEN;
    if bytes.len() < total {
        return Err(ProtocolError::Truncated {
            expected: total,
            actual: bytes.len(),
        });
    }

    let body_end = HEADER_LEN + payload_len;
    let computed = checksum(&bytes[..body_end]);
    let received = u16::from_be_bytes([bytes[body_end], bytes[body_end + 1]]);
    if computed != received {
        return Err(ProtocolError::ChecksumMismatch { computed, received });
    }

    let frame = Frame {
        msg_type: bytes[0],
        node_type: bytes[2],
        payload: Payload::from_slice(&bytes[HEADER_LEN..body_end]),
    };
    Ok((frame, total))
}
