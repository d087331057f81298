//! 帧级收发
//!
//! 接收流程：
//!
//! 1. 逐字节丢弃，直到遇到期望的消息类型（流噪声重同步）
//! 2. 读取长度字节并去混淆，检查负载长度是否超出调用方缓冲区
//! 3. 读取节点类型、负载和两个校验和字节
//! 4. 校验 `type + len + node_type + payload` 的 16 位累加和
//!
//! 每一次字节等待都受同一个墙钟截止时间约束，避免饿死优先级更高的网络射频任务。
//! 链路层不做内部重试，由调用方决定。

use std::time::Duration;

use somfy_protocol::{Frame, MAX_PAYLOAD_LEN, Payload, ProtocolError, checksum};
use tracing::trace;

use crate::{Clock, LinkError, SerialTransport};

/// 链路配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// 单次读帧的默认时间预算（毫秒）
    pub read_budget_ms: u64,
    /// 等待字节时的最大单次睡眠（毫秒）
    pub poll_step_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_budget_ms: 30,
            poll_step_ms: 5,
        }
    }
}

/// Somfy 串口链路
///
/// 持有传输和时钟；驱动层通过它读取当前时间和执行等待。
pub struct SomfyLink<T, C> {
    transport: T,
    clock: C,
    config: LinkConfig,
}

impl<T: SerialTransport, C: Clock> SomfyLink<T, C> {
    /// 使用默认配置创建链路
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_config(transport, clock, LinkConfig::default())
    }

    /// 使用指定配置创建链路
    pub fn with_config(transport: T, clock: C, config: LinkConfig) -> Self {
        Self {
            transport,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// 当前时间（毫秒）
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// 等待指定毫秒数
    pub fn sleep_ms(&self, ms: u64) {
        self.clock.sleep_ms(ms);
    }

    /// 传输中是否还有未读字节
    pub fn has_pending_input(&mut self) -> bool {
        self.transport.available() > 0
    }

    /// 丢弃未读输入
    pub fn drain(&mut self) {
        self.transport.drain();
    }

    /// 发送一帧
    ///
    /// 半双工：写入前先丢弃所有陈旧输入，保证同一时间最多一个未完成的请求/应答交换。
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let bytes = frame.encode()?;
        self.transport.drain();
        trace!("TX {:02X?}", bytes.as_slice());
        self.transport.write_all(&bytes)
    }

    /// 使用默认预算接收一帧
    pub fn receive(&mut self, expected_type: u8) -> Result<Frame, LinkError> {
        let budget = Duration::from_millis(self.config.read_budget_ms);
        self.receive_frame(expected_type, budget, MAX_PAYLOAD_LEN)
    }

    /// 接收一帧
    ///
    /// # 参数
    ///
    /// - `expected_type`: 期望的消息类型，其余字节在重同步阶段被丢弃
    /// - `budget`: 整次调用的墙钟预算
    /// - `capacity`: 调用方可接受的最大负载长度
    ///
    /// # 错误
    ///
    /// 超时、长度越界或校验和不匹配都返回错误，帧被视为从未收到。
    pub fn receive_frame(
        &mut self,
        expected_type: u8,
        budget: Duration,
        capacity: usize,
    ) -> Result<Frame, LinkError> {
        let deadline = self.clock.now_ms() + budget.as_millis() as u64;

        loop {
            let byte = self.read_byte(deadline)?;
            if byte == expected_type {
                break;
            }
            trace!(
                "Resync: discarding 0x{:02X} while waiting for 0x{:02X}",
                byte, expected_type
            );
        }

        let len_byte = self.read_byte(deadline)?;
        let payload_len = somfy_protocol::payload_len_from_length_byte(len_byte)
            .ok_or(ProtocolError::InvalidLengthByte(len_byte))?;
        if payload_len > capacity {
            return Err(LinkError::PayloadOverflow {
                len: payload_len,
                capacity,
            });
        }

        let node_type = self.read_byte(deadline)?;
        let mut payload = Payload::new();
        for _ in 0..payload_len {
            payload.push(self.read_byte(deadline)?);
        }

        let hi = self.read_byte(deadline)?;
        let lo = self.read_byte(deadline)?;
        let received = u16::from_be_bytes([hi, lo]);
        let computed = checksum(&[expected_type, len_byte, node_type]).wrapping_add(checksum(&payload));
        if computed != received {
            return Err(ProtocolError::ChecksumMismatch { computed, received }.into());
        }

        trace!("RX 0x{:02X} {:02X?}", expected_type, payload.as_slice());
        Ok(Frame {
            msg_type: expected_type,
            node_type,
            payload,
        })
    }

    /// 读取一个字节，等待不超过截止时间
    fn read_byte(&mut self, deadline_ms: u64) -> Result<u8, LinkError> {
        loop {
            if self.transport.available() > 0 {
                return self.transport.read();
            }
            let now = self.clock.now_ms();
            if now >= deadline_ms {
                return Err(LinkError::Timeout);
            }
            let step = (deadline_ms - now).min(self.config.poll_step_ms.max(1));
            self.clock.sleep_ms(step);
        }
    }
}
