//! # Somfy Link Layer
//!
//! 半双工串口链路抽象：字节传输 trait、时钟 trait，以及带时间预算的帧收发。
//!
//! ## 模块
//!
//! - `clock`: 单调时钟（系统时钟 / 手动时钟）
//! - `link`: 帧级收发（重同步、长度检查、校验和校验）
//! - `channel`: 基于有界 SPSC 通道的传输实现
//! - `mock`: 脚本化传输（测试用，`mock` feature）
//! - `sim`: 模拟电机总线（测试和演示用，`mock` feature）

use thiserror::Error;

pub use somfy_protocol::{Frame, ProtocolError};

pub mod channel;
pub mod clock;
pub mod link;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(any(test, feature = "mock"))]
pub mod sim;

pub use channel::{ChannelTransport, WireEnd, channel_transport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use link::{LinkConfig, SomfyLink};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
#[cfg(any(test, feature = "mock"))]
pub use sim::{SimulatedBus, SimulatedMotor};

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Payload overflow: {len} bytes exceeds buffer capacity {capacity}")]
    PayloadOverflow { len: usize, capacity: usize },
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Transport disconnected")]
    Disconnected,
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl LinkError {
    /// 是否可通过重试恢复
    ///
    /// 超时、校验失败等只影响单次交换；IO 错误和断开需要上层处理。
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Disconnected)
    }
}

/// 半双工字节流传输
///
/// 链路层自行施加超时，`read()` 只在 `available() > 0` 时被调用。
pub trait SerialTransport {
    /// 可读字节数
    fn available(&mut self) -> usize;

    /// 读取一个字节
    fn read(&mut self) -> Result<u8, LinkError>;

    /// 写入一个字节
    fn write(&mut self, byte: u8) -> Result<(), LinkError>;

    /// 丢弃所有未读输入
    fn drain(&mut self);

    /// 刷新输出（结束一次写入）
    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// 写入整段字节并刷新
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        for &byte in bytes {
            self.write(byte)?;
        }
        self.flush()
    }
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn read(&mut self) -> Result<u8, LinkError> {
        (**self).read()
    }

    fn write(&mut self, byte: u8) -> Result<(), LinkError> {
        (**self).write(byte)
    }

    fn drain(&mut self) {
        (**self).drain()
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        (**self).flush()
    }
}
