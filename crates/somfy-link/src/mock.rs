//! 脚本化 Mock 传输
//!
//! 克隆共享同一内部状态：测试保留一个句柄用于注入接收字节和检查已发送字节，
//! 另一个句柄交给链路层。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use somfy_protocol::{Frame, decode_frame};

use crate::{LinkError, SerialTransport};

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    drain_count: usize,
}

/// Mock 串口传输
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // 测试辅助：锁中毒说明另一个测试线程已 panic，继续使用内部数据即可
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注入接收字节
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state().rx.extend(bytes.iter().copied());
    }

    /// 注入一整帧
    pub fn push_frame(&self, frame: &Frame) {
        if let Ok(bytes) = frame.encode() {
            self.push_rx(&bytes);
        }
    }

    /// 未读接收字节数
    pub fn rx_len(&self) -> usize {
        self.state().rx.len()
    }

    /// 已发送的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    /// 取出并清空已发送字节
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().tx)
    }

    /// 将已发送字节解析为帧序列（遇到无法解析的字节即停止）
    pub fn written_frames(&self) -> Vec<Frame> {
        let bytes = self.written();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match decode_frame(&bytes[offset..]) {
                Ok((frame, used)) => {
                    frames.push(frame);
                    offset += used;
                },
                Err(_) => break,
            }
        }
        frames
    }

    /// `drain()` 被调用的次数
    pub fn drain_count(&self) -> usize {
        self.state().drain_count
    }
}

impl SerialTransport for MockTransport {
    fn available(&mut self) -> usize {
        self.state().rx.len()
    }

    fn read(&mut self) -> Result<u8, LinkError> {
        self.state().rx.pop_front().ok_or(LinkError::Timeout)
    }

    fn write(&mut self, byte: u8) -> Result<(), LinkError> {
        self.state().tx.push(byte);
        Ok(())
    }

    fn drain(&mut self) {
        let mut state = self.state();
        state.rx.clear();
        state.drain_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_roundtrip() {
        let mut transport = MockTransport::new();
        let handle = transport.clone();

        handle.push_rx(&[1, 2]);
        assert_eq!(transport.available(), 2);
        assert_eq!(transport.read().unwrap(), 1);

        transport.drain();
        assert_eq!(transport.available(), 0);
        assert!(matches!(transport.read(), Err(LinkError::Timeout)));

        let frame = Frame::new(0xFD, &[0x80, 0x80, 0x80, 1, 2, 3, 0xFF]).unwrap();
        transport.write_all(&frame.encode().unwrap()).unwrap();
        assert_eq!(handle.written_frames(), vec![frame]);
        assert_eq!(handle.drain_count(), 1);
    }
}
