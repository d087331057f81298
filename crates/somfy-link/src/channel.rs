//! 通道传输
//!
//! 用有界 SPSC 通道把字节在线程之间按值传递：`WireEnd` 位于类中断接收侧
//! （串口驱动线程），`ChannelTransport` 交给链路层。接收侧溢出时新字节被丢弃。

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use tracing::warn;

use crate::{LinkError, SerialTransport};

/// 创建一对通道传输端点，每个方向容量为 `capacity` 字节
pub fn channel_transport(capacity: usize) -> (ChannelTransport, WireEnd) {
    let (rx_tx, rx_rx) = bounded(capacity);
    let (tx_tx, tx_rx) = bounded(capacity);
    (
        ChannelTransport {
            rx: rx_rx,
            tx: tx_tx,
        },
        WireEnd {
            rx: rx_tx,
            tx: tx_rx,
        },
    )
}

/// 链路层一侧的通道传输
#[derive(Debug)]
pub struct ChannelTransport {
    rx: Receiver<u8>,
    tx: Sender<u8>,
}

impl SerialTransport for ChannelTransport {
    fn available(&mut self) -> usize {
        self.rx.len()
    }

    fn read(&mut self) -> Result<u8, LinkError> {
        match self.rx.try_recv() {
            Ok(byte) => Ok(byte),
            Err(TryRecvError::Empty) => Err(LinkError::Timeout),
            Err(TryRecvError::Disconnected) => Err(LinkError::Disconnected),
        }
    }

    fn write(&mut self, byte: u8) -> Result<(), LinkError> {
        match self.tx.try_send(byte) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LinkError::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(LinkError::Disconnected),
        }
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// 线路一侧（串口驱动线程）
#[derive(Debug)]
pub struct WireEnd {
    rx: Sender<u8>,
    tx: Receiver<u8>,
}

impl WireEnd {
    /// 推入一个接收字节，缓冲区满或对端已关闭时返回 `false`
    pub fn push(&self, byte: u8) -> bool {
        match self.rx.try_send(byte) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Receive buffer full, dropping 0x{:02X}", byte);
                false
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 推入一段接收字节，返回实际写入的数量
    pub fn push_all(&self, bytes: &[u8]) -> usize {
        bytes.iter().take_while(|&&b| self.push(b)).count()
    }

    /// 取出链路层已写出的全部字节
    pub fn take_written(&self) -> Vec<u8> {
        self.tx.try_iter().collect()
    }
}
