//! 持久化存储
//!
//! 字节寻址的非易失存储，布局：
//!
//! | 偏移 | 内容 |
//! |---|---|
//! | 1 | 工作模式（0/1/2） |
//! | 2 | 设备数量 |
//! | 3.. | 每个设备 3 字节地址，按注册表顺序 |
//!
//! 任何变化都整体重写。加载时设备数量超出容量视为损坏，回退为空注册表。

use std::sync::{Arc, Mutex, MutexGuard};

use somfy_protocol::WireAddress;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{MAX_DEVICES, Mode, Registry};

/// 模式字节偏移
pub const MODE_OFFSET: usize = 1;
/// 设备数量偏移
pub const COUNT_OFFSET: usize = 2;
/// 第一个地址的偏移
pub const ADDRESSES_OFFSET: usize = 3;
/// 存储布局所需的字节数
pub const STORE_SIZE: usize = ADDRESSES_OFFSET + 3 * MAX_DEVICES;

/// 存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Offset {offset} out of range (store size {size})")]
    OutOfRange { offset: usize, size: usize },
}

/// 字节寻址的持久化存储
pub trait Store {
    /// 读取一个字节
    fn read(&mut self, offset: usize) -> Result<u8, StoreError>;

    /// 写入一个字节
    fn write(&mut self, offset: usize, value: u8) -> Result<(), StoreError>;

    /// 提交已写入的内容，返回 `Ok` 即视为已落盘
    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for &mut S {
    fn read(&mut self, offset: usize) -> Result<u8, StoreError> {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StoreError> {
        (**self).write(offset, value)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        (**self).commit()
    }
}

/// 读取持久化的工作模式（无效值视为 Discovery）
pub fn load_mode<S: Store + ?Sized>(store: &mut S) -> Result<Mode, StoreError> {
    Ok(Mode::from_u8(store.read(MODE_OFFSET)?))
}

/// 写入并提交工作模式
pub fn save_mode<S: Store + ?Sized>(store: &mut S, mode: Mode) -> Result<(), StoreError> {
    store.write(MODE_OFFSET, mode.as_u8())?;
    store.commit()
}

/// 读取持久化的地址列表
///
/// 设备数量超出容量时视为损坏，返回空列表（非致命）。
pub fn load_addresses<S: Store + ?Sized>(store: &mut S) -> Result<Vec<WireAddress>, StoreError> {
    let count = store.read(COUNT_OFFSET)? as usize;
    if count > MAX_DEVICES {
        warn!(
            "Corrupt device count {} in store (capacity {}), starting with empty registry",
            count, MAX_DEVICES
        );
        return Ok(Vec::new());
    }

    let mut addresses = Vec::with_capacity(count);
    for i in 0..count {
        let base = ADDRESSES_OFFSET + 3 * i;
        addresses.push(WireAddress::new(
            store.read(base)?,
            store.read(base + 1)?,
            store.read(base + 2)?,
        ));
    }
    debug!("Loaded {} motor address(es) from store", addresses.len());
    Ok(addresses)
}

/// 整体重写注册表并提交
pub fn save_registry<S: Store + ?Sized>(store: &mut S, registry: &Registry) -> Result<(), StoreError> {
    store.write(COUNT_OFFSET, registry.len() as u8)?;
    for (i, address) in registry.addresses().enumerate() {
        let base = ADDRESSES_OFFSET + 3 * i;
        for (j, byte) in address.bytes().into_iter().enumerate() {
            store.write(base + j, byte)?;
        }
    }
    store.commit()
}

#[derive(Debug)]
struct MemoryState {
    bytes: Vec<u8>,
    commits: usize,
}

/// 内存存储（克隆共享同一内容）
///
/// 新建时内容为 `0xFF`，与擦除后的 EEPROM 一致。
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_bytes(vec![0xFF; STORE_SIZE])
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定内容创建
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState { bytes, commits: 0 })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前内容快照
    pub fn bytes(&self) -> Vec<u8> {
        self.state().bytes.clone()
    }

    /// `commit()` 被调用的次数
    pub fn commits(&self) -> usize {
        self.state().commits
    }
}

impl Store for MemoryStore {
    fn read(&mut self, offset: usize) -> Result<u8, StoreError> {
        let state = self.state();
        state.bytes.get(offset).copied().ok_or(StoreError::OutOfRange {
            offset,
            size: state.bytes.len(),
        })
    }

    fn write(&mut self, offset: usize, value: u8) -> Result<(), StoreError> {
        let mut state = self.state();
        let size = state.bytes.len();
        let slot = state
            .bytes
            .get_mut(offset)
            .ok_or(StoreError::OutOfRange { offset, size })?;
        *slot = value;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.state().commits += 1;
        Ok(())
    }
}
