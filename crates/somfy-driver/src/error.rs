//! 驱动层错误类型定义

use somfy_link::LinkError;
use somfy_protocol::ProtocolError;
use thiserror::Error;

use crate::persist::StoreError;

/// 驱动层错误类型
///
/// 超时、校验失败、离线、卡住等情况都被吸收为设备状态，不会出现在这里；
/// 只有传输故障和持久化存储故障会向上传播。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路层错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 协议编码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 持久化存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
