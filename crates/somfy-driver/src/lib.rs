//! # Somfy Bridge Driver
//!
//! Somfy 卷帘电机与网状网络之间的桥接核心：设备注册表、指令/卡住检测状态机、
//! 状态轮询、节流上报和模式控制。
//!
//! 所有外部协作者（字节传输、持久化存储、网状网络层、控制面板、显示）都通过 trait 接入，
//! 单线程协作式运行：外部循环反复调用 [`Bridge::tick`] 并按返回的时间等待。
//!
//! ## 模块
//!
//! - `device`: 单个电机的状态与状态机规则
//! - `registry`: 有序、定容的设备注册表
//! - `discovery`: 广播发现
//! - `command`: 指令下发与卡住检测
//! - `poller`: 状态轮询
//! - `report`: 主动上报调度
//! - `mesh`: 网状网络通道映射
//! - `panel`: 按钮手势
//! - `display`: 状态显示
//! - `persist`: 持久化存储布局
//! - `bridge`: 模式控制器

mod bridge;
mod command;
mod config;
mod device;
mod discovery;
pub mod display;
mod error;
pub mod mesh;
mod mode;
pub mod panel;
pub mod persist;
mod poller;
mod registry;
mod report;

pub use bridge::{Bridge, BridgeParts, TickOutcome};
pub use command::{CommandProcessor, CommandTick};
pub use config::BridgeConfig;
pub use device::{CommandAction, Device, PositionUpdate};
pub use discovery::discover;
pub use display::{StatusDisplay, StatusView, TracingDisplay};
pub use error::DriverError;
pub use mesh::{ChannelId, ChannelRequest, MeshNetwork};
pub use mode::Mode;
pub use panel::{ControlPanel, Gesture, HoldTracker, classify_hold};
pub use persist::{MemoryStore, Store, StoreError};
pub use poller::{PollSummary, StatusPoller};
pub use registry::{InsertOutcome, MAX_DEVICES, Registry};
pub use report::ReportScheduler;

// 重新导出下层类型，方便调用方只依赖本 crate
pub use somfy_link::{Clock, LinkError, ManualClock, SerialTransport, SomfyLink, SystemClock};
pub use somfy_protocol::{MoveTarget, WireAddress};
