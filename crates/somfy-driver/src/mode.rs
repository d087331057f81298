//! 桥接器工作模式
//!
//! 模式以单字节持久化，重启后从存储恢复。

use std::fmt;

/// 桥接器工作模式
///
/// # 模式说明
///
/// - **Discovery**: 广播发现电机，直到确认或注册表已满
/// - **Joining**: 等待加入网状网络
/// - **Operation**: 轮询状态、下发指令、上报变化
///
/// 失去网络成员身份时 Operation 回到 Joining；
/// 恢复出厂设置时任何模式都回到 Discovery。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    /// 发现模式（默认）
    #[default]
    Discovery = 0,
    /// 入网模式
    Joining = 1,
    /// 运行模式
    Operation = 2,
}

impl Mode {
    /// 从 u8 转换
    ///
    /// 如果值无效（如未初始化的存储），返回 Discovery 模式。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Joining,
            2 => Self::Operation,
            _ => Self::Discovery,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 显示名称
    pub fn name(self) -> &'static str {
        match self {
            Self::Discovery => "Discovery",
            Self::Joining => "Joining",
            Self::Operation => "Operation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
