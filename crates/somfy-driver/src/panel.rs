//! 控制面板（单按钮）
//!
//! 按钮按住的时长决定手势：
//!
//! - 2s < 按住 < 6s：开始入网学习
//! - 按住 > 8s：恢复出厂设置
//!
//! 在发现模式下，按下按钮表示确认结束发现。

use std::time::Duration;

/// 触发入网学习的最短按住时间（不含）
pub const LEARN_HOLD_MIN: Duration = Duration::from_secs(2);
/// 触发入网学习的最长按住时间（不含）
pub const LEARN_HOLD_MAX: Duration = Duration::from_secs(6);
/// 触发恢复出厂设置的最短按住时间（不含）
pub const RESET_HOLD_MIN: Duration = Duration::from_secs(8);

/// 面板手势
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// 入网学习
    Learn,
    /// 恢复出厂设置
    FactoryReset,
}

/// 按住时长对应的手势
pub fn classify_hold(held: Duration) -> Option<Gesture> {
    if held > LEARN_HOLD_MIN && held < LEARN_HOLD_MAX {
        Some(Gesture::Learn)
    } else if held > RESET_HOLD_MIN {
        Some(Gesture::FactoryReset)
    } else {
        None
    }
}

/// 控制面板
pub trait ControlPanel {
    /// 按钮当前是否按下（发现模式下作为确认信号）
    fn confirm_pressed(&mut self) -> bool;

    /// 取出一个已完成的手势
    fn take_gesture(&mut self) -> Option<Gesture>;
}

/// 按钮按住计时
///
/// 由按钮驱动在按下/释放时调用，释放时给出手势。
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldTracker {
    pressed_at: Option<u64>,
}

impl HoldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }

    /// 按下（重复按下保留最早的时间）
    pub fn press(&mut self, now_ms: u64) {
        self.pressed_at.get_or_insert(now_ms);
    }

    /// 释放，返回本次按住对应的手势
    pub fn release(&mut self, now_ms: u64) -> Option<Gesture> {
        let pressed_at = self.pressed_at.take()?;
        classify_hold(Duration::from_millis(now_ms.saturating_sub(pressed_at)))
    }
}
