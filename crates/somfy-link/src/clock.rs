//! 单调时钟抽象
//!
//! 所有时间戳均为 "毫秒（相对某个起点）"，不受系统时间调整影响。
//! 链路层和驱动层的等待都通过 [`Clock::sleep_ms`] 表达，
//! 测试中使用 [`ManualClock`]，睡眠即推进时间。

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 单调时钟
pub trait Clock {
    /// 当前时间（毫秒）
    fn now_ms(&self) -> u64;

    /// 阻塞等待指定毫秒数
    fn sleep_ms(&self, ms: u64);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms)
    }
}

/// 全局单调时间锚点，首次访问时设置
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 系统单调时钟（相对应用启动）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let start = APP_START.get_or_init(Instant::now);
        start.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        if ms > 0 {
            spin_sleep::sleep(Duration::from_millis(ms));
        }
    }
}

/// 手动时钟（克隆共享同一时间）
///
/// `sleep_ms` 直接推进时间，不真正阻塞。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// 创建起始时间为 `start_ms` 的时钟
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// 推进时间
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }

    /// 设置绝对时间
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now_ms();
        clock.sleep_ms(5);
        let t2 = clock.now_ms();
        assert!(t2 >= t1 + 5, "t1={}, t2={}", t1, t2);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        clock.sleep_ms(30);
        assert_eq!(other.now_ms(), 1_030);

        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
