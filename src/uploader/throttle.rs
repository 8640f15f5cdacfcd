//! 进度节流器
//!
//! 控制进度日志/事件的输出频率，避免每个分片完成都刷屏

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 500;

/// 进度节流器
///
/// 线程安全，多个 worker 共享同一个实例；
/// 每次进度变化调用 `should_emit()`，返回 true 时才输出
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 基准时间
    origin: Instant,
    /// 上次输出时距基准时间的纳秒数（u64::MAX 表示尚未输出过）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_emit_nanos: AtomicU64::new(u64::MAX),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 距上次输出超过节流间隔时返回 true 并更新时间戳
    ///
    /// 并发调用时只有一个调用方能抢到本次输出
    pub fn should_emit(&self) -> bool {
        let now = self.origin.elapsed().as_nanos() as u64;
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        let due = last == u64::MAX || now.saturating_sub(last) >= self.interval_nanos;
        if !due {
            return false;
        }

        self.last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// 强制输出（最后一次更新时使用）
    pub fn force_emit(&self) -> bool {
        let now = self.origin.elapsed().as_nanos() as u64;
        self.last_emit_nanos.store(now, Ordering::Relaxed);
        true
    }

    pub fn reset(&self) {
        self.last_emit_nanos.store(u64::MAX, Ordering::Relaxed);
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
