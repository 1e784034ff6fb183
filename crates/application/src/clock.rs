use std::sync::Mutex;

use chrono::Duration;
use domain::Timestamp;

/// 时间来源。消息时间戳在房间通道锁内读取，保证同一房间内不回退。
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// 手动推进的时钟，每次读取前进固定步长，用于可重复的测试。
#[derive(Debug)]
pub struct SteppingClock {
    current: Mutex<Timestamp>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: Timestamp, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = *current;
        *current = now + self.step;
        now
    }
}
