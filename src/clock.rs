use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn current_unixtime(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_unixtime(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs() as i64
    }
}

/// Starts at a fixed value and only moves when `set`/`advance` is called.
#[derive(Debug)]
pub struct LogicalClock {
    now: AtomicI64,
}

impl LogicalClock {
    pub fn new(start: i64) -> Self {
        LogicalClock {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, value: i64) {
        self.now.store(value, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for LogicalClock {
    fn current_unixtime(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_clock_advances() {
        let clock = LogicalClock::new(100);
        assert_eq!(clock.current_unixtime(), 100);
        clock.advance(50);
        assert_eq!(clock.current_unixtime(), 150);
        clock.set(0);
        assert_eq!(clock.current_unixtime(), 0);
    }
}
