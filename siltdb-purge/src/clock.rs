use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::SystemTime,
};

use crate::utils::{system_time_from_micros, system_time_to_micros};

/// Defines the physical clock used to stamp purge completion times.
pub trait SystemClock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub struct DefaultSystemClock {
    last_tick: AtomicI64,
}

impl Default for DefaultSystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultSystemClock {
    pub fn new() -> Self {
        Self {
            last_tick: AtomicI64::new(i64::MIN),
        }
    }
}

impl SystemClock for DefaultSystemClock {
    fn now(&self) -> SystemTime {
        // since SystemTime is not guaranteed to be monotonic, we enforce it here
        let tick = system_time_to_micros(SystemTime::now());
        self.last_tick.fetch_max(tick, Ordering::SeqCst);
        system_time_from_micros(self.last_tick.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_clock_is_monotonic() {
        let clock = DefaultSystemClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= last);
            last = next;
        }
    }
}
