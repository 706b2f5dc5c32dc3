/// PROCESS CLOCK
///
/// Expiry comparisons read one shared clock. A vault receives its clock at
/// construction; operations never take a timestamp argument.
///
/// SAFETY INVARIANTS:
/// 1. `now()` is monotonically non-decreasing
/// 2. All epochs of a vault observe the same clock

use parking_lot::Mutex;
use std::sync::Arc;

/// Unix seconds
pub type Timestamp = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock, clamped so it never goes backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Timestamp>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = chrono::Utc::now().timestamp().max(0) as Timestamp;
        let mut last = self.last.lock();
        if wall > *last {
            *last = wall;
        }
        *last
    }
}

/// Clock advanced explicitly. Shared handles see the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, secs: u64) -> Timestamp {
        let mut now = self.now.lock();
        *now = now.saturating_add(secs);
        *now
    }

    /// Move to `at`. Earlier times are ignored.
    pub fn set(&self, at: Timestamp) -> Timestamp {
        let mut now = self.now.lock();
        if at > *now {
            *now = at;
        }
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
