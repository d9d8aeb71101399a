use chrono::{DateTime, FixedOffset, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Heartbeat driver resolution.
pub const TICK_MS: u64 = 100;

pub const TICK: Duration = Duration::from_millis(TICK_MS);

/// Source of wall-clock timestamps and event ids.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
    fn generate_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic clock: always the same instant, ids count up from 1.
#[derive(Debug)]
pub struct FixedClock {
    at: DateTime<FixedOffset>,
    next_id: AtomicU64,
}

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            at,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.at
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(n as u128).to_string()
    }
}
