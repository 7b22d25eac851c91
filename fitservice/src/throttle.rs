//! In-memory sync throttle: one sync per subject per interval
//!
//! State lives only in this process and is lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default minimum interval between two syncs of the same subject
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    /// Whole seconds until the next slot, rounded up; 0 when allowed
    pub retry_after_seconds: u64,
}

#[derive(Debug)]
pub struct SyncThrottle {
    min_interval: Duration,
    last_sync: Mutex<HashMap<i64, Instant>>,
}

impl Default for SyncThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl SyncThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sync: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Takes the subject's slot if the interval has elapsed
    pub fn consume(&self, subject_id: i64) -> ThrottleDecision {
        self.consume_at(subject_id, Instant::now())
    }

    pub fn consume_at(&self, subject_id: i64, now: Instant) -> ThrottleDecision {
        let mut last_sync = self.last_sync();
        if let Some(previous) = last_sync.get(&subject_id) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                let retry_after_seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                debug!(subject_id, retry_after_seconds, "sync throttled");
                return ThrottleDecision {
                    allowed: false,
                    retry_after_seconds,
                };
            }
        }
        last_sync.insert(subject_id, now);
        ThrottleDecision {
            allowed: true,
            retry_after_seconds: 0,
        }
    }

    /// Gives the slot back, typically after a failed sync
    pub fn clear(&self, subject_id: i64) {
        self.last_sync().remove(&subject_id);
    }

    fn last_sync(&self) -> MutexGuard<'_, HashMap<i64, Instant>> {
        self.last_sync.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
