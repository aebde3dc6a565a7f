/// Rate limiting module - process-wide admission control
/// Features:
/// - Token bucket: capacity `C`, one token added per refill interval
/// - Whole intervals only; fractional progress is carried over, not lost
/// - One lock around the bucket state, no I/O inside it
///
/// The bucket is shared by every request in this process. It is not
/// coordinated across instances.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::configuration::RateLimitSettings;

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a full bucket
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self::starting_at(capacity, refill_interval, Instant::now())
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.capacity, settings.refill_interval())
    }

    pub(crate) fn starting_at(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(&self, now: Instant) -> bool {
        // A panic while holding the lock cannot leave the two fields inconsistent
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        self.refill(&mut state, now);

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let interval_nanos = self.refill_interval.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(state.last_refill);
        let intervals = elapsed.as_nanos() / interval_nanos;

        if intervals == 0 {
            return;
        }

        let missing = u128::from(self.capacity - state.tokens);
        if intervals >= missing {
            state.tokens = self.capacity;
            // Progress beyond a full bucket is worthless; keep only the remainder
            let remainder = elapsed.as_nanos() % interval_nanos;
            state.last_refill = now - Duration::from_nanos(remainder as u64);
        } else {
            // intervals < capacity <= u32::MAX here
            let added = intervals as u32;
            state.tokens += added;
            state.last_refill += self.refill_interval * added;
        }
    }
}
