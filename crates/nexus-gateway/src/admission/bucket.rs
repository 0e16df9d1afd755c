//! Token buckets.
//!
//! The bucket is refilled in a continuous fashion: on each access the
//! elapsed time is converted to tokens (`refill_amount` per `refill_window`)
//! and added, capped at the capacity.  A fresh bucket starts full.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A single rate-limit bucket shared by every request for one key.
pub trait Bucket: Send + Sync {
    /// Take one token.  Returns `false` when the bucket is empty.
    fn try_consume(&self) -> bool;

    /// Whole tokens currently available.
    fn available_tokens(&self) -> u64;

    /// Maximum number of tokens the bucket holds.
    fn capacity(&self) -> u64;
}

/// Creates buckets for newly observed keys.
pub trait BucketFactory: Send + Sync {
    fn create(&self, capacity: u64, refill_amount: u64, refill_window: Duration)
    -> Arc<dyn Bucket>;
}

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// Continuously refilling token bucket.
pub struct TokenBucket {
    capacity: u64,
    refill_per_sec: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u64, refill_amount: u64, refill_window: Duration) -> Self {
        let window = refill_window.as_secs_f64();
        let refill_per_sec = if window > 0.0 {
            refill_amount as f64 / window
        } else {
            0.0
        };
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(State {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).clamp(0.0, self.capacity as f64);
        state.last_refill = now;
    }
}

impl Bucket for TokenBucket {
    fn try_consume(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn available_tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens.floor() as u64
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// Factory producing [`TokenBucket`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenBucketFactory;

impl BucketFactory for TokenBucketFactory {
    fn create(
        &self,
        capacity: u64,
        refill_amount: u64,
        refill_window: Duration,
    ) -> Arc<dyn Bucket> {
        Arc::new(TokenBucket::new(capacity, refill_amount, refill_window))
    }
}
