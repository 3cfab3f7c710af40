// Copyright 2018 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Two-stage admission control: a token bucket for burst allowance and a
//! leaky bucket with carry-over for steady-rate shaping.

use std::time::Instant;
use tokio::sync::Mutex;

/// Lazily-replenished token bucket. `consume` is all-or-nothing.
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: Mutex<TokenState>,
}

struct TokenState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, rate: f64) -> Self {
        TokenBucket {
            capacity,
            rate,
            tokens: Mutex::new(TokenState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn replenish(state: &mut TokenState, capacity: f64, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + rate * elapsed).min(capacity);
        state.last_refill = now;
    }

    /// Returns true and debits `n` tokens only if at least `n` are available.
    pub async fn consume(&self, n: f64) -> bool {
        let mut state = self.tokens.lock().await;
        Self::replenish(&mut state, self.capacity, self.rate);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    async fn tokens(&self) -> f64 {
        let mut state = self.tokens.lock().await;
        Self::replenish(&mut state, self.capacity, self.rate);
        state.tokens
    }
}

/// Leaky-bucket reshaping with a non-negative carry-over counter. Caps the
/// number of tokens released into a one-second window at `limit`, deferring
/// any excess into `remaining` for later windows.
pub struct LeakyBucket {
    limit: u64,
    remaining: u64,
}

impl LeakyBucket {
    pub fn new(limit: u64) -> Self {
        LeakyBucket {
            limit,
            remaining: 0,
        }
    }

    /// Given `n` tokens just obtained from the token bucket, returns the
    /// number to actually release this window, updating the carry-over.
    pub fn release(&mut self, n: u64) -> u64 {
        if n > self.limit {
            self.remaining += n - self.limit;
            self.limit
        } else {
            let e = self.remaining.min(self.limit - n);
            self.remaining -= e;
            n + e
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_succeeds_up_to_capacity() {
        let bucket = TokenBucket::new(10.0, 1.0);
        assert!(bucket.consume(10.0).await);
        assert!(!bucket.consume(1.0).await);
    }

    #[tokio::test]
    async fn consume_is_all_or_nothing() {
        let bucket = TokenBucket::new(5.0, 0.0);
        assert!(!bucket.consume(6.0).await);
        assert_eq!(bucket.tokens().await, 5.0);
    }

    #[tokio::test]
    async fn starting_tokens_equal_capacity() {
        let bucket = TokenBucket::new(30.0, 5.0);
        assert_eq!(bucket.tokens().await, 30.0);
    }

    #[test]
    fn leaky_bucket_releases_at_most_limit_when_no_carry() {
        let mut leaky = LeakyBucket::new(10);
        assert_eq!(leaky.release(25), 10);
        assert_eq!(leaky.remaining(), 15);
    }

    #[test]
    fn leaky_bucket_drains_carry_over_alongside_fresh_tokens() {
        let mut leaky = LeakyBucket::new(10);
        leaky.release(25);
        assert_eq!(leaky.release(5), 10);
        assert_eq!(leaky.remaining(), 10);
    }

    #[test]
    fn leaky_bucket_never_exceeds_limit_per_window() {
        let mut leaky = LeakyBucket::new(10);
        leaky.release(25);
        leaky.release(5);
        let released = leaky.release(5);
        assert!(released <= 10);
    }

    #[test]
    fn leaky_bucket_remaining_never_negative() {
        let mut leaky = LeakyBucket::new(10);
        assert_eq!(leaky.release(3), 3);
        assert_eq!(leaky.remaining(), 0);
    }
}
