// Copyright (C) 2022 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::fmt::Display;
use std::time::Duration;

use futures::Future;
use rand::Rng;
use tracing::{debug, warn};

/// Classifies an error as worth another attempt or not.
///
/// Only transient failures (I/O, cluster-blocked) should answer `true`;
/// semantic failures (parse error, missing document, lost CAS race) must
/// not be replayed.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff settings for the policy-save and metadata-update
/// write paths. An attempt budget of 3 means one initial call and at most
/// two replays.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay inserted after the 1-based `attempt`: the base delay doubled
    /// per consumed attempt, capped, and spread over the upper half of the
    /// window so concurrent jobs do not hammer the store in lockstep.
    fn delay_after_attempt(&self, attempt: usize) -> Duration {
        let num_doublings = attempt.saturating_sub(1).min(16) as u32;
        let ceiling_ms = (self.base_delay.as_millis() as u64)
            .saturating_mul(1u64 << num_doublings)
            .min(self.max_delay.as_millis() as u64)
            .max(1);
        let floor_ms = ceiling_ms / 2;
        let jitter_ms = rand::thread_rng().gen_range(0..=ceiling_ms - floor_ms);
        Duration::from_millis(floor_ms + jitter_ms)
    }
}

/// Drives `operation` until it succeeds, fails with a non-retryable
/// error, or exhausts the attempt budget.
pub async fn with_backoff<F, Fut, T, E>(policy: &BackoffPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display + 'static,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.is_retryable() || attempt >= policy.max_attempts {
            if error.is_retryable() {
                warn!(
                    attempt = attempt,
                    error = %error,
                    "Exhausted the attempt budget."
                );
            }
            return Err(error);
        }
        let delay = policy.delay_after_attempt(attempt);
        debug!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, backing off."
        );
        tokio::time::sleep(delay).await;
    }
}
