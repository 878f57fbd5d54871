/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{collections::HashMap, sync::Mutex, time::Duration};

use tokio::time::Instant;

use crate::NamespacedName;

const INITIAL_DELAY: Duration = Duration::from_secs(5);
const MAX_DELAY: Duration = Duration::from_secs(300);

// A key still failing is retried at least every MAX_DELAY, so an entry older than
// this belongs to a Gslb that was erased or stopped being requeued.
const STALE_AFTER: Duration = Duration::from_secs(600);

/// Exponential retry delays for failed reconciliations, tracked per Gslb.
///
/// Entries are dropped on success, and entries of Gslbs that stopped failing
/// without a successful tick (for example because they were erased) are pruned.
#[derive(Debug, Default)]
pub struct Backoff {
    failures: Mutex<HashMap<NamespacedName, (u32, Instant)>>,
}

impl Backoff {
    /// Records a failure for `key` and returns how long to wait before retrying it.
    pub fn next_delay(&self, key: &NamespacedName) -> Duration {
        let now = Instant::now();
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.retain(|_, (_, last_failure)| now.duration_since(*last_failure) < STALE_AFTER);

        let (attempt, last_failure) = failures.entry(key.clone()).or_insert((0, now));
        let delay = INITIAL_DELAY
            .checked_mul(2u32.saturating_pow(*attempt))
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY);
        *attempt = attempt.saturating_add(1);
        *last_failure = now;
        delay
    }

    /// Forgets the failures of `key` after a successful reconciliation.
    pub fn reset(&self, key: &NamespacedName) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(backoff: &Backoff) -> usize {
        backoff.failures.lock().unwrap().len()
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let backoff = Backoff::default();
        let key = NamespacedName::new("test-gslb", "test-gslb");
        let other = NamespacedName::new("test-gslb", "other");

        assert_eq!(backoff.next_delay(&key), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(&other), Duration::from_secs(5));

        for _ in 0..40 {
            backoff.next_delay(&key);
        }
        assert_eq!(backoff.next_delay(&key), MAX_DELAY);

        backoff.reset(&key);
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_forgets_keys_that_stopped_failing() {
        let backoff = Backoff::default();
        let erased = NamespacedName::new("test-gslb", "erased");
        let failing = NamespacedName::new("test-gslb", "failing");

        backoff.next_delay(&erased);
        backoff.next_delay(&erased);
        backoff.next_delay(&failing);
        assert_eq!(tracked(&backoff), 2);

        for _ in 0..3 {
            tokio::time::advance(MAX_DELAY).await;
            backoff.next_delay(&failing);
        }

        assert_eq!(tracked(&backoff), 1);
        assert_eq!(backoff.next_delay(&failing), Duration::from_secs(80));
        assert_eq!(backoff.next_delay(&erased), Duration::from_secs(5));
    }
}
