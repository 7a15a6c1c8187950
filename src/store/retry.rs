//! Retry/backoff for [`super::Store::get`] calls (spec.md §4.1, §7).
//!
//! Grounded on the teacher's `execution::limits`/`execution::timeout`
//! style of small, focused, unit-tested helper structs — generalized from
//! a cooperative check to a full retry loop since Store calls are I/O,
//! not a CPU-bound fixpoint to poll.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Appender, Store};
use crate::constraint::Constraint;
use crate::error::{StoreError, StoreResult};
use crate::object::ObjectRef;
use crate::query::Query;

/// Retry policy (spec.md §4.1): transient failures retried at most `max_attempts`
/// times with exponential backoff, `base` doubling each attempt up to `cap`,
/// full jitter applied to the capped delay (spec.md §4.1's concrete
/// retry/backoff contract).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Full-jitter delay for `attempt` (0-based): uniformly random between
    /// zero and `min(cap, base * 2^attempt)`, rather than sleeping the
    /// capped value outright — spreads out retries from many callers
    /// hitting the same transient failure at once instead of having them
    /// all wake up in lockstep.
    fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self
            .base
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .min(self.cap);
        let millis = capped.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(0..=millis);
        Duration::from_millis(jittered)
    }
}

/// Run `store.get`, retrying `StoreError::Unavailable` per `policy`
/// (spec.md §4.1, §7). All other errors are final immediately.
pub async fn get_with_retry(
    store: &dyn Store,
    query: &dyn Query,
    constraint: &Constraint,
    limit: Option<usize>,
    cancel: &CancellationToken,
    policy: RetryPolicy,
) -> StoreResult<Vec<ObjectRef>> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut appender = Appender::new(limit);
        match store.get(query, constraint, &mut appender, cancel).await {
            Ok(()) => return Ok(appender.into_inner()),
            Err(StoreError::Unavailable(msg)) if attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, error = %msg, "store unavailable, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                }
                attempt += 1;
            }
            Err(err) => {
                debug!(error = %err, attempt, "store call failed, not retrying");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::object::Class;
    use async_trait::async_trait;

    const TEST_CLASS: Class = Class::new("test", "Thing");

    #[derive(Debug)]
    struct FlakyStore {
        fail_times: AtomicU32,
    }

    #[derive(Debug)]
    struct EchoQuery;
    impl Query for EchoQuery {
        fn class(&self) -> Class {
            TEST_CLASS
        }
        fn to_query_string(&self) -> String {
            "echo".to_string()
        }
        fn clone_query(&self) -> Box<dyn Query> {
            Box::new(EchoQuery)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn get(
            &self,
            _query: &dyn Query,
            _constraint: &Constraint,
            appender: &mut Appender,
            _cancel: &CancellationToken,
        ) -> StoreResult<()> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(StoreError::Unavailable("flaky".into()));
            }
            appender.push(Arc::new(crate::domain::mock::MockObject::new(
                TEST_CLASS,
                "x",
                Default::default(),
            )));
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let store = FlakyStore {
            fail_times: AtomicU32::new(2),
        };
        let cancel = CancellationToken::new();
        let result = get_with_retry(
            &store,
            &EchoQuery,
            &Constraint::default(),
            None,
            &cancel,
            RetryPolicy {
                max_attempts: 3,
                base: Duration::from_millis(1),
                cap: Duration::from_millis(5),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_error() {
        let store = FlakyStore {
            fail_times: AtomicU32::new(10),
        };
        let cancel = CancellationToken::new();
        let result = get_with_retry(
            &store,
            &EchoQuery,
            &Constraint::default(),
            None,
            &cancel,
            RetryPolicy {
                max_attempts: 3,
                base: Duration::from_millis(1),
                cap: Duration::from_millis(2),
            },
        )
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn delay_for_never_exceeds_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(200),
            cap: Duration::from_millis(500),
        };
        for attempt in 0..8 {
            assert!(policy.delay_for(attempt) <= policy.cap);
        }
    }
}
