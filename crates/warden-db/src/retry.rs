//! Bounded re-execution of single statements that lost a write conflict.

use std::time::Duration;

use crate::error::DbError;

/// How many times one statement is attempted before the conflict is
/// reported to the caller.
pub(crate) const CONFLICT_ATTEMPTS: u32 = 32;

/// Run `op` until it succeeds, fails with something other than a write
/// conflict, or runs out of attempts. Waits a short, jittered interval
/// between attempts so contending writers spread out.
pub(crate) async fn on_conflict<T, F, Fut>(statement: &str, mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_conflict() && attempt < CONFLICT_ATTEMPTS => {
                tracing::trace!(statement, attempt, "write conflict, retrying");
                tokio::time::sleep(backoff(attempt)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let ceiling_us = 50u64 << attempt.min(5);
    Duration::from_micros(rand::random_range(0..=ceiling_us))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = on_conflict("test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(DbError::Conflict("write conflict".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_errors_are_returned_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), DbError> = on_conflict("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Query("syntax".into()))
        })
        .await;

        assert!(matches!(result, Err(DbError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), DbError> = on_conflict("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Conflict("write conflict".into()))
        })
        .await;

        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), CONFLICT_ATTEMPTS);
    }

    #[test]
    fn backoff_stays_small() {
        for attempt in 1..=CONFLICT_ATTEMPTS {
            assert!(backoff(attempt) <= Duration::from_micros(1600));
        }
    }
}
