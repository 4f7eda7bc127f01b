//! Retry policy for transaction conflicts.

use std::future::Future;
use std::time::Duration;

use crate::DbError;

/// How a store mutation reacts to transaction conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionPolicy {
    /// Fixed delay between attempts.
    pub backoff: Duration,
    /// Ceiling on attempts; `None` retries until the conflict clears.
    pub max_attempts: Option<u32>,
}

impl Default for ContentionPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(30),
            max_attempts: None,
        }
    }
}

impl ContentionPolicy {
    /// Set the delay between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stop after `attempts` conflicting attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Run `attempt` until it returns anything other than a conflict.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, DbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut attempts = 0u32;
        loop {
            match attempt().await {
                Err(DbError::Contention(message)) => {
                    attempts = attempts.saturating_add(1);
                    if let Some(max) = self.max_attempts
                        && attempts >= max
                    {
                        tracing::warn!(op, attempts, "Giving up after repeated conflicts");
                        return Err(DbError::ContentionExhausted { op, attempts });
                    }
                    tracing::debug!(op, attempts, "Store contention, retrying: {}", message);
                    tokio::time::sleep(self.backoff).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_until_conflict_clears() -> Result<(), DbError> {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let policy = ContentionPolicy::default().with_backoff(Duration::from_millis(1));

        let value = policy
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(DbError::Contention("busy".into()))
                } else {
                    Ok(42)
                }
            })
            .await?;

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[tokio::test]
    async fn ceiling_turns_conflicts_into_error() {
        let policy = ContentionPolicy::default()
            .with_backoff(Duration::from_millis(1))
            .with_max_attempts(2);

        let result: Result<(), DbError> = policy
            .run("claim_next", || async { Err(DbError::Contention("busy".into())) })
            .await;

        assert!(matches!(
            result,
            Err(DbError::ContentionExhausted {
                op: "claim_next",
                attempts: 2
            })
        ));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), DbError> = ContentionPolicy::default()
            .run("finish", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::Query("schema corrupt".into()))
            })
            .await;

        assert!(matches!(result, Err(DbError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
