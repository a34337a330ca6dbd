use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use duo_db::Database;

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Run a blocking store operation off the async runtime, retrying transient
/// SQLite failures under the gateway's retry policy.
///
/// `op` may run more than once, so it must be safe to repeat.
pub async fn with_store<T, F>(state: &GatewayState, op: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: Fn(&Database) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let policy = state.config.retry;
    let max_attempts = policy.max_attempts.max(1);
    let op = Arc::new(op);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let db = state.db.clone();
        let op = op.clone();
        let result = tokio::task::spawn_blocking(move || op(db.as_ref()))
            .await
            .map_err(|e| GatewayError::Store(anyhow::anyhow!("store task failed: {}", e)))?;

        match result {
            Ok(value) => return Ok(value),
            Err(err) if duo_db::is_transient(&err) => {
                if attempt >= max_attempts {
                    return Err(GatewayError::StoreUnavailable {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    "Transient store failure (attempt {}/{}), retrying in {:?}: {:#}",
                    attempt, max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(GatewayError::Store(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::state::GatewayConfig;

    fn busy() -> anyhow::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY), None)
            .into()
    }

    fn state(max_attempts: u32) -> Arc<GatewayState> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        GatewayState::new(
            db,
            GatewayConfig {
                retry: RetryPolicy {
                    max_attempts,
                    base_delay: Duration::from_millis(1),
                },
                ..GatewayConfig::default()
            },
        )
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let state = state(3);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = with_store(&state, move |_db| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(busy())
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_become_store_unavailable() {
        let state = state(2);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = with_store(&state, move |_db| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(busy())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::StoreUnavailable { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let state = state(5);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = with_store(&state, move |_db| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("constraint failed"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::Store(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
