use connectors::{
    adapter::Adapter, error::AdapterError, sql::base::connection::ConnectionTarget,
};
use planner::query::dialect::DatabaseKind;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Exponential backoff for operations that may hit a server that is not
/// reachable yet. Only connection setup runs under it: a batch is never
/// replayed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, `classify` says stop, or the attempts run
    /// out. The last error is returned.
    pub async fn run<F, Fut, T, E, C>(&self, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if classify(&err) == RetryDisposition::Stop || attempt + 1 >= self.max_attempts
                    {
                        return Err(err);
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u128 << attempt.min(6);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

pub fn classify_adapter_error(err: &AdapterError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Opens a connection, retrying transient failures.
pub async fn connect_with_retry(
    policy: &RetryPolicy,
    kind: DatabaseKind,
    target: &ConnectionTarget,
) -> Result<Adapter, AdapterError> {
    policy
        .run(|| Adapter::connect(kind, target), classify_adapter_error)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u128> = (0..5).map(|a| policy.backoff_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(4, Duration::from_millis(1), Duration::from_millis(2));
        let result: Result<usize, String> = policy
            .run(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err(format!("refused {n}")) } else { Ok(n) }
                },
                |_| RetryDisposition::Retry,
            )
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_permanent_errors_and_exhaustion() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1));
        let result: Result<(), String> = policy
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad password".to_string())
                },
                |_| RetryDisposition::Stop,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        calls.store(0, Ordering::SeqCst);
        let result: Result<(), String> = policy
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("timeout".to_string())
                },
                |_| RetryDisposition::Retry,
            )
            .await;
        assert_eq!(result, Err("timeout".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
