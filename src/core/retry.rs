use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::client::{PlatformError, PlatformResult};
use crate::core::config::Config;

/// Result of a call driven by a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: PlatformResult<T>,
    /// A mandated rate-limit wait happened at least once.
    pub rate_limited: bool,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    pub fn into_result(self) -> PlatformResult<T> {
        self.result
    }
}

/// Bounded fixed-delay retries on a chosen error class, plus rate-limit
/// waits that never count as an attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    rate_limit_margin: Duration,
    retryable: fn(&PlatformError) -> bool,
}

fn never(_: &PlatformError) -> bool {
    false
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            rate_limit_margin: Duration::from_secs(1),
            retryable: never,
        }
    }

    /// Single attempt that still honors rate limits.
    pub fn rate_limit_only(config: &Config) -> Self {
        Self::new(1, Duration::ZERO)
            .with_rate_limit_margin(config.rate_limit_margin())
    }

    /// Retries while a fresh grant has not reached the platform yet.
    pub fn propagation(config: &Config) -> Self {
        Self::new(config.grant_retry_attempts, config.grant_retry_delay())
            .with_rate_limit_margin(config.rate_limit_margin())
            .retry_if(PlatformError::is_propagation_lag)
    }

    pub fn retry_if(mut self, predicate: fn(&PlatformError) -> bool) -> Self {
        self.retryable = predicate;
        self
    }

    pub fn with_rate_limit_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_margin = margin;
        self
    }

    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        self.poll(label, op, |_| true).await
    }

    /// Like [`run`](Self::run), but a successful value that fails `done` is
    /// also retried after the fixed delay. The last value is returned when
    /// attempts run out.
    pub async fn poll<T, F, Fut, D>(&self, label: &str, mut op: F, done: D) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
        D: Fn(&T) -> bool,
    {
        let mut attempts = 1;
        let mut rate_limited = false;
        loop {
            match op().await {
                Ok(value) if done(&value) || attempts >= self.max_attempts => {
                    return Attempted {
                        result: Ok(value),
                        rate_limited,
                        attempts,
                    };
                }
                Ok(_) => {
                    debug!(
                        "[RETRY] {} not settled yet (attempt {}/{})",
                        label, attempts, self.max_attempts
                    );
                    attempts += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    if let Some(retry_after) = e.retry_after() {
                        rate_limited = true;
                        let wait = retry_after + self.rate_limit_margin;
                        warn!(
                            "[RETRY] {} rate limited, waiting {}s before resuming",
                            label,
                            wait.as_secs()
                        );
                        tokio::time::sleep(wait).await;
                    } else if (self.retryable)(&e) && attempts < self.max_attempts {
                        debug!(
                            "[RETRY] {} failed with {} (attempt {}/{}), retrying",
                            label, e, attempts, self.max_attempts
                        );
                        attempts += 1;
                        tokio::time::sleep(self.delay).await;
                    } else {
                        return Attempted {
                            result: Err(e),
                            rate_limited,
                            attempts,
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn scripted(
        script: Vec<PlatformResult<u32>>,
    ) -> (Mutex<std::vec::IntoIter<PlatformResult<u32>>>, Mutex<u32>) {
        (Mutex::new(script.into_iter()), Mutex::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_at_least_the_mandated_duration() {
        let (script, calls) = scripted(vec![
            Err(PlatformError::RateLimited {
                retry_after: Duration::from_secs(7),
            }),
            Ok(1),
        ]);
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let started = Instant::now();
        let out = policy
            .run("test", || {
                *calls.lock().unwrap() += 1;
                let next = script.lock().unwrap().next().unwrap();
                async move { next }
            })
            .await;
        assert_eq!(out.result, Ok(1));
        assert!(out.rate_limited);
        assert_eq!(out.attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 2);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn propagation_lag_is_retried_up_to_the_bound() {
        let (script, _) = scripted(vec![
            Err(PlatformError::OperatorNotRecognized),
            Err(PlatformError::OperatorNotRecognized),
            Err(PlatformError::OperatorNotRecognized),
            Ok(9),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_secs(5))
            .retry_if(PlatformError::is_propagation_lag);
        let started = Instant::now();
        let out = policy
            .run("grant", || {
                let next = script.lock().unwrap().next().unwrap();
                async move { next }
            })
            .await;
        assert_eq!(out.result, Err(PlatformError::OperatorNotRecognized));
        assert_eq!(out.attempts, 3);
        assert!(!out.rate_limited);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let (script, calls) = scripted(vec![
            Err(PlatformError::GrantDenied("RIGHT_FORBIDDEN".into())),
            Ok(1),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_secs(5))
            .retry_if(PlatformError::is_propagation_lag);
        let out = policy
            .run("grant", || {
                *calls.lock().unwrap() += 1;
                let next = script.lock().unwrap().next().unwrap();
                async move { next }
            })
            .await;
        assert!(out.result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_retries_until_the_value_settles() {
        let (script, _) = scripted(vec![Ok(0), Ok(0), Ok(5)]);
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        let out = policy
            .poll(
                "verify",
                || {
                    let next = script.lock().unwrap().next().unwrap();
                    async move { next }
                },
                |v| *v > 0,
            )
            .await;
        assert_eq!(out.result, Ok(5));
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn long_rate_limit_streaks_are_waited_out() {
        let mut script: Vec<PlatformResult<u32>> = (0..15)
            .map(|_| {
                Err(PlatformError::RateLimited {
                    retry_after: Duration::from_secs(1),
                })
            })
            .collect();
        script.push(Ok(3));
        let (script, calls) = scripted(script);
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let started = Instant::now();
        let out = policy
            .run("flood", || {
                *calls.lock().unwrap() += 1;
                let next = script.lock().unwrap().next().unwrap();
                async move { next }
            })
            .await;
        assert_eq!(out.result, Ok(3));
        assert!(out.rate_limited);
        assert_eq!(out.attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 16);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
