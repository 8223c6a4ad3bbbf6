//! Retry logic with exponential backoff for transient vendor-API failures.
//!
//! The orchestrator is the only caller: individual clients return typed
//! errors and never retry on their own.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, VigilError};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the exponential growth of the delay.
    pub max_delay: Duration,
    /// Backoff multiplier applied after each retry.
    pub multiplier: f64,
    /// Whether delays get a uniform +/-20% jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the retry following the given 0-indexed attempt.
    ///
    /// The exponent is capped to keep the f64 computation well away from
    /// overflow for absurd attempt numbers.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(20) as i32;
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.8..1.2);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Classifies whether an error is transient and worth another attempt.
pub trait RetryClassifier: Send + Sync {
    fn is_retryable(&self, error: &VigilError) -> bool;
}

/// Default classifier for vendor API calls.
///
/// Timeouts, connection failures, feed outages, and 5xx/429 responses are
/// retryable; vendor rejections (other 4xx), validation failures, and
/// configuration errors are not.
#[derive(Debug, Clone, Default)]
pub struct NetworkRetryClassifier;

impl NetworkRetryClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl RetryClassifier for NetworkRetryClassifier {
    fn is_retryable(&self, error: &VigilError) -> bool {
        match error {
            VigilError::Timeout(_) => true,
            VigilError::ConnectionFailed(_) => true,
            VigilError::UpstreamUnavailable(_) => true,

            // 429 and server errors are transient; other 4xx are final.
            VigilError::UpstreamRejection { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }

            VigilError::Http(e) => is_transient_reqwest_error(e),

            // Step-failure wrappers carry vendor messages; connection-shaped
            // ones are worth retrying.
            VigilError::Registration(msg)
            | VigilError::DnsUpdate(msg)
            | VigilError::Hosting(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("refused")
                    || lower.contains("reset")
            }

            VigilError::Reload(_) => false,
            VigilError::Notify(_) => false,
            VigilError::InvalidDomain(_) => false,
            VigilError::Config(_) => false,
            VigilError::StateInconsistency(_) => false,
            VigilError::Json(_) => false,
            VigilError::RetryExhausted { .. } => false,
            VigilError::Other(_) => false,
        }
    }
}

fn is_transient_reqwest_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() {
        return true;
    }

    if let Some(status) = error.status() {
        return status.as_u16() == 429 || status.is_server_error();
    }

    if error.is_request() || error.is_body() {
        return false;
    }

    // Unknown failure modes default to transient.
    true
}

/// Executes operations with retry and exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: RetryClassifier> {
    policy: RetryPolicy,
    classifier: C,
}

impl RetryExecutor<NetworkRetryClassifier> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: NetworkRetryClassifier::new(),
        }
    }
}

impl<C: RetryClassifier> RetryExecutor<C> {
    pub fn with_classifier(policy: RetryPolicy, classifier: C) -> Self {
        Self { policy, classifier }
    }

    /// Runs the operation, retrying transient failures up to the policy's
    /// attempt bound. Exhausting the bound yields `RetryExhausted`.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let attempts_remaining = self.policy.max_attempts - attempt - 1;

                    if !self.classifier.is_retryable(&e) || attempts_remaining == 0 {
                        if attempt > 0 {
                            warn!(
                                attempt = attempt + 1,
                                max_attempts = self.policy.max_attempts,
                                error = %e,
                                "operation failed after retries"
                            );
                            return Err(VigilError::RetryExhausted {
                                attempts: attempt + 1,
                                last_error: e.to_string(),
                            });
                        }
                        return Err(e);
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn policy_defaults_match_pipeline_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.multiplier, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_secs(5));
    }

    #[test]
    fn jittered_delay_stays_within_twenty_percent() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_secs(60));

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0).as_millis();
            assert!((800..1200).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn classifier_splits_transient_from_final() {
        let classifier = NetworkRetryClassifier::new();

        assert!(classifier.is_retryable(&VigilError::Timeout("probe".into())));
        assert!(classifier.is_retryable(&VigilError::ConnectionFailed("reset".into())));
        assert!(classifier.is_retryable(&VigilError::UpstreamUnavailable("feed".into())));
        assert!(classifier.is_retryable(&VigilError::UpstreamRejection {
            status: 503,
            message: "maintenance".into(),
        }));
        assert!(classifier.is_retryable(&VigilError::UpstreamRejection {
            status: 429,
            message: "slow down".into(),
        }));

        assert!(!classifier.is_retryable(&VigilError::UpstreamRejection {
            status: 401,
            message: "bad key".into(),
        }));
        assert!(!classifier.is_retryable(&VigilError::InvalidDomain("x".into())));
        assert!(!classifier.is_retryable(&VigilError::Config("missing".into())));
    }

    #[tokio::test]
    async fn executor_returns_first_success() {
        let executor = RetryExecutor::new(RetryPolicy::new().with_max_attempts(3));
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result: Result<&str> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn executor_retries_transient_then_succeeds() {
        let executor = RetryExecutor::new(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result: Result<&str> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(VigilError::Timeout("transient".into()))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn executor_stops_on_rejection() {
        let executor = RetryExecutor::new(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1)),
        );
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result: Result<&str> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VigilError::UpstreamRejection {
                        status: 403,
                        message: "forbidden".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn executor_exhausts_attempt_bound() {
        let executor = RetryExecutor::new(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result: Result<&str> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VigilError::ConnectionFailed("still down".into()))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            VigilError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }
}
