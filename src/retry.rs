//! Retry classification and backoff for transient fetch failures
//!
//! Transient failures (network timeouts, server busy, empty responses) are
//! retried with exponential backoff and optional jitter; permanent failures
//! (article not available, artifact write errors) are recorded immediately
//! without retry. The fetch worker drives the retry loop itself so the
//! attempt count matches the configured cap exactly; this module supplies the
//! classification trait and the delay schedule.

use crate::config::RetryConfig;
use crate::error::{Error, FetchError};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (not found, disk full, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Transport-level failures are transient: the next attempt may succeed
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Fetch(e) => e.is_retryable(),
            // Configuration, catalog, and extraction errors are permanent
            Error::Config { .. } => false,
            Error::Catalog(_) => false,
            Error::Extract(_) => false,
            Error::Serialization(_) => false,
        }
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // An empty body may be a hiccup on the remote side
            FetchError::EmptyResponse { .. } => true,
            // The API said the article doesn't exist - retrying won't change that
            FetchError::NotAvailable { .. } => false,
            FetchError::RetriesExhausted { .. } => false,
            // Local storage problems need operator action, not retries
            FetchError::ArtifactWrite { .. } => false,
        }
    }
}

/// Delay schedule for the worker's retry loop
///
/// Each call to [`sleep`](Backoff::sleep) waits for the current delay
/// (jittered if configured) and then advances the delay by the backoff
/// multiplier, capped at the configured maximum.
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Build a fresh schedule from the retry configuration
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// The delay the next [`sleep`](Backoff::sleep) will start from (pre-jitter)
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the current delay, then advance the schedule
    pub async fn sleep(&mut self) {
        let delay = if self.jitter {
            add_jitter(self.delay)
        } else {
            self.delay
        };
        tokio::time::sleep(delay).await;

        let next = Duration::from_secs_f64(self.delay.as_secs_f64() * self.multiplier);
        self.delay = next.min(self.max_delay);
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeouts_are_retryable() {
        let e = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(e.is_retryable());

        let e = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!e.is_retryable());
    }

    #[test]
    fn not_available_is_permanent() {
        let e = FetchError::NotAvailable {
            pmcid: "PMC1".into(),
        };
        assert!(!e.is_retryable());

        let e = FetchError::EmptyResponse {
            pmcid: "PMC1".into(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn config_errors_are_permanent() {
        let e = Error::Config {
            message: "bad".into(),
            key: None,
        };
        assert!(!e.is_retryable());
    }

    #[tokio::test]
    async fn backoff_advances_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let mut backoff = Backoff::new(&config);

        assert_eq!(backoff.current_delay(), Duration::from_millis(10));
        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(20));
        backoff.sleep().await;
        // Capped at max_delay, not 40ms
        assert_eq!(backoff.current_delay(), Duration::from_millis(25));
    }

    #[test]
    fn jitter_stays_within_double() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(base);
            assert!(jittered >= base);
            assert!(jittered <= base * 2);
        }
    }
}
