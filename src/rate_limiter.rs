//! Request rate limiting with a shared minimum inter-request interval
//!
//! The RateLimiter enforces a global request-rate ceiling across all
//! concurrent fetch workers: no two granted requests are ever closer together
//! than `min_interval`, regardless of which worker asked.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Global rate limiter shared across all fetch workers
///
/// One instance exists per coordinator run; workers hold clones, which share
/// state through an `Arc`. The limiter tracks the timestamp of the last
/// granted request behind a mutex and makes each caller sleep until its grant
/// is at least `min_interval` after the previous one.
///
/// The mutex is held across the sleep on purpose: waiters queue up on the
/// lock, so grants are serialized and each caller waits at most one
/// `min_interval` past its turn in the queue.
///
/// # Examples
///
/// ```no_run
/// use pmc_corpus::RateLimiter;
///
/// # async fn example() {
/// // Stay under NCBI's 10 req/s ceiling with an API key
/// let limiter = RateLimiter::new(9.0);
///
/// // Before every remote call
/// limiter.wait().await;
/// // ... issue the request ...
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    /// Minimum gap between two granted requests
    min_interval: Duration,
    /// Timestamp of the last granted request (None before the first grant)
    last_grant: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter granting at most `max_per_second` requests per second.
    ///
    /// A non-positive rate disables limiting entirely: [`wait`](Self::wait)
    /// becomes a no-op.
    #[must_use]
    pub fn new(max_per_second: f64) -> Self {
        let min_interval = if max_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / max_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(min_interval)
    }

    /// Create a limiter with an explicit minimum inter-request interval.
    #[must_use]
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Arc::new(Mutex::new(None)),
        }
    }

    /// The configured minimum gap between grants
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until at least `min_interval` has elapsed since the last granted
    /// request across all clones, then record the new grant time.
    ///
    /// Returns immediately when the limiter was created with a non-positive
    /// rate (zero `min_interval`).
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_grant.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let earliest = prev + self.min_interval;
            if earliest > now {
                tokio::time::sleep_until(earliest).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_wait_returns_immediately() {
        let limiter = RateLimiter::new(0.0);

        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait().await;
        }
        assert!(
            start.elapsed() < Duration::from_millis(20),
            "zero-rate limiter should not block"
        );
    }

    #[tokio::test]
    async fn sequential_grants_are_spaced() {
        // 50 req/s -> 20ms interval
        let limiter = RateLimiter::new(50.0);
        let mut grants = Vec::new();

        for _ in 0..5 {
            limiter.wait().await;
            grants.push(Instant::now());
        }

        // Small epsilon for timer coarseness
        let epsilon = Duration::from_millis(2);
        for pair in grants.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap + epsilon >= limiter.min_interval(),
                "consecutive grants {gap:?} apart, expected >= {:?}",
                limiter.min_interval()
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_grants_respect_the_global_interval() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(25));
        let grant_log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            let grant_log = grant_log.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    limiter.wait().await;
                    grant_log.lock().unwrap().push(Instant::now());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grant_log.lock().unwrap().clone();
        grants.sort();
        assert_eq!(grants.len(), 12);

        let epsilon = Duration::from_millis(3);
        for pair in grants.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap + epsilon >= Duration::from_millis(25),
                "grants from different workers only {gap:?} apart"
            );
        }
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let original = RateLimiter::with_interval(Duration::from_millis(30));
        let clone = original.clone();

        original.wait().await;
        let start = Instant::now();
        clone.wait().await;

        // The clone must observe the original's grant and wait out the interval
        assert!(
            start.elapsed() >= Duration::from_millis(27),
            "clone granted {:?} after original, expected ~30ms",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn first_grant_is_immediate() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(500));

        let start = Instant::now();
        limiter.wait().await;
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "first grant should not wait"
        );
    }
}
