// ============================================================================
// Circuit Breaker for broker publishes
// ============================================================================
//
// A publish against a dead broker would otherwise wait out the connect
// timeout on every request. After `failure_threshold` consecutive failures
// the breaker opens and publishes fail immediately; once `reset_timeout` has
// passed, calls are let through again (half-open) and two successes close it.
//
// States:
// - CLOSED: normal operation
// - OPEN: rejecting calls
// - HALF_OPEN: reset timeout elapsed, probing
//
// ============================================================================

use murmur_metrics::BROKER_CIRCUIT_BREAKER_STATE;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Successes needed in half-open state before closing
const HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 2;

/// Circuit Breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Timeout for each guarded call
    pub timeout: Duration,
    /// Time to wait before probing (half-open)
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&murmur_config::BrokerConfig> for CircuitBreakerConfig {
    fn from(config: &murmur_config::BrokerConfig) -> Self {
        Self {
            failure_threshold: config.circuit_failure_threshold.max(1),
            timeout: config.publish_timeout(),
            reset_timeout: Duration::from_secs(config.circuit_reset_timeout_secs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, call rejected without running
    #[error("Circuit breaker is OPEN (last failure: {0:?} ago)")]
    Open(Duration),

    #[error("Circuit breaker timeout ({timeout:?}) exceeded")]
    Timeout { timeout: Duration },

    #[error("Operation failed: {0}")]
    Inner(#[source] E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    fn gauge_value(self) -> f64 {
        match self {
            State::Closed => 0.0,
            State::Open => 1.0,
            State::HalfOpen => 2.0,
        }
    }
}

/// Thread-safe circuit breaker, labelled by component in metrics
pub struct CircuitBreaker {
    component: &'static str,
    failures: AtomicU32,
    is_open: AtomicBool,
    last_failure: RwLock<Option<Instant>>,
    half_open_successes: AtomicU32,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(component: &'static str, config: CircuitBreakerConfig) -> Self {
        BROKER_CIRCUIT_BREAKER_STATE
            .with_label_values(&[component])
            .set(State::Closed.gauge_value());

        Self {
            component,
            failures: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            last_failure: RwLock::new(None),
            half_open_successes: AtomicU32::new(0),
            config,
        }
    }

    /// Run `f` under the breaker.
    ///
    /// * `Err(Open)` - rejected without running `f`
    /// * `Err(Timeout)` - `f` exceeded the per-call timeout (counts as a failure)
    /// * `Err(Inner)` - `f` failed
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if self.is_open.load(Ordering::Relaxed) {
            let last_failure = *self.last_failure.read().await;
            if let Some(last_failure) = last_failure {
                let elapsed = last_failure.elapsed();
                if elapsed < self.config.reset_timeout {
                    tracing::debug!(
                        component = self.component,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Circuit breaker OPEN - rejecting call"
                    );
                    return Err(CircuitBreakerError::Open(elapsed));
                }
                tracing::info!(
                    component = self.component,
                    "Circuit breaker attempting recovery (half-open state)"
                );
                self.report(State::HalfOpen);
            }
        }

        match tokio::time::timeout(self.config.timeout, f).await {
            Err(_elapsed) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Timeout {
                    timeout: self.config.timeout,
                })
            }
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    fn record_success(&self) {
        if !self.is_open.load(Ordering::Relaxed) {
            self.failures.store(0, Ordering::Relaxed);
            return;
        }

        let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= HALF_OPEN_SUCCESSES_TO_CLOSE {
            self.is_open.store(false, Ordering::Relaxed);
            self.failures.store(0, Ordering::Relaxed);
            self.half_open_successes.store(0, Ordering::Relaxed);
            self.report(State::Closed);
            tracing::info!(component = self.component, "Circuit breaker CLOSED - broker recovered");
        }
    }

    async fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.write().await = Some(Instant::now());
        self.half_open_successes.store(0, Ordering::Relaxed);

        if failures >= self.config.failure_threshold {
            if !self.is_open.swap(true, Ordering::Relaxed) {
                tracing::error!(
                    component = self.component,
                    failures,
                    reset_timeout_secs = self.config.reset_timeout.as_secs(),
                    "Circuit breaker OPENED - too many failures"
                );
            }
            self.report(State::Open);
        } else {
            tracing::warn!(
                component = self.component,
                failures,
                threshold = self.config.failure_threshold,
                "Circuit breaker failure recorded"
            );
        }
    }

    /// Current state and consecutive failure count
    pub async fn state(&self) -> (State, u32) {
        let failures = self.failures.load(Ordering::Relaxed);
        if !self.is_open.load(Ordering::Relaxed) {
            return (State::Closed, failures);
        }
        let state = match *self.last_failure.read().await {
            Some(last) if last.elapsed() >= self.config.reset_timeout => State::HalfOpen,
            _ => State::Open,
        };
        (state, failures)
    }

    fn report(&self, state: State) {
        BROKER_CIRCUIT_BREAKER_STATE
            .with_label_values(&[self.component])
            .set(state.gauge_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_secs(1),
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb.call(async { Err::<(), _>(anyhow::anyhow!("broker down")) }).await;
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_running() {
        let cb = breaker(3, 30_000);
        for _ in 0..3 {
            fail(&cb).await;
        }
        assert_eq!(cb.state().await, (State::Open, 3));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = cb
            .call(async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_millis(100),
                reset_timeout: Duration::from_secs(30),
            },
        );

        let result = cb
            .call(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(cb.state().await, (State::Closed, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_then_closes_after_two_successes() {
        let cb = breaker(2, 100);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state().await.0, State::Open);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cb.state().await.0, State::HalfOpen);

        for _ in 0..2 {
            assert!(cb.call(async { Ok::<_, anyhow::Error>(()) }).await.is_ok());
        }
        assert_eq!(cb.state().await, (State::Closed, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 100);
        fail(&cb).await;
        fail(&cb).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        fail(&cb).await;

        assert_eq!(cb.state().await.0, State::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 30_000);
        fail(&cb).await;
        fail(&cb).await;
        assert!(cb.call(async { Ok::<_, anyhow::Error>(()) }).await.is_ok());
        assert_eq!(cb.state().await, (State::Closed, 0));
    }
}
