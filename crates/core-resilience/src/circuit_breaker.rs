//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker stops calling a failing backend service once enough
//! failures pile up inside a trailing time window. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: Recovery timeout elapsed, the next call probes the service
//!
//! ```text
//! CLOSED ──(failures in window >= threshold, volume met)──▶ OPEN
//! OPEN ──(recovery timeout elapsed, on next call)──▶ HALF_OPEN
//! HALF_OPEN ──(success)──▶ CLOSED
//! HALF_OPEN ──(failure)──▶ OPEN
//! ```
//!
//! There is no background timer: the OPEN → HALF_OPEN transition happens
//! lazily when `execute` is called after the recovery timeout.
//!
//! The opening condition counts absolute failures inside the window, not a
//! failure ratio. A busy service with mostly successful traffic still opens
//! once `failure_threshold` failures land inside one window.

use super::clock::{duration_millis, Clock, SystemClock};
use super::error::ResilienceError;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately until the recovery timeout
    Open,
    /// Circuit is half-open, the next result decides between closed and open
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window needed to open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    pub recovery_timeout: Duration,
    /// Trailing window in which failures are counted
    pub monitoring_window: Duration,
    /// Minimum number of requests before the failure count is evaluated
    pub request_volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            recovery_timeout: Duration::from_secs(10),
            monitoring_window: Duration::from_secs(30),
            request_volume_threshold: 5,
        }
    }
}

/// Point-in-time snapshot of a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub request_count: u64,
    /// Milliseconds since the Unix epoch
    pub last_failure_time: Option<u64>,
    /// Milliseconds since the Unix epoch
    pub next_attempt_time: Option<u64>,
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    request_count: u64,
    /// Failure timestamps, oldest first
    failures: VecDeque<u64>,
    last_failure_time: Option<u64>,
    next_attempt_time: Option<u64>,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            request_count: 0,
            failures: VecDeque::new(),
            last_failure_time: None,
            next_attempt_time: None,
        }
    }

    /// Drop failure timestamps that fell out of the trailing window
    fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_sub(oldest) >= window_ms {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures_in_window(&self, now: u64, window_ms: u64) -> usize {
        self.failures
            .iter()
            .filter(|&&t| now.saturating_sub(t) < window_ms)
            .count()
    }

    fn should_open(&self, now: u64, config: &CircuitBreakerConfig) -> bool {
        let window_ms = duration_millis(config.monitoring_window);
        self.request_count >= u64::from(config.request_volume_threshold)
            && self.failures_in_window(now, window_ms) >= config.failure_threshold as usize
    }

    fn snapshot(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            request_count: self.request_count,
            last_failure_time: self.last_failure_time,
            next_attempt_time: self.next_attempt_time,
        }
    }
}

/// Circuit breaker guarding a single named backend service
///
/// Cloning is cheap and clones share state.
///
/// # Example
/// ```no_run
/// use pursight_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     let breaker = CircuitBreaker::new("orchestration", CircuitBreakerConfig::default());
///
///     let result = breaker.execute(|| async {
///         // Call the backend here
///         Ok::<_, ResilienceError>(42)
///     }).await?;
///
///     println!("Result: {}", result);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker reading wall-clock time
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new circuit breaker with an explicit time source
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config: Arc::new(config),
            clock,
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Name of the guarded service
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Read-only snapshot of counters and timestamps
    pub async fn stats(&self) -> CircuitBreakerStats {
        self.state.lock().await.snapshot()
    }

    /// True iff the circuit is closed
    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.state == CircuitState::Closed
    }

    /// Reset the circuit breaker to closed state with empty history
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = CircuitBreakerState::new();
        debug!(service = %self.name, "Circuit breaker reset");
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// When the circuit is open the operation is not invoked and a
    /// [`ResilienceError::CircuitOpen`] is returned. Otherwise the operation's
    /// result is returned unchanged, after being recorded as a success or a
    /// failure. No retries are performed.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        self.admit().await.map_err(E::from)?;

        match op().await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(e)
            }
        }
    }

    /// Check circuit state, moving to half-open once the recovery timeout
    /// has elapsed, and account for the request
    async fn admit(&self) -> Result<(), ResilienceError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now_millis();

        if state.state == CircuitState::Open {
            match state.next_attempt_time {
                Some(next_attempt) if now < next_attempt => {
                    return Err(ResilienceError::circuit_open(&*self.name, next_attempt));
                }
                _ => {
                    state.state = CircuitState::HalfOpen;
                    info!(service = %self.name, "Circuit breaker half-open, probing service");
                }
            }
        }

        state.request_count += 1;
        state.prune(now, duration_millis(self.config.monitoring_window));
        Ok(())
    }

    /// Handle successful operation
    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.success_count += 1;

        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
            info!(service = %self.name, "Circuit breaker closed after successful probe");
        }
    }

    /// Handle failed operation
    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        let now = self.clock.now_millis();

        state.failure_count += 1;
        state.failures.push_back(now);
        state.last_failure_time = Some(now);

        if state.state == CircuitState::HalfOpen || state.should_open(now, &self.config) {
            let next_attempt = now.saturating_add(duration_millis(self.config.recovery_timeout));
            state.state = CircuitState::Open;
            state.next_attempt_time = Some(next_attempt);
            warn!(
                service = %self.name,
                failures = state.failure_count,
                retry_at_ms = next_attempt,
                "Circuit breaker opened"
            );
        }
    }
}
