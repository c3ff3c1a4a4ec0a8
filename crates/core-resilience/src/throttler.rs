//! Request throttling for preventing service overload
//!
//! A [`RequestThrottler`] caps the number of requests admitted to a backend
//! service inside a sliding time window. Requests beyond the cap wait in a
//! bounded FIFO queue instead of failing; only when that queue is full is the
//! caller rejected with [`ResilienceError::QueueFull`].
//!
//! # Queue draining
//!
//! A single drain task per throttler admits queued requests as window space
//! frees up, polling every `min(retry_delay, 100ms)`. Admission is FIFO, but
//! the drain task does not wait for an admitted request to finish before
//! admitting the next one: admitted requests run concurrently in their
//! callers' tasks, so completion order is not guaranteed.
//!
//! # Example
//! ```no_run
//! use pursight_core_resilience::{RequestThrottler, ThrottlerConfig, ResilienceError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResilienceError> {
//!     let throttler = RequestThrottler::new(
//!         "aiAssistant",
//!         ThrottlerConfig {
//!             max_requests: 10,
//!             window: Duration::from_secs(1),
//!             ..Default::default()
//!         },
//!     );
//!
//!     let value = throttler.throttle(|| async {
//!         Ok::<_, ResilienceError>(42)
//!     }).await?;
//!     assert_eq!(value, 42);
//!     Ok(())
//! }
//! ```

use super::clock::{duration_millis, Clock, SystemClock};
use super::error::ResilienceError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// Upper bound on the drain loop's polling interval
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Queue occupancy at which a submission first tries to drain the queue
const PROACTIVE_DRAIN_RATIO: f64 = 0.8;

/// Configuration for request throttling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlerConfig {
    /// Maximum requests admitted per window
    ///
    /// Must be non-zero: with zero every request waits in the queue until
    /// [`RequestThrottler::reset`] or [`RequestThrottler::clear_queue`].
    pub max_requests: u32,
    /// Length of the sliding window
    pub window: Duration,
    /// Maximum number of requests waiting for admission
    pub queue_size: usize,
    /// Delay between drain attempts (capped at 100ms)
    pub retry_delay: Duration,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window: Duration::from_secs(30),
            queue_size: 200,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Point-in-time snapshot of a throttler's window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleStats {
    /// Requests admitted inside the current window
    pub requests_in_window: usize,
    /// Requests waiting for admission
    pub queue_size: usize,
    /// Milliseconds since the Unix epoch
    pub last_request_time: Option<u64>,
    /// Whether the window is at capacity
    pub is_throttled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub length: usize,
    pub is_full: bool,
    pub is_processing: bool,
}

/// Admission signal for a queued request
type Admission = oneshot::Sender<Result<(), ResilienceError>>;

#[derive(Debug, Default)]
struct ThrottlerState {
    /// Admission timestamps, oldest first
    requests: VecDeque<u64>,
    queue: VecDeque<Admission>,
    /// Set while a drain task owns the queue
    is_processing: bool,
    last_request_time: Option<u64>,
}

impl ThrottlerState {
    fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&oldest) = self.requests.front() {
            if now.saturating_sub(oldest) >= window_ms {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn requests_in_window(&self, now: u64, window_ms: u64) -> usize {
        self.requests
            .iter()
            .filter(|&&t| now.saturating_sub(t) < window_ms)
            .count()
    }

    fn record(&mut self, now: u64) {
        self.requests.push_back(now);
        self.last_request_time = Some(now);
    }

    /// Fail every pending request with `QueueCleared`
    fn drop_pending(&mut self, service: &str) -> usize {
        let pending = self.queue.len();
        for admission in self.queue.drain(..) {
            let _ = admission.send(Err(ResilienceError::queue_cleared(service)));
        }
        pending
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    config: ThrottlerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<ThrottlerState>,
}

impl Shared {
    fn window_ms(&self) -> u64 {
        duration_millis(self.config.window)
    }

    fn has_capacity(&self, state: &ThrottlerState) -> bool {
        state.requests.len() < self.config.max_requests as usize
    }

    /// Admit queue heads while the window has room.
    ///
    /// Entries whose caller has gone away are discarded without using a slot.
    fn admit_queued(&self, state: &mut ThrottlerState, now: u64) -> usize {
        let mut admitted = 0;
        while self.has_capacity(state) {
            let Some(admission) = state.queue.pop_front() else {
                break;
            };
            if admission.send(Ok(())).is_ok() {
                state.record(now);
                admitted += 1;
            }
        }
        state.queue.retain(|admission| !admission.is_closed());
        admitted
    }

    /// Drain loop. Only one runs at a time per throttler, guarded by
    /// `is_processing` under the state lock.
    async fn process_queue(self: Arc<Self>) {
        let poll = self
            .config
            .retry_delay
            .min(MAX_POLL_INTERVAL)
            .max(Duration::from_millis(1));

        loop {
            {
                let mut state = self.state.lock().await;
                let now = self.clock.now_millis();
                state.prune(now, self.window_ms());

                let admitted = self.admit_queued(&mut state, now);
                if admitted > 0 {
                    debug!(
                        service = %self.name,
                        admitted,
                        remaining = state.queue.len(),
                        "Admitted queued requests"
                    );
                }

                if state.queue.is_empty() {
                    state.is_processing = false;
                    return;
                }
            }

            tokio::time::sleep(poll).await;
        }
    }
}

/// Sliding-window request throttler for a single named backend service
///
/// Cloning is cheap and clones share the same window and queue.
#[derive(Debug, Clone)]
pub struct RequestThrottler {
    inner: Arc<Shared>,
}

impl RequestThrottler {
    /// Create a new throttler reading wall-clock time
    pub fn new(name: impl Into<String>, config: ThrottlerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new throttler with an explicit time source
    pub fn with_clock(
        name: impl Into<String>,
        config: ThrottlerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        if config.max_requests == 0 {
            warn!(service = %name, "Throttler has max_requests = 0, no request will be admitted");
        }

        Self {
            inner: Arc::new(Shared {
                name,
                config,
                clock,
                state: Mutex::new(ThrottlerState::default()),
            }),
        }
    }

    /// Name of the guarded service
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ThrottlerConfig {
        &self.inner.config
    }

    /// Run `request` once the window admits it.
    ///
    /// Requests within the window's capacity run immediately. Others wait in
    /// the queue and run when the drain loop admits them; if the queue is full
    /// the request is rejected with [`ResilienceError::QueueFull`] and never
    /// invoked. The request's own result is returned unchanged.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn throttle<F, Fut, T, E>(&self, request: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let inner = &self.inner;

        let pending = {
            let mut state = inner.state.lock().await;
            let now = inner.clock.now_millis();
            state.prune(now, inner.window_ms());

            if inner.has_capacity(&state) {
                state.record(now);
                None
            } else {
                let capacity = inner.config.queue_size;
                if state.queue.len() as f64 >= capacity as f64 * PROACTIVE_DRAIN_RATIO {
                    inner.admit_queued(&mut state, now);
                }

                if state.queue.len() >= capacity {
                    warn!(service = %inner.name, capacity, "Request queue full, rejecting request");
                    return Err(E::from(ResilienceError::queue_full(&*inner.name, capacity)));
                }

                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                debug!(
                    service = %inner.name,
                    queued = state.queue.len(),
                    "Request throttled, queued for admission"
                );

                let start_drain = !state.is_processing;
                state.is_processing = true;
                Some((rx, start_drain))
            }
        };

        if let Some((rx, start_drain)) = pending {
            if start_drain {
                tokio::spawn(Arc::clone(inner).process_queue());
            }
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(E::from(e)),
                Err(_) => return Err(E::from(ResilienceError::queue_cleared(&*inner.name))),
            }
        }

        request().await
    }

    /// Read-only snapshot of the window and queue
    pub async fn stats(&self) -> ThrottleStats {
        let state = self.inner.state.lock().await;
        let now = self.inner.clock.now_millis();
        let requests_in_window = state.requests_in_window(now, self.inner.window_ms());

        ThrottleStats {
            requests_in_window,
            queue_size: state.queue.len(),
            last_request_time: state.last_request_time,
            is_throttled: requests_in_window >= self.inner.config.max_requests as usize,
        }
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.inner.state.lock().await;
        QueueStatus {
            length: state.queue.len(),
            is_full: state.queue.len() >= self.inner.config.queue_size,
            is_processing: state.is_processing,
        }
    }

    /// Forget the request history and fail every pending request
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        let dropped = state.drop_pending(&self.inner.name);
        state.requests.clear();
        state.last_request_time = None;
        debug!(service = %self.inner.name, dropped, "Throttler reset");
    }

    /// Fail every pending request but keep the request history
    pub async fn clear_queue(&self) {
        let mut state = self.inner.state.lock().await;
        let dropped = state.drop_pending(&self.inner.name);
        debug!(service = %self.inner.name, dropped, "Throttler queue cleared");
    }
}
