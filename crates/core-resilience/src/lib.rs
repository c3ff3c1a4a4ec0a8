//! PurSight Core Resilience: Pure-logic guards for backend service calls
//!
//! # Overview
//!
//! This crate provides the two primitives that gate outbound calls from the
//! PurSight platform to its backend services:
//!
//! - **Circuit Breaker**: Fails fast when a service keeps failing, then probes
//!   for recovery after a timeout
//! - **Request Throttler**: Caps requests per sliding window and queues the
//!   excess in a bounded FIFO
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Transport (HTTP clients, request shapes)
//! - Configuration files and service catalogs
//! - Logging setup (it only emits `tracing` events)
//!
//! Both primitives read time through an injectable [`Clock`], and neither
//! retries anything: retry policy belongs to the caller.
//!
//! # Composition
//!
//! The primitives are independent and compose by wrapping closures:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Request Throttler                 │  ← Admission timing
//! │  (Sliding window, bounded queue)        │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Failures in window, opens on count)   │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         Backend Service
//! ```
//!
//! ```no_run
//! use pursight_core_resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, RequestThrottler, ResilienceError, ThrottlerConfig,
//! };
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let breaker = CircuitBreaker::new("orchestration", CircuitBreakerConfig::default());
//! let throttler = RequestThrottler::new("orchestration", ThrottlerConfig::default());
//!
//! let workflows = throttler
//!     .throttle(|| breaker.execute(|| async {
//!         // Call the backend here
//!         Ok::<_, ResilienceError>(vec!["nightly-scan"])
//!     }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod throttler;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ResilienceError;
pub use throttler::{QueueStatus, RequestThrottler, ThrottleStats, ThrottlerConfig};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use pursight_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::clock::{Clock, SystemClock};
    pub use super::error::ResilienceError;
    pub use super::throttler::{RequestThrottler, ThrottlerConfig};
}
