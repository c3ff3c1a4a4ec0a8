//! Error types for resilience primitives

use thiserror::Error;

/// Errors raised by the circuit breaker and request throttler themselves.
///
/// Failures of the wrapped operation are never converted into this type by
/// the primitives; they travel back to the caller unchanged. Callers whose
/// operations have no natural error type can use [`ResilienceError::Transient`]
/// and [`ResilienceError::Permanent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// Circuit is open, the operation was not attempted
    #[error("Circuit breaker for '{service}' is open, retry after {retry_at_ms}")]
    CircuitOpen { service: String, retry_at_ms: u64 },

    /// Throttler queue cannot accept another pending request
    #[error("Request queue for '{service}' is full ({capacity} pending)")]
    QueueFull { service: String, capacity: usize },

    /// Pending request was dropped by `reset` or `clear_queue`
    #[error("Pending request for '{service}' was cleared from the queue")]
    QueueCleared { service: String },

    /// Transient failure of an operation, may succeed if attempted later
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent failure of an operation
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl ResilienceError {
    /// Create a circuit-open error
    pub fn circuit_open<S: Into<String>>(service: S, retry_at_ms: u64) -> Self {
        ResilienceError::CircuitOpen {
            service: service.into(),
            retry_at_ms,
        }
    }

    /// Create a queue-full error
    pub fn queue_full<S: Into<String>>(service: S, capacity: usize) -> Self {
        ResilienceError::QueueFull {
            service: service.into(),
            capacity,
        }
    }

    /// Create a queue-cleared error
    pub fn queue_cleared<S: Into<String>>(service: S) -> Self {
        ResilienceError::QueueCleared {
            service: service.into(),
        }
    }

    /// Whether the error was produced locally by a gate (circuit open, queue
    /// full or cleared) rather than by the wrapped operation
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. }
                | ResilienceError::QueueFull { .. }
                | ResilienceError::QueueCleared { .. }
        )
    }

    /// Time at which an open circuit will admit a probe, if this is a
    /// circuit-open rejection
    pub fn retry_at_ms(&self) -> Option<u64> {
        match self {
            ResilienceError::CircuitOpen { retry_at_ms, .. } => Some(*retry_at_ms),
            _ => None,
        }
    }
}
