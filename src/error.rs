/*!
 * Error types for the PurSight resilience layer
 */

use pursight_core_resilience::ResilienceError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (configuration or log file access)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// One or more configuration values are out of range
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Logging or other setup error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No guards are registered for the named service
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Rejected by a circuit breaker or throttler, or an operation error
    /// expressed as a resilience error
    #[error(transparent)]
    Resilience(#[from] ResilienceError),
}

impl Error {
    /// Whether this error was produced by a gate (open circuit, full or
    /// cleared queue) rather than by the backend call itself
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Resilience(e) if e.is_rejection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = Error::InvalidConfig(vec![
            "services.aiAssistant.throttler.max_requests must be > 0".to_string(),
            "critical service 'billing' is not configured".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("Invalid configuration: "));
        assert!(message.contains("max_requests must be > 0; critical service 'billing'"));
    }

    #[test]
    fn test_resilience_error_is_transparent() {
        let err = Error::from(ResilienceError::queue_full("quickActions", 200));
        assert_eq!(
            err.to_string(),
            "Request queue for 'quickActions' is full (200 pending)"
        );
        assert!(err.is_rejection());
    }

    #[test]
    fn test_unknown_service_is_not_rejection() {
        let err = Error::UnknownService("billing".to_string());
        assert!(!err.is_rejection());
        assert_eq!(err.to_string(), "Unknown service: billing");
        assert!(!Error::from(ResilienceError::Transient("502".into())).is_rejection());
    }
}
