/*!
 * Per-service guard registry
 *
 * The registry owns one circuit breaker and one request throttler for every
 * configured backend service. It is built once at startup and passed by
 * reference to whatever needs to call a service or report on its health.
 */

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use pursight_core_resilience::{
    CircuitBreaker, Clock, RequestThrottler, ResilienceError, SystemClock,
};
use tracing::info;

use crate::config::ResilienceConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    breakers: BTreeMap<String, CircuitBreaker>,
    throttlers: BTreeMap<String, RequestThrottler>,
    critical_services: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl ServiceRegistry {
    /// Build guards for every configured service using wall-clock time
    pub fn from_config(config: &ResilienceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build guards for every configured service with an explicit time source
    pub fn with_clock(config: &ResilienceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let mut breakers = BTreeMap::new();
        let mut throttlers = BTreeMap::new();
        for name in config.services.keys() {
            let settings = config.settings_for(name);
            breakers.insert(
                name.clone(),
                CircuitBreaker::with_clock(
                    name.clone(),
                    settings.circuit_breaker.to_resilience_config(),
                    Arc::clone(&clock),
                ),
            );
            throttlers.insert(
                name.clone(),
                RequestThrottler::with_clock(
                    name.clone(),
                    settings.throttler.to_resilience_config(),
                    Arc::clone(&clock),
                ),
            );
        }

        info!(services = breakers.len(), "Service registry initialized");

        Ok(Self {
            breakers,
            throttlers,
            critical_services: config.critical_services.clone(),
            clock,
        })
    }

    pub fn breaker(&self, service: &str) -> Option<&CircuitBreaker> {
        self.breakers.get(service)
    }

    pub fn throttler(&self, service: &str) -> Option<&RequestThrottler> {
        self.throttlers.get(service)
    }

    /// Registered service names in sorted order
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.breakers.keys().map(String::as_str)
    }

    pub fn critical_services(&self) -> &[String] {
        &self.critical_services
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Call a backend service through its throttler and circuit breaker.
    ///
    /// The throttler decides when the call may start; the breaker then decides
    /// whether it may start at all. The operation's own result is returned
    /// unchanged.
    pub async fn call<F, Fut, T, E>(&self, service: &str, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ResilienceError> + From<Error>,
    {
        let (Some(breaker), Some(throttler)) = (self.breaker(service), self.throttler(service))
        else {
            return Err(E::from(Error::UnknownService(service.to_string())));
        };

        throttler.throttle(|| breaker.execute(op)).await
    }

    /// Reset every breaker and throttler, failing pending requests
    ///
    /// Intended for recovery after a development hot reload.
    pub async fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset().await;
        }
        for throttler in self.throttlers.values() {
            throttler.reset().await;
        }
        info!("All service guards reset");
    }

    /// Drop every pending request but keep breaker state and request history
    pub async fn clear_all_queues(&self) {
        for throttler in self.throttlers.values() {
            throttler.clear_queue().await;
        }
    }
}
