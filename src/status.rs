/*!
 * Service health status helpers
 *
 * Read-only views over the registry's circuit breakers, used to render
 * health banners and to decide whether a backend call is worth attempting.
 * A service without a registered breaker has no recorded failures and is
 * reported as healthy.
 */

use std::time::Duration;

use chrono::{DateTime, Utc};
use pursight_core_resilience::{CircuitBreakerStats, CircuitState};
use serde::{Serialize, Serializer};

use crate::registry::ServiceRegistry;

/// Upper bound on a single sleep in `wait_for_service`
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Health summary of one backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service: String,
    #[serde(serialize_with = "serialize_state")]
    pub state: CircuitState,
    pub healthy: bool,
    pub failure_count: u64,
    pub success_count: u64,
    pub request_count: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// When an open circuit will admit a probe
    pub retry_at: Option<DateTime<Utc>>,
    /// Zero unless the circuit is open
    pub retry_in_ms: u64,
    pub message: String,
}

fn serialize_state<S: Serializer>(state: &CircuitState, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(state)
}

fn to_datetime(millis: Option<u64>) -> Option<DateTime<Utc>> {
    millis
        .and_then(|ms| i64::try_from(ms).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Time left before an open circuit admits a probe
fn retry_delay(stats: &CircuitBreakerStats, now: u64) -> Duration {
    match (stats.state, stats.next_attempt_time) {
        (CircuitState::Open, Some(next_attempt)) => {
            Duration::from_millis(next_attempt.saturating_sub(now))
        }
        _ => Duration::ZERO,
    }
}

fn status_message(service: &str, state: CircuitState, retry_in: Duration) -> String {
    match state {
        CircuitState::Closed => format!("{service} is operating normally"),
        CircuitState::HalfOpen => format!("{service} is recovering, testing connectivity"),
        CircuitState::Open if retry_in.is_zero() => {
            format!("{service} is temporarily unavailable, retrying now")
        }
        CircuitState::Open => {
            // Round up so a banner never shows "0s" while still blocked
            let secs = retry_in.as_millis().div_ceil(1_000);
            format!("{service} is temporarily unavailable, retrying in {secs}s")
        }
    }
}

/// True iff the service's circuit is closed
pub async fn is_service_healthy(registry: &ServiceRegistry, service: &str) -> bool {
    match registry.breaker(service) {
        Some(breaker) => breaker.is_healthy().await,
        None => true,
    }
}

pub async fn get_service_status(registry: &ServiceRegistry, service: &str) -> Option<ServiceStatus> {
    let breaker = registry.breaker(service)?;
    let stats = breaker.stats().await;
    let retry_in = retry_delay(&stats, registry.clock().now_millis());

    Some(ServiceStatus {
        service: service.to_string(),
        state: stats.state,
        healthy: stats.state == CircuitState::Closed,
        failure_count: stats.failure_count,
        success_count: stats.success_count,
        request_count: stats.request_count,
        last_failure_at: to_datetime(stats.last_failure_time),
        retry_at: match stats.state {
            CircuitState::Open => to_datetime(stats.next_attempt_time),
            _ => None,
        },
        retry_in_ms: u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
        message: status_message(service, stats.state, retry_in),
    })
}

/// Whether a call to the service would be let through by its breaker
pub async fn should_attempt_request(registry: &ServiceRegistry, service: &str) -> bool {
    match registry.breaker(service) {
        Some(breaker) => {
            let stats = breaker.stats().await;
            retry_delay(&stats, registry.clock().now_millis()).is_zero()
        }
        None => true,
    }
}

pub async fn get_time_until_retry(registry: &ServiceRegistry, service: &str) -> Duration {
    match registry.breaker(service) {
        Some(breaker) => retry_delay(&breaker.stats().await, registry.clock().now_millis()),
        None => Duration::ZERO,
    }
}

/// Wait until the service would accept a request, for at most `max_wait`.
///
/// Returns whether a request may be attempted when the wait ends.
pub async fn wait_for_service(registry: &ServiceRegistry, service: &str, max_wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + max_wait;

    loop {
        let retry_in = get_time_until_retry(registry, service).await;
        if retry_in.is_zero() {
            return true;
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return false;
        }

        let pause = retry_in
            .min(deadline - now)
            .min(WAIT_POLL_INTERVAL)
            .max(Duration::from_millis(1));
        tokio::time::sleep(pause).await;
    }
}

/// Status of every registered service, sorted by name
pub async fn get_all_service_statuses(registry: &ServiceRegistry) -> Vec<ServiceStatus> {
    let mut statuses = Vec::new();
    for service in registry.service_names() {
        if let Some(status) = get_service_status(registry, service).await {
            statuses.push(status);
        }
    }
    statuses
}

/// True if any configured critical service has an open circuit
pub async fn are_critical_services_down(registry: &ServiceRegistry) -> bool {
    for service in registry.critical_services() {
        if let Some(breaker) = registry.breaker(service) {
            if breaker.state().await == CircuitState::Open {
                return true;
            }
        }
    }
    false
}

/// Human-readable one-line status for banners
pub async fn get_service_status_message(registry: &ServiceRegistry, service: &str) -> String {
    match get_service_status(registry, service).await {
        Some(status) => status.message,
        None => status_message(service, CircuitState::Closed, Duration::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResilienceConfig, AI_ASSISTANT, ORCHESTRATION, QUICK_ACTIONS, USER_MANAGEMENT};
    use crate::error::{Error, Result};
    use pursight_core_resilience::{ManualClock, ResilienceError};
    use std::sync::Arc;

    const START: u64 = 1_700_000_000_000;

    fn registry() -> (ServiceRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let registry = ServiceRegistry::with_clock(&ResilienceConfig::default(), clock.clone())
            .expect("default config is valid");
        (registry, clock)
    }

    /// aiAssistant opens after 3 failures and stays open for 30s
    async fn open_ai_assistant(registry: &ServiceRegistry) {
        for _ in 0..3 {
            let _: Result<()> = registry
                .call(AI_ASSISTANT, || async {
                    Err(Error::from(ResilienceError::Transient("inference timeout".into())))
                })
                .await;
        }
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(
            status_message("orchestration", CircuitState::Closed, Duration::ZERO),
            "orchestration is operating normally"
        );
        assert_eq!(
            status_message("orchestration", CircuitState::HalfOpen, Duration::ZERO),
            "orchestration is recovering, testing connectivity"
        );
        assert_eq!(
            status_message("orchestration", CircuitState::Open, Duration::from_millis(4_001)),
            "orchestration is temporarily unavailable, retrying in 5s"
        );
        assert_eq!(
            status_message("orchestration", CircuitState::Open, Duration::ZERO),
            "orchestration is temporarily unavailable, retrying now"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_service_status() {
        let (registry, _clock) = registry();

        assert!(is_service_healthy(&registry, ORCHESTRATION).await);
        assert!(should_attempt_request(&registry, ORCHESTRATION).await);
        assert_eq!(get_time_until_retry(&registry, ORCHESTRATION).await, Duration::ZERO);

        let status = get_service_status(&registry, ORCHESTRATION).await.unwrap();
        assert!(status.healthy);
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.retry_at, None);
        assert_eq!(status.retry_in_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_service_status() {
        let (registry, clock) = registry();
        open_ai_assistant(&registry).await;
        clock.advance(Duration::from_millis(10_000));

        assert!(!is_service_healthy(&registry, AI_ASSISTANT).await);
        assert!(!should_attempt_request(&registry, AI_ASSISTANT).await);
        assert_eq!(
            get_time_until_retry(&registry, AI_ASSISTANT).await,
            Duration::from_millis(20_000)
        );

        let status = get_service_status(&registry, AI_ASSISTANT).await.unwrap();
        assert_eq!(status.failure_count, 3);
        assert_eq!(status.retry_in_ms, 20_000);
        assert_eq!(status.last_failure_at, to_datetime(Some(START)));
        assert_eq!(status.retry_at, to_datetime(Some(START + 30_000)));
        assert_eq!(
            get_service_status_message(&registry, AI_ASSISTANT).await,
            "aiAssistant is temporarily unavailable, retrying in 20s"
        );

        clock.advance(Duration::from_millis(20_000));
        assert!(should_attempt_request(&registry, AI_ASSISTANT).await);
        // Still open until the next call probes the service
        assert!(!is_service_healthy(&registry, AI_ASSISTANT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_service_is_reported_healthy() {
        let (registry, _clock) = registry();

        assert!(is_service_healthy(&registry, "reporting").await);
        assert!(should_attempt_request(&registry, "reporting").await);
        assert!(get_service_status(&registry, "reporting").await.is_none());
        assert_eq!(
            get_service_status_message(&registry, "reporting").await,
            "reporting is operating normally"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_statuses_sorted() {
        let (registry, _clock) = registry();
        open_ai_assistant(&registry).await;

        let statuses = get_all_service_statuses(&registry).await;
        let names: Vec<_> = statuses.iter().map(|s| s.service.as_str()).collect();
        assert_eq!(names, vec![AI_ASSISTANT, ORCHESTRATION, QUICK_ACTIONS, USER_MANAGEMENT]);
        assert!(!statuses[0].healthy);
        assert!(statuses[1..].iter().all(|s| s.healthy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_services_down() {
        let (registry, _clock) = registry();

        // aiAssistant is not critical by default
        open_ai_assistant(&registry).await;
        assert!(!are_critical_services_down(&registry).await);

        for _ in 0..5 {
            let _: Result<()> = registry
                .call(USER_MANAGEMENT, || async {
                    Err(Error::from(ResilienceError::Transient("401 upstream".into())))
                })
                .await;
        }
        assert!(are_critical_services_down(&registry).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_service_times_out() {
        let (registry, _clock) = registry();
        open_ai_assistant(&registry).await;

        // The manual clock never reaches the retry time
        assert!(!wait_for_service(&registry, AI_ASSISTANT, Duration::from_secs(2)).await);
        assert!(wait_for_service(&registry, ORCHESTRATION, Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_service_until_retry() {
        let (registry, clock) = registry();
        open_ai_assistant(&registry).await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                wait_for_service(&registry, AI_ASSISTANT, Duration::from_secs(60)).await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        clock.advance(Duration::from_secs(30));
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_serializes_for_banners() {
        let (registry, _clock) = registry();
        open_ai_assistant(&registry).await;

        let status = get_service_status(&registry, AI_ASSISTANT).await.unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["service"], "aiAssistant");
        assert_eq!(json["state"], "OPEN");
        assert_eq!(json["healthy"], false);
        assert_eq!(json["retryInMs"], 30_000);
        assert!(json["retryAt"].is_string());
    }
}
