/*!
 * PurSight - Service-call resilience layer
 *
 * Guards outbound calls from the PurSight data governance platform to its
 * backend services:
 * - Per-service circuit breakers that fail fast while a service is down
 * - Per-service request throttling with a bounded admission queue
 * - Health status helpers for banners and retry gating
 * - TOML configuration with built-in service overrides
 * - Structured logging via tracing
 *
 * ```no_run
 * use pursight::{ResilienceConfig, ServiceRegistry, Result};
 *
 * # async fn example() -> Result<()> {
 * let config = ResilienceConfig::default();
 * pursight::logging::init_logging(&config)?;
 *
 * let registry = ServiceRegistry::from_config(&config)?;
 * let users: Vec<String> = registry
 *     .call("userManagement", || async {
 *         // Call the backend here
 *         Ok::<_, pursight::Error>(vec!["admin".to_string()])
 *     })
 *     .await?;
 *
 * if pursight::status::are_critical_services_down(&registry).await {
 *     // Show the outage banner
 * }
 * # Ok(())
 * # }
 * ```
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod status;

// Re-export commonly used types
pub use config::{CircuitBreakerSettings, LogLevel, ResilienceConfig, ServiceSettings, ThrottlerSettings};
pub use error::{Error, Result};
pub use pursight_core_resilience as resilience;
pub use registry::ServiceRegistry;
pub use status::ServiceStatus;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
