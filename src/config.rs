/*!
 * Configuration types for the PurSight resilience layer
 *
 * Each guarded backend service gets circuit breaker and throttler settings.
 * Fields a service entry leaves out, and services without an entry, fall back
 * to `defaults`. Durations are written in
 * milliseconds so the file maps one-to-one onto what operators see in the
 * status banners.
 *
 * ```toml
 * log_level = "debug"
 * critical_services = ["userManagement", "orchestration"]
 *
 * [services.aiAssistant.circuit_breaker]
 * failure_threshold = 3
 * recovery_timeout_ms = 30000
 *
 * [services.aiAssistant.throttler]
 * max_requests = 10
 * window_ms = 60000
 * ```
 */

use pursight_core_resilience::{CircuitBreakerConfig, ThrottlerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Names of the services guarded out of the box
pub const USER_MANAGEMENT: &str = "userManagement";
pub const ORCHESTRATION: &str = "orchestration";
pub const AI_ASSISTANT: &str = "aiAssistant";
pub const QUICK_ACTIONS: &str = "quickActions";

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Circuit breaker settings for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failures inside the monitoring window that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open before probing (milliseconds)
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Trailing window in which failures are counted (milliseconds)
    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,

    /// Requests needed before failures are evaluated
    #[serde(default = "default_request_volume_threshold")]
    pub request_volume_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            monitoring_window_ms: default_monitoring_window_ms(),
            request_volume_threshold: default_request_volume_threshold(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert config settings to the core crate's `CircuitBreakerConfig`
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            monitoring_window: Duration::from_millis(self.monitoring_window_ms),
            request_volume_threshold: self.request_volume_threshold,
        }
    }
}

/// Request throttler settings for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlerSettings {
    /// Requests admitted per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Sliding window length (milliseconds)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Pending requests allowed to wait for admission
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Delay between queue drain attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ThrottlerSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            queue_size: default_queue_size(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ThrottlerSettings {
    /// Convert config settings to the core crate's `ThrottlerConfig`
    pub fn to_resilience_config(&self) -> ThrottlerConfig {
        ThrottlerConfig {
            max_requests: self.max_requests,
            window: Duration::from_millis(self.window_ms),
            queue_size: self.queue_size,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Guard settings for one backend service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub throttler: ThrottlerSettings,
}

impl ServiceSettings {
    fn validate(&self, prefix: &str, problems: &mut Vec<String>) {
        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            problems.push(format!("{prefix}.circuit_breaker.failure_threshold must be > 0"));
        }
        if breaker.recovery_timeout_ms == 0 {
            problems.push(format!("{prefix}.circuit_breaker.recovery_timeout_ms must be > 0"));
        }
        if breaker.monitoring_window_ms == 0 {
            problems.push(format!("{prefix}.circuit_breaker.monitoring_window_ms must be > 0"));
        }

        let throttler = &self.throttler;
        if throttler.max_requests == 0 {
            problems.push(format!("{prefix}.throttler.max_requests must be > 0"));
        }
        if throttler.window_ms == 0 {
            problems.push(format!("{prefix}.throttler.window_ms must be > 0"));
        }
        if throttler.retry_delay_ms == 0 {
            problems.push(format!("{prefix}.throttler.retry_delay_ms must be > 0"));
        }
    }
}

/// Top-level configuration
///
/// Service entries read from TOML are resolved against `defaults` as they are
/// loaded, so every entry in `services` is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct ResilienceConfig {
    /// Log level for diagnostic output
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    pub verbose: bool,

    /// Services whose outage is reported by `are_critical_services_down`
    pub critical_services: Vec<String>,

    /// Settings for services without their own entry, and for any field a
    /// service entry leaves out
    pub defaults: ServiceSettings,

    /// Per-service settings
    pub services: BTreeMap<String, ServiceSettings>,
}

/// On-disk layout of [`ResilienceConfig`]
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    log_level: LogLevel,

    #[serde(default)]
    log_file: Option<PathBuf>,

    #[serde(default)]
    verbose: bool,

    #[serde(default = "default_critical_services")]
    critical_services: Vec<String>,

    #[serde(default)]
    defaults: ServiceSettings,

    /// Absent means the built-in catalog
    #[serde(default)]
    services: Option<BTreeMap<String, ServiceOverrides>>,
}

impl From<ConfigFile> for ResilienceConfig {
    fn from(file: ConfigFile) -> Self {
        let services = match file.services {
            Some(entries) => entries
                .into_iter()
                .map(|(name, overrides)| {
                    let settings = overrides.resolve(&file.defaults);
                    (name, settings)
                })
                .collect(),
            None => default_services(),
        };

        Self {
            log_level: file.log_level,
            log_file: file.log_file,
            verbose: file.verbose,
            critical_services: file.critical_services,
            defaults: file.defaults,
            services,
        }
    }
}

/// A service entry as written: every field is optional
#[derive(Debug, Default, Deserialize)]
struct ServiceOverrides {
    #[serde(default)]
    circuit_breaker: CircuitBreakerOverrides,

    #[serde(default)]
    throttler: ThrottlerOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct CircuitBreakerOverrides {
    failure_threshold: Option<u32>,
    recovery_timeout_ms: Option<u64>,
    monitoring_window_ms: Option<u64>,
    request_volume_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ThrottlerOverrides {
    max_requests: Option<u32>,
    window_ms: Option<u64>,
    queue_size: Option<usize>,
    retry_delay_ms: Option<u64>,
}

impl ServiceOverrides {
    fn resolve(self, defaults: &ServiceSettings) -> ServiceSettings {
        let breaker = self.circuit_breaker;
        let base = &defaults.circuit_breaker;
        let circuit_breaker = CircuitBreakerSettings {
            failure_threshold: breaker.failure_threshold.unwrap_or(base.failure_threshold),
            recovery_timeout_ms: breaker.recovery_timeout_ms.unwrap_or(base.recovery_timeout_ms),
            monitoring_window_ms: breaker
                .monitoring_window_ms
                .unwrap_or(base.monitoring_window_ms),
            request_volume_threshold: breaker
                .request_volume_threshold
                .unwrap_or(base.request_volume_threshold),
        };

        let throttler = self.throttler;
        let base = &defaults.throttler;
        ServiceSettings {
            circuit_breaker,
            throttler: ThrottlerSettings {
                max_requests: throttler.max_requests.unwrap_or(base.max_requests),
                window_ms: throttler.window_ms.unwrap_or(base.window_ms),
                queue_size: throttler.queue_size.unwrap_or(base.queue_size),
                retry_delay_ms: throttler.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            },
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            critical_services: default_critical_services(),
            defaults: ServiceSettings::default(),
            services: default_services(),
        }
    }
}

impl ResilienceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Settings for a service, falling back to `defaults`
    pub fn settings_for(&self, service: &str) -> &ServiceSettings {
        self.services.get(service).unwrap_or(&self.defaults)
    }

    /// Check value ranges and references, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        self.defaults.validate("defaults", &mut problems);
        for (name, settings) in &self.services {
            if name.trim().is_empty() {
                problems.push("service names must not be empty".to_string());
            }
            settings.validate(&format!("services.{name}"), &mut problems);
        }

        for critical in &self.critical_services {
            if !self.services.contains_key(critical) {
                problems.push(format!("critical service '{critical}' is not configured"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems))
        }
    }
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_recovery_timeout_ms() -> u64 {
    10_000
}

fn default_monitoring_window_ms() -> u64 {
    30_000
}

fn default_request_volume_threshold() -> u32 {
    5
}

fn default_max_requests() -> u32 {
    50
}

fn default_window_ms() -> u64 {
    30_000
}

fn default_queue_size() -> usize {
    200
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_critical_services() -> Vec<String> {
    vec![USER_MANAGEMENT.to_string(), ORCHESTRATION.to_string()]
}

/// Built-in services with their tuned overrides
fn default_services() -> BTreeMap<String, ServiceSettings> {
    let mut services = BTreeMap::new();

    // Login and RBAC calls: open early, recover slowly
    services.insert(
        USER_MANAGEMENT.to_string(),
        ServiceSettings {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 5,
                recovery_timeout_ms: 15_000,
                monitoring_window_ms: 60_000,
                request_volume_threshold: 3,
            },
            throttler: ThrottlerSettings {
                max_requests: 30,
                window_ms: 10_000,
                queue_size: 50,
                retry_delay_ms: 500,
            },
        },
    );

    services.insert(
        ORCHESTRATION.to_string(),
        ServiceSettings {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 8,
                recovery_timeout_ms: 20_000,
                monitoring_window_ms: 60_000,
                request_volume_threshold: 5,
            },
            throttler: ThrottlerSettings {
                max_requests: 40,
                window_ms: 30_000,
                queue_size: 100,
                retry_delay_ms: 300,
            },
        },
    );

    // Model inference is slow and expensive
    services.insert(
        AI_ASSISTANT.to_string(),
        ServiceSettings {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 3,
                recovery_timeout_ms: 30_000,
                monitoring_window_ms: 60_000,
                request_volume_threshold: 2,
            },
            throttler: ThrottlerSettings {
                max_requests: 10,
                window_ms: 60_000,
                queue_size: 25,
                retry_delay_ms: 1_000,
            },
        },
    );

    services.insert(
        QUICK_ACTIONS.to_string(),
        ServiceSettings {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 15,
                recovery_timeout_ms: 5_000,
                monitoring_window_ms: 30_000,
                request_volume_threshold: 10,
            },
            throttler: ThrottlerSettings {
                max_requests: 100,
                window_ms: 10_000,
                queue_size: 200,
                retry_delay_ms: 100,
            },
        },
    );

    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.verbose);
        assert_eq!(
            config.critical_services,
            vec!["userManagement".to_string(), "orchestration".to_string()]
        );
        assert_eq!(
            config.services.keys().collect::<Vec<_>>(),
            vec!["aiAssistant", "orchestration", "quickActions", "userManagement"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generic_defaults() {
        let settings = ServiceSettings::default();
        let breaker = settings.circuit_breaker.to_resilience_config();
        assert_eq!(breaker, CircuitBreakerConfig::default());

        let throttler = settings.throttler.to_resilience_config();
        assert_eq!(throttler, ThrottlerConfig::default());
    }

    #[test]
    fn test_settings_for_falls_back_to_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(
            config.settings_for(AI_ASSISTANT).throttler.max_requests,
            10
        );
        assert_eq!(config.settings_for("reporting"), &config.defaults);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ResilienceConfig::from_toml_str("").unwrap();
        assert_eq!(config, ResilienceConfig::default());
    }

    #[test]
    fn test_partial_service_override() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            log_level = "debug"
            critical_services = ["catalog"]

            [services.catalog.circuit_breaker]
            failure_threshold = 2

            [services.catalog.throttler]
            max_requests = 5
            window_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        // An explicit services table replaces the built-in catalog
        assert_eq!(config.services.len(), 1);

        let catalog = config.settings_for("catalog");
        assert_eq!(catalog.circuit_breaker.failure_threshold, 2);
        assert_eq!(catalog.circuit_breaker.recovery_timeout_ms, 10_000);
        assert_eq!(catalog.throttler.max_requests, 5);
        assert_eq!(catalog.throttler.queue_size, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_section_fills_service_entries() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            critical_services = []

            [defaults.circuit_breaker]
            failure_threshold = 2

            [defaults.throttler]
            max_requests = 7
            queue_size = 12

            [services.catalog]

            [services.lineage.throttler]
            max_requests = 3
            "#,
        )
        .unwrap();

        let catalog = config.settings_for("catalog");
        assert_eq!(catalog.circuit_breaker.failure_threshold, 2);
        assert_eq!(catalog.circuit_breaker.recovery_timeout_ms, 10_000);
        assert_eq!(catalog.throttler.max_requests, 7);
        assert_eq!(catalog.throttler.queue_size, 12);

        let lineage = config.settings_for("lineage");
        assert_eq!(lineage.throttler.max_requests, 3);
        assert_eq!(lineage.throttler.queue_size, 12);
        assert_eq!(lineage.circuit_breaker.failure_threshold, 2);

        assert_eq!(config.settings_for("reporting").throttler.max_requests, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_section_keeps_builtin_catalog() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            [defaults.throttler]
            max_requests = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.services, default_services());
        assert_eq!(config.settings_for(AI_ASSISTANT).throttler.max_requests, 10);
        assert_eq!(config.settings_for("reporting").throttler.max_requests, 7);
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut config = ResilienceConfig::default();
        config.critical_services.push("billing".to_string());
        if let Some(ai) = config.services.get_mut(AI_ASSISTANT) {
            ai.throttler.max_requests = 0;
            ai.circuit_breaker.monitoring_window_ms = 0;
        }

        match config.validate() {
            Err(Error::InvalidConfig(problems)) => {
                assert_eq!(problems.len(), 3);
                assert!(problems
                    .iter()
                    .any(|p| p == "services.aiAssistant.throttler.max_requests must be > 0"));
                assert!(problems
                    .iter()
                    .any(|p| p.contains("monitoring_window_ms")));
                assert!(problems.iter().any(|p| p.contains("'billing'")));
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = ResilienceConfig::from_toml_str("log_level = \"loud\"");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();

        let mut config = ResilienceConfig::default();
        config.log_level = LogLevel::Warn;
        config.to_file(temp_file.path()).unwrap();

        let loaded = ResilienceConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = ResilienceConfig::from_file(Path::new("/nonexistent/pursight.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
