//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `TURNSTILE_CONFIG` env var
//! 3. **Environment variables**: `TURNSTILE__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`BackendConfig`]: ledger access backends in preference order
//! - [`ContractConfig`]: contract registry entries
//! - [`HealthConfig`]: probe cadence and the degraded latency threshold
//! - [`PollingConfig`]: reconciliation loop cadence, entity counter, pending retention
//! - [`SubscriptionConfig`]: push subscription topics and reconnect backoff
//! - [`ConfirmationConfig`]: `wait_for_confirmation` polling
//! - [`StorageConfig`]: local scratch storage location
//! - [`LoggingConfig`]: Log level and format
//! - [`ViewerConfig`]: identity bound at startup
//!
//! # Example
//!
//! ```toml
//! [[backends]]
//! name = "primary"
//! url = "https://rpc.example.com"
//! ws_url = "wss://rpc.example.com/ws"
//!
//! [[backends]]
//! name = "fallback"
//! url = "https://fallback.example.com"
//! capabilities = ["read"]
//!
//! [[contracts]]
//! name = "factory"
//! address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
//! functions = ["eventCount()(uint256)"]
//! events = ["EventCreated(uint256,address,address)"]
//!
//! [polling]
//! counter = { contract = "factory", function = "eventCount" }
//!
//! [subscription]
//! factory_contract = "factory"
//! created_event = "EventCreated"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::subscription::backoff::MAX_JITTER_RATIO;

/// What a backend may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Subscribe,
}

/// Configuration for a single ledger access backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Human-readable identifier, used in logs and the health table.
    pub name: String,

    /// HTTP(S) JSON-RPC endpoint.
    pub url: String,

    /// Optional websocket endpoint. Required for the `subscribe` capability to take effect.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Defaults to all capabilities.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,

    /// Per-request timeout in seconds. Defaults to `10`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Read, Capability::Write, Capability::Subscribe]
}

fn default_timeout_seconds() -> u64 {
    10
}

impl BackendConfig {
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        let listed = self.capabilities.contains(&capability);
        match capability {
            Capability::Subscribe => listed && self.ws_url.is_some(),
            _ => listed,
        }
    }
}

/// A contract as declared in configuration, resolved into the registry at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Logical name, e.g. `"factory"` or `"marketplace"`.
    pub name: String,
    pub address: String,
    /// Function signatures in `name(inputs)(outputs)` form.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Event signatures in `Name(types)` form.
    #[serde(default)]
    pub events: Vec<String>,
    /// `read` and/or `write`. Defaults to both.
    #[serde(default = "default_contract_capabilities")]
    pub capabilities: Vec<Capability>,
}

fn default_contract_capabilities() -> Vec<Capability> {
    vec![Capability::Read, Capability::Write]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between probe rounds. Defaults to `30`.
    #[serde(default = "default_health_interval")]
    pub interval_seconds: u64,

    /// Upper bound on a single `eth_blockNumber` probe. Defaults to `5`.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// A successful probe slower than this marks the backend degraded. Defaults to `2000`.
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
}

fn default_health_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_degraded_latency_ms() -> u64 {
    2000
}

/// Entity counter read by the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterConfig {
    pub contract: String,
    pub function: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between ticks. Defaults to `10`.
    #[serde(default = "default_polling_interval")]
    pub interval_seconds: u64,

    /// Counter diffed on every block change. Without it only holder and receipt checks run.
    #[serde(default)]
    pub counter: Option<CounterConfig>,

    /// Pending transactions older than this are abandoned. Defaults to 24 hours.
    #[serde(default = "default_pending_max_age")]
    pub pending_max_age_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    10
}

fn default_pending_max_age() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Registry name of the factory contract whose creation event is followed.
    #[serde(default)]
    pub factory_contract: Option<String>,

    /// Event name (declared on the factory contract) announcing a new entity.
    #[serde(default = "default_created_event")]
    pub created_event: String,

    /// Defaults to `1000`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Defaults to `30000`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Reconnect attempts before the session goes to the terminal error state. Defaults to `12`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the uniform jitter, as a fraction of the exponential delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Close the session if no frame arrives for this long. `0` disables the check.
    #[serde(default)]
    pub idle_timeout_seconds: u64,
}

fn default_created_event() -> String {
    "EventCreated".to_string()
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    12
}

fn default_jitter_ratio() -> f64 {
    MAX_JITTER_RATIO
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Defaults to `1000`.
    #[serde(default = "default_confirmation_poll_ms")]
    pub poll_interval_ms: u64,

    /// Defaults to `120`.
    #[serde(default = "default_confirmation_timeout")]
    pub timeout_seconds: u64,
}

fn default_confirmation_poll_ms() -> u64 {
    1000
}

fn default_confirmation_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing the scratch store. `None` keeps state in memory only.
    #[serde(default = "default_storage_path")]
    pub path: Option<String>,
}

#[allow(clippy::unnecessary_wraps)]
fn default_storage_path() -> Option<String> {
    Some("data/turnstile-state.json".to_string())
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (`error`, `warn`, `info`, `debug`, `trace`). Defaults to `"info"`.
    pub level: String,

    /// Log output format (`"json"` or `"pretty"`). Defaults to `"pretty"`.
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Address bound as the viewer at startup.
    #[serde(default)]
    pub address: Option<String>,
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_health_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            degraded_latency_ms: default_degraded_latency_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_polling_interval(),
            counter: None,
            pending_max_age_seconds: default_pending_max_age(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            factory_contract: None,
            created_event: default_created_event(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_ratio: default_jitter_ratio(),
            idle_timeout_seconds: 0,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_confirmation_poll_ms(),
            timeout_seconds: default_confirmation_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendConfig {
                name: "local".to_string(),
                url: "http://127.0.0.1:8545".to_string(),
                ws_url: Some("ws://127.0.0.1:8546".to_string()),
                capabilities: default_capabilities(),
                timeout_seconds: default_timeout_seconds(),
            }],
            contracts: Vec::new(),
            health: HealthConfig::default(),
            polling: PollingConfig::default(),
            subscription: SubscriptionConfig::default(),
            confirmation: ConfirmationConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `TURNSTILE__` prefix can override any configuration
    /// value. Use `__` as a separator for nested fields (e.g.,
    /// `TURNSTILE__POLLING__INTERVAL_SECONDS=5`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("health.interval_seconds", default_health_interval())?
            .set_default("health.probe_timeout_seconds", default_probe_timeout())?
            .set_default("health.degraded_latency_ms", default_degraded_latency_ms())?
            .set_default("polling.enabled", true)?
            .set_default("polling.interval_seconds", default_polling_interval())?
            .set_default("polling.pending_max_age_seconds", default_pending_max_age())?
            .set_default("subscription.enabled", true)?
            .set_default("confirmation.poll_interval_ms", default_confirmation_poll_ms())?
            .set_default("confirmation.timeout_seconds", default_confirmation_timeout())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("TURNSTILE").prefix_separator("__").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `TURNSTILE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("TURNSTILE_CONFIG")
            .unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health.interval_seconds)
    }

    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    #[must_use]
    pub fn pending_max_age(&self) -> Duration {
        Duration::from_secs(self.polling.pending_max_age_seconds)
    }

    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation.timeout_seconds)
    }

    #[must_use]
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation.poll_interval_ms)
    }

    /// Returns the idle timeout, if enabled.
    #[must_use]
    pub fn subscription_idle_timeout(&self) -> Option<Duration> {
        match self.subscription.idle_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - At least one backend is configured, with unique names
    /// - All URLs use the expected scheme
    /// - Intervals and timeouts are greater than zero
    /// - Logging format is either `"json"` or `"pretty"`
    /// - The polling counter and the subscription factory reference declared contracts
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.backends.is_empty() {
            return Err("No ledger backends configured".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(format!("Duplicate backend name: {}", backend.name));
            }
            if !has_scheme(&backend.url, &["http", "https"]) {
                return Err(format!("Invalid HTTP URL for backend {}: {}", backend.name, backend.url));
            }
            if let Some(ref ws_url) = backend.ws_url {
                if !has_scheme(ws_url, &["ws", "wss"]) {
                    return Err(format!(
                        "Invalid WebSocket URL for backend {}: {}",
                        backend.name, ws_url
                    ));
                }
            }
            if backend.timeout_seconds == 0 {
                return Err(format!("Timeout must be greater than 0 for backend {}", backend.name));
            }
        }

        if self.health.interval_seconds == 0 || self.health.probe_timeout_seconds == 0 {
            return Err("Health check interval and probe timeout must be greater than 0".to_string());
        }

        if self.polling.interval_seconds == 0 {
            return Err("Polling interval must be greater than 0".to_string());
        }

        if self.confirmation.poll_interval_ms == 0 {
            return Err("Confirmation poll interval must be greater than 0".to_string());
        }

        if self.subscription.base_delay_ms == 0 ||
            self.subscription.max_delay_ms < self.subscription.base_delay_ms
        {
            return Err("Subscription delays must satisfy 0 < base_delay_ms <= max_delay_ms".to_string());
        }

        if !(0.0..=MAX_JITTER_RATIO).contains(&self.subscription.jitter_ratio) {
            return Err(format!("Subscription jitter_ratio must be within [0, {MAX_JITTER_RATIO}]"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        if let Some(counter) = &self.polling.counter {
            let contract = self.contract(&counter.contract).ok_or_else(|| {
                format!("Polling counter references unknown contract: {}", counter.contract)
            })?;
            let declared = contract
                .functions
                .iter()
                .any(|sig| sig.split('(').next().is_some_and(|n| n.trim() == counter.function));
            if !declared {
                return Err(format!(
                    "Polling counter function {} is not declared on contract {}",
                    counter.function, counter.contract
                ));
            }
        }

        if let Some(factory) = &self.subscription.factory_contract {
            if self.contract(factory).is_none() {
                return Err(format!("Subscription references unknown contract: {factory}"));
            }
        }

        Ok(())
    }

    fn contract(&self, name: &str) -> Option<&ContractConfig> {
        self.contracts.iter().find(|c| c.name == name)
    }
}

fn has_scheme(raw: &str, schemes: &[&str]) -> bool {
    url::Url::parse(raw).is_ok_and(|url| schemes.contains(&url.scheme()))
}
