//! Configuration layering: defaults, TOML file, then `TURNSTILE__` environment overrides.
//!
//! Environment mutation is process-wide, so these tests run serially.

use serial_test::serial;
use std::io::Write;
use turnstile_core::config::{AppConfig, Capability};

const CONFIG: &str = r#"
[[backends]]
name = "primary"
url = "http://127.0.0.1:8545"
ws_url = "ws://127.0.0.1:8546"

[[backends]]
name = "archive"
url = "https://archive.example.org"
capabilities = ["read"]
timeout_seconds = 30

[[contracts]]
name = "factory"
address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
functions = ["eventCount()(uint256)"]
events = ["EventCreated(uint256,address)"]

[polling]
interval_seconds = 5
counter = { contract = "factory", function = "eventCount" }

[subscription]
factory_contract = "factory"
"#;

fn write_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_file_values_and_defaults() {
    let file = write_config();
    let config = AppConfig::from_file(file.path()).unwrap();

    assert_eq!(config.backends.len(), 2);
    assert!(config.backends[0].supports(Capability::Subscribe));
    assert!(!config.backends[1].supports(Capability::Subscribe));
    assert_eq!(config.backends[1].timeout_seconds, 30);
    assert_eq!(config.polling.interval_seconds, 5);
    assert_eq!(config.subscription.max_attempts, 12);
    assert_eq!(config.subscription.base_delay_ms, 1000);
    assert_eq!(config.health.interval_seconds, 30);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config();
    std::env::set_var("TURNSTILE__POLLING__INTERVAL_SECONDS", "3");
    std::env::set_var("TURNSTILE__LOGGING__FORMAT", "json");

    let config = AppConfig::from_file(file.path());

    std::env::remove_var("TURNSTILE__POLLING__INTERVAL_SECONDS");
    std::env::remove_var("TURNSTILE__LOGGING__FORMAT");

    let config = config.unwrap();
    assert_eq!(config.polling.interval_seconds, 3);
    assert_eq!(config.logging.format, "json");
}

#[test]
#[serial]
fn test_invalid_override_fails_validation() {
    let file = write_config();
    std::env::set_var("TURNSTILE__POLLING__INTERVAL_SECONDS", "0");

    let config = AppConfig::from_file(file.path());

    std::env::remove_var("TURNSTILE__POLLING__INTERVAL_SECONDS");

    let err = config.unwrap().validate().unwrap_err();
    assert!(err.contains("Polling interval"), "{err}");
}
