//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use minimq::config::{ClientConfig, ConfigError};
use minimq::BrokerAddress;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[broker]
host = "mq.internal"
port = 7001
connect_timeout_ms = 2500

[consumer]
connect_backoff_ms = 3000
empty_poll_backoff_ms = 250
shutdown_timeout_ms = 4000
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.host, "mq.internal");
    assert_eq!(config.broker.port, 7001);
    assert_eq!(config.broker.connect_timeout_ms, 2500);
    assert_eq!(config.consumer.connect_backoff_ms, 3000);
    assert_eq!(config.consumer.empty_poll_backoff_ms, 250);
    assert_eq!(config.consumer.shutdown_timeout_ms, 4000);
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let temp_file = write_config("[broker]\nhost = \"mq.internal\"\n");

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.port, 5677);
    assert_eq!(config.broker.connect_timeout_ms, 5000);
    assert_eq!(config.consumer.connect_backoff_ms, 5000);
    assert_eq!(config.consumer.empty_poll_backoff_ms, 1000);
    assert_eq!(config.consumer.shutdown_timeout_ms, 2000);
}

#[test]
fn test_empty_file_is_a_default_client() {
    let temp_file = write_config("");

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, ClientConfig::default());
    assert_eq!(
        config.broker.address().unwrap(),
        BrokerAddress::new("localhost", 5677)
    );
}

#[test]
fn test_url_host_carries_its_own_port() {
    let temp_file = write_config(
        r#"
[broker]
host = "tcp://broker.example:9100"
port = 1234
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(
        config.broker.address().unwrap(),
        BrokerAddress::new("broker.example", 9100)
    );
}

#[test]
fn test_config_rejects_zero_port() {
    let temp_file = write_config("[broker]\nport = 0\n");

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_blank_host() {
    let temp_file = write_config("[broker]\nhost = \"   \"\n");

    let err = ClientConfig::load_from_file(temp_file.path()).unwrap_err();

    assert!(err.to_string().contains("broker.host"));
}

#[test]
fn test_config_rejects_zero_durations() {
    for section in [
        "[broker]\nconnect_timeout_ms = 0\n",
        "[consumer]\nconnect_backoff_ms = 0\n",
        "[consumer]\nempty_poll_backoff_ms = 0\n",
        "[consumer]\nshutdown_timeout_ms = 0\n",
    ] {
        let temp_file = write_config(section);
        let result = ClientConfig::load_from_file(temp_file.path());
        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(_))),
            "expected rejection for {section:?}"
        );
    }
}

#[test]
fn test_config_rejects_port_out_of_range() {
    let temp_file = write_config("[broker]\nport = 70000\n");

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_malformed_toml() {
    let temp_file = write_config("[broker\nhost = ");

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/minimq.toml"));

    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_env_overrides_replace_file_values() {
    // Only this test touches MINIMQ_* variables in this binary
    std::env::set_var("MINIMQ_HOST", "env-host");
    std::env::set_var("MINIMQ_PORT", "6100");
    let mut config = ClientConfig::for_broker("file-host", 1111);
    let applied = config.apply_env_overrides();

    std::env::set_var("MINIMQ_PORT", "not-a-port");
    let mut rejected = ClientConfig::default();
    let invalid = rejected.apply_env_overrides();

    std::env::remove_var("MINIMQ_HOST");
    std::env::remove_var("MINIMQ_PORT");

    applied.unwrap();
    assert_eq!(config.broker.host, "env-host");
    assert_eq!(config.broker.port, 6100);
    match invalid {
        Err(ConfigError::InvalidPort { var, value }) => {
            assert_eq!(var, "MINIMQ_PORT");
            assert_eq!(value, "not-a-port");
        }
        other => panic!("expected InvalidPort, got {other:?}"),
    }
}

#[test]
fn test_config_serializes_back_to_loadable_toml() {
    let mut config = ClientConfig::for_broker("mq.internal", 7001);
    config.consumer.empty_poll_backoff_ms = 300;

    let temp_file = write_config(&toml::to_string_pretty(&config).unwrap());
    let reloaded = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(reloaded, config);
}
