use crate::config::{Config, DEFAULT_DESCRIPTION, DEFAULT_LIFETIME_SECS};
use crate::Error;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.discovery_window(), Duration::from_millis(200));
    assert_eq!(config.control_timeout(), Duration::from_secs(5));
    assert_eq!(config.natpmp_gateway, None);
    assert_eq!(config.default_description, DEFAULT_DESCRIPTION);
    assert_eq!(config.default_lifetime_secs, DEFAULT_LIFETIME_SECS);
    assert_eq!(config.max_list_entries, 1024);
    assert!(config.validate().is_ok());
}

#[test]
fn test_retry_policy_from_config() {
    let config = Config {
        natpmp_initial_timeout_ms: 100,
        natpmp_max_attempts: 9,
        ..Config::default()
    };

    let policy = config.retry_policy();
    assert_eq!(policy.initial_timeout, Duration::from_millis(100));
    assert_eq!(policy.max_attempts, 9);
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.json");

    let config = Config::load(&path).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_empty_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gatewayctl.json");
    fs::write(&path, "  \n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_partial_file_keeps_other_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gatewayctl.json");
    fs::write(
        &path,
        r#"{ "discovery_window_ms": 1500, "natpmp_gateway": "10.0.0.1" }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.discovery_window_ms, 1500);
    assert_eq!(
        config.natpmp_gateway,
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
    );
    assert_eq!(config.control_timeout_ms, 5000);
    assert_eq!(config.natpmp_max_attempts, 4);
}

#[test]
fn test_load_invalid_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gatewayctl.json");
    fs::write(&path, "{ not json").unwrap();

    let result = Config::load(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_load_rejects_zero_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gatewayctl.json");
    fs::write(&path, r#"{ "natpmp_max_attempts": 0 }"#).unwrap();

    match Config::load(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("natpmp_max_attempts")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_validate_rejects_each_zero_field() {
    let cases = [
        Config {
            discovery_window_ms: 0,
            ..Config::default()
        },
        Config {
            control_timeout_ms: 0,
            ..Config::default()
        },
        Config {
            natpmp_initial_timeout_ms: 0,
            ..Config::default()
        },
        Config {
            max_list_entries: 0,
            ..Config::default()
        },
    ];

    for config in cases {
        assert!(config.validate().is_err(), "{:?} should be rejected", config);
    }
}

#[test]
fn test_config_serialization_round_trip() {
    let config = Config {
        natpmp_gateway: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))),
        default_description: "media server".to_string(),
        ..Config::default()
    };

    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}
