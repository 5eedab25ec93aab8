//! Configuration file integration tests.
//!
//! These tests write JSON5 files to disk, load them back, and check that the
//! values reach the gateway configuration.

use linebox_core::config::{Config, SessionMode};
use linebox_core::ConfigError;
use linebox_gateway::GatewayConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("linebox.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.server.bind, config.server.bind);
    assert_eq!(loaded.server.session_mode, config.server.session_mode);
    assert_eq!(loaded.sandbox.args, config.sandbox.args);
    assert_eq!(loaded.sandbox.limits, config.sandbox.limits);
}

#[test]
fn test_hand_written_json5_reaches_gateway() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("linebox.json5");
    std::fs::write(
        &path,
        r#"{
            // Serve every line of a connection.
            server: {
                bind: "127.0.0.1:7000",
                max_sessions: 16,
                session_mode: "sequential",
                read_timeout_secs: 3,
                shutdown_grace_secs: 1,
            },
            sandbox: {
                module: "mastosan.wasm",
                args: ["mastosan"],
                limits: { timeout_ms: 250, fuel: 1000000 },
            },
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.sandbox.module, PathBuf::from("mastosan.wasm"));
    assert_eq!(config.sandbox.args, vec!["mastosan".to_string()]);
    assert_eq!(config.sandbox.limits.fuel, Some(1_000_000));

    let gateway = GatewayConfig::from_config(&config).unwrap();
    assert_eq!(gateway.bind, "127.0.0.1:7000".parse().unwrap());
    assert_eq!(gateway.max_sessions, 16);
    assert_eq!(gateway.session.mode, SessionMode::Sequential);
    assert_eq!(gateway.session.read_timeout, Duration::from_secs(3));
    assert_eq!(gateway.shutdown_grace, Duration::from_secs(1));
}

#[test]
fn test_invalid_values_are_all_reported() {
    let config = Config::parse(
        r#"{ server: { bind: "nowhere", max_sessions: 0 }, sandbox: { args: [] } }"#,
    )
    .unwrap();

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("nowhere"));
    assert!(message.contains("max_sessions"));
    assert!(message.contains("args"));
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/linebox.json5"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json5 {").is_err());
}
