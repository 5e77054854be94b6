//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use moula_server::config::{
    AccountConfig, LoggingConfig, MoulaConfig, PlayerConfig, SdlConfig, ServerConfig, ShardConfig,
};
use moula_server::sdl::GuessLimits;
use std::time::Duration;
use tracing::Level;

fn account(name: &str) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        password: "secret".to_string(),
        id: None,
        flags: 0,
        billing: 0,
        players: Vec::new(),
    }
}

#[test]
fn test_default_config_validates() {
    let config = MoulaConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_server_address() {
    let mut config = MoulaConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = MoulaConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Server address cannot be empty")));
}

#[test]
fn test_zero_max_connections() {
    let mut config = MoulaConfig::default();
    config.server.max_connections = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_high_max_connections_warning() {
    let mut config = MoulaConfig::default();
    config.server.max_connections = 150_000;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max connections very high")));
}

#[test]
fn test_long_diagnostic_read_timeout() {
    let mut config = MoulaConfig::default();
    config.server.diagnostic_read_timeout = Duration::from_secs(30);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Diagnostic read timeout too long")));
}

#[test]
fn test_zero_propagate_buffer() {
    let mut config = MoulaConfig::default();
    config.server.max_propagate_buffer = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max propagate buffer must be greater than 0")));
}

#[test]
fn test_shutdown_timeout_bounds() {
    let mut config = MoulaConfig::default();
    config.server.shutdown_timeout = Duration::from_millis(50);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Shutdown timeout too short")));

    config.server.shutdown_timeout = Duration::from_secs(120);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Shutdown timeout too long")));
}

#[test]
fn test_empty_advertised_address() {
    let mut config = MoulaConfig::default();
    config.shard.file_server_address = String::new();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("file_server_address cannot be empty")));
}

#[test]
fn test_long_advertised_address_flagged() {
    let mut config = MoulaConfig::default();
    config.shard.auth_server_address = "auth.shard-of-the-cavern.example.org".to_string();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("auth_server_address longer than 24")));
}

#[test]
fn test_duplicate_account_names_ignore_case() {
    let mut config = MoulaConfig::default();
    config.shard.accounts = vec![account("Yeesha"), account("YEESHA")];

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Duplicate account name")));
}

#[test]
fn test_invalid_account_id() {
    let mut config = MoulaConfig::default();
    let mut bad = account("Yeesha");
    bad.id = Some("not-a-uuid".to_string());
    config.shard.accounts = vec![bad];

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid account id")));
}

#[test]
fn test_player_name_length() {
    let mut config = MoulaConfig::default();
    let mut owner = account("Yeesha");
    owner.players.push(PlayerConfig {
        ki_number: 5,
        name: "x".repeat(41),
        avatar_shape: String::new(),
        explorer: 1,
    });
    config.shard.accounts = vec![owner];

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Player name for KI 5 must be 1-40 characters")));
}

#[test]
fn test_sdl_windows_too_small() {
    let mut config = MoulaConfig::default();
    config.sdl.shape_window = 4;
    config.sdl.data_window = 2;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("SDL shape_window too small")));
    assert!(errors.iter().any(|e| e.contains("SDL data_window too small")));
}

#[test]
fn test_sdl_config_maps_to_limits() {
    let config = SdlConfig {
        data_window: 256,
        ..SdlConfig::default()
    };
    let limits = config.limits();
    assert_eq!(limits.data_window, 256);
    assert_eq!(limits.shape_window, GuessLimits::default().shape_window);
    assert_eq!(SdlConfig::from(limits), config);
}

#[test]
fn test_empty_app_name() {
    let mut config = MoulaConfig::default();
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Application name cannot be empty")));
}

#[test]
fn test_log_to_file_without_path() {
    let mut config = MoulaConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_no_logging_outputs() {
    let mut config = MoulaConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_with_valid_config() {
    let config = MoulaConfig::default();
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let mut config = MoulaConfig::default();
    config.server.address = String::new();

    let result = config.validate_strict();
    assert!(result.is_err());

    if let Err(e) = result {
        let error_str = e.to_string();
        assert!(error_str.contains("Configuration validation failed"));
    }
}

#[test]
fn test_multiple_validation_errors() {
    let mut config = MoulaConfig::default();

    config.server.address = String::new();
    config.server.max_connections = 0;
    config.shard.file_server_address = String::new();
    config.sdl.slot_window = 0;
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(
        errors.len() >= 5,
        "Expected at least 5 errors, got {}: {:?}",
        errors.len(),
        errors
    );
}

#[test]
fn test_toml_file_round_trip() {
    let path = std::env::temp_dir().join(format!("moula-config-{}.toml", std::process::id()));
    let config = MoulaConfig::from_toml(&MoulaConfig::example_config()).unwrap();
    config.save_to_file(&path).unwrap();

    let loaded = MoulaConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.shard.accounts.len(), 1);
    assert_eq!(loaded.shard.accounts[0].players[0].ki_number, 1000);
    assert_eq!(loaded.server.diagnostic_read_timeout, config.server.diagnostic_read_timeout);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = MoulaConfig::from_toml(
        r#"
        [server]
        address = "127.0.0.1:14617"
        diagnostic_read_timeout = 500

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.address, "127.0.0.1:14617");
    assert_eq!(config.server.diagnostic_read_timeout, Duration::from_millis(500));
    assert_eq!(config.server.max_connections, ServerConfig::default().max_connections);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert_eq!(config.shard.expected_build_id, ShardConfig::default().expected_build_id);
}

#[test]
fn test_bad_toml_is_config_error() {
    let err = MoulaConfig::from_toml("[server]\nmax_connections = \"many\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_valid_production_config() {
    let config = MoulaConfig {
        server: ServerConfig {
            address: "0.0.0.0:14617".to_string(),
            max_connections: 5000,
            diagnostic_read_bytes: 128,
            diagnostic_read_timeout: Duration::from_millis(500),
            max_ping_payload: 4096,
            max_propagate_buffer: 512 * 1024,
            shutdown_timeout: Duration::from_secs(10),
        },
        shard: ShardConfig {
            expected_build_id: 918,
            file_server_address: "files.example.org".to_string(),
            auth_server_address: "auth.example.org".to_string(),
            status_message: "Shard is up".to_string(),
            accounts: vec![account("explorer@example.com")],
        },
        sdl: SdlConfig::default(),
        logging: LoggingConfig {
            app_name: "moula-production".to_string(),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: true,
        },
    };

    let errors = config.validate();
    assert!(errors.is_empty(), "Production config should be valid, got: {:?}", errors);
}
