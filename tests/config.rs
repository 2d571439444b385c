// Config file tests - round-trip, partial files and rejection of bad values

use lite_ide::config::{Config, ConfigError};

#[test]
fn test_config_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.api_endpoint = "http://10.1.2.3:3000".to_string();
    config.terminal.auto_reconnect = true;
    config.terminal.resize_debounce_ms = 250;
    config.file_explorer.page_limit = 50;
    config.save_to_file(&config_path).unwrap();

    let loaded = Config::load_from_file(&config_path).unwrap();
    assert_eq!(loaded, config);

    let via_load = Config::load(config_path.to_str()).unwrap();
    assert_eq!(via_load, config);
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("config.json");
    std::fs::write(&config_path, r#"{ "ws_host": "wss://ide.example.com" }"#).unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    assert_eq!(config.ws_host, "wss://ide.example.com");
    assert_eq!(config.api_endpoint, Config::default().api_endpoint);
    assert_eq!(config.terminal, Config::default().terminal);
}

#[test]
fn test_invalid_files_are_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();

    let broken = temp_dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(matches!(
        Config::load_from_file(&broken),
        Err(ConfigError::ParseError(_))
    ));

    let zero_page = temp_dir.path().join("zero.json");
    std::fs::write(&zero_page, r#"{ "file_explorer": { "page_limit": 0 } }"#).unwrap();
    assert!(matches!(
        Config::load_from_file(&zero_page),
        Err(ConfigError::ValidationError(_))
    ));

    let missing = temp_dir.path().join("missing.json");
    assert!(matches!(
        Config::load(missing.to_str()),
        Err(ConfigError::IoError(_))
    ));
}
