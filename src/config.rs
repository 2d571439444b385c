use crate::file_tree::merge::DEFAULT_PAGE_LIMIT;
use crate::primitives::path_utils::expand_tilde;
use crate::primitives::timers::bounded_reconnect_delay;
use crate::services::terminal::frame::TerminalSize;
use crate::services::terminal::multiplexer::FocusPolicy;
use crate::services::terminal::session::SessionOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Base URL of the file API, e.g. `http://localhost:3000`
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Host of the terminal WebSocket, e.g. `ws://localhost:3000`
    #[serde(default = "default_ws_host")]
    pub ws_host: String,

    #[serde(default)]
    pub file_explorer: FileExplorerConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,
}

fn default_api_endpoint() -> String {
    "http://localhost:3000".to_string()
}

fn default_ws_host() -> String {
    "ws://localhost:3000".to_string()
}

/// File explorer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileExplorerConfig {
    /// Entries per directory listing page. A listing this long is marked as
    /// having more entries.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Delay before re-subscribing after the watch stream fails
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

impl Default for FileExplorerConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Terminal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TerminalConfig {
    /// Quiet period before a burst of viewport resizes is sent
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,

    #[serde(default = "default_focus_retry_ms")]
    pub focus_retry_ms: u64,

    /// Focus attempts before giving up on a view that never mounts
    #[serde(default = "default_focus_max_attempts")]
    pub focus_max_attempts: u32,

    /// Size used before the first viewport measurement
    #[serde(default = "default_cols")]
    pub cols: u16,

    #[serde(default = "default_rows")]
    pub rows: u16,

    /// Reconnect after the connection drops instead of closing the terminal
    #[serde(default)]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_resize_debounce_ms() -> u64 {
    100
}

fn default_focus_retry_ms() -> u64 {
    100
}

fn default_focus_max_attempts() -> u32 {
    5
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            resize_debounce_ms: default_resize_debounce_ms(),
            focus_retry_ms: default_focus_retry_ms(),
            focus_max_attempts: default_focus_max_attempts(),
            cols: default_cols(),
            rows: default_rows(),
            auto_reconnect: false,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            ws_host: default_ws_host(),
            file_explorer: FileExplorerConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

impl Config {
    pub const FILENAME: &'static str = "config.json";

    /// `{config_dir}/lite-ide/config.json`, if the platform has a config
    /// directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("lite-ide").join(Self::FILENAME))
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` (with `~` expanded), or the default location when `None`.
    ///
    /// A missing default file yields the defaults; an explicitly given file
    /// must exist.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(expand_tilde(path)),
            None => match Self::default_path() {
                Some(path) if path.exists() => {
                    tracing::info!("Loaded config from {}", path.display());
                    Self::load_from_file(path)
                }
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api_endpoint cannot be empty".to_string(),
            ));
        }
        if self.file_explorer.page_limit == 0 {
            return Err(ConfigError::ValidationError(
                "page_limit must be greater than 0".to_string(),
            ));
        }
        if self.terminal.cols == 0 || self.terminal.rows == 0 {
            return Err(ConfigError::ValidationError(
                "terminal cols and rows must be greater than 0".to_string(),
            ));
        }
        if self.terminal.focus_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "focus_max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// JSON Schema of the config file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }

    /// Watch reconnect delay, clamped to the supported range.
    pub fn tree_reconnect_delay(&self) -> Duration {
        bounded_reconnect_delay(Duration::from_millis(self.file_explorer.reconnect_delay_ms))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            initial_size: TerminalSize::new(self.terminal.cols, self.terminal.rows),
            resize_debounce: Duration::from_millis(self.terminal.resize_debounce_ms),
            auto_reconnect: self.terminal.auto_reconnect,
            reconnect_delay: bounded_reconnect_delay(Duration::from_millis(
                self.terminal.reconnect_delay_ms,
            )),
        }
    }

    pub fn focus_policy(&self) -> FocusPolicy {
        FocusPolicy {
            retry_delay: Duration::from_millis(self.terminal.focus_retry_ms),
            max_attempts: self.terminal.focus_max_attempts,
        }
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
