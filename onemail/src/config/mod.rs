use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::error::OneMailError;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Realtime connection settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Where the session tokens are persisted (defaults to the data dir)
    pub token_store_path: Option<PathBuf>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every route is joined onto
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
}

/// Realtime connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Websocket endpoint; the access token is added as `?token=`
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Authenticated status endpoint used by the liveness probe
    #[serde(default = "default_status_url")]
    pub status_url: String,

    /// Reconnect attempts after an unexpected close before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Fixed delay before each reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Interval of the liveness probe
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:5001/api".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:5001".to_string()
}

fn default_status_url() -> String {
    "http://localhost:5001/api/websocket/status".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_liveness_interval_ms() -> u64 {
    30_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            status_url: default_status_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            liveness_interval_ms: default_liveness_interval_ms(),
        }
    }
}

impl RealtimeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }
}

impl AppConfig {
    /// Apply `ONEMAIL_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ONEMAIL_API_URL") {
            debug!("Using API URL from environment: {}", url);
            self.api.base_url = url;
        }
        if let Ok(url) = std::env::var("ONEMAIL_WS_URL") {
            debug!("Using websocket URL from environment: {}", url);
            self.realtime.ws_url = url;
        }
        if let Ok(url) = std::env::var("ONEMAIL_STATUS_URL") {
            self.realtime.status_url = url;
        }
    }

    /// Resolved token store path
    pub fn token_store_path(&self) -> PathBuf {
        self.token_store_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("onemail")
                .join("session.json")
        })
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("onemail").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join("onemail").join("config.toml"));
        paths.push(home_dir.join(".onemail.rc"));
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), OneMailError> {
    info!("Initializing configuration from default paths");

    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    // No config found, fall back to defaults
    info!("No config file found, using defaults");
    let mut config = AppConfig::default();
    config.apply_env_overrides();
    set_config(config)
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<(), OneMailError> {
    info!("Loading configuration from: {:?}", path);

    let mut config = load_config(path)?;
    config.apply_env_overrides();
    set_config(config)
}

/// Parse a config file without touching the global instance
pub fn load_config(path: &Path) -> Result<AppConfig, OneMailError> {
    let content = fs::read_to_string(path)
        .map_err(|e| OneMailError::Config(format!("Failed to read config: {}", e)))?;

    toml::from_str(&content)
        .map_err(|e| OneMailError::Config(format!("Failed to parse config: {}", e)))
}

/// Set the global configuration
fn set_config(config: AppConfig) -> Result<(), OneMailError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| OneMailError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Get a copy of the current configuration
pub fn get_config() -> Result<AppConfig, OneMailError> {
    let lock = CONFIG
        .get()
        .ok_or_else(|| OneMailError::Config("Configuration not initialized".to_string()))?;
    let guard = lock
        .read()
        .map_err(|e| OneMailError::Config(format!("Failed to lock config: {}", e)))?;
    Ok(guard.clone())
}

/// Check if configuration is initialized
pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}
