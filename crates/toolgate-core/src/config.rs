//! Configuration resolution for toolgate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/toolgate/settings.json)
//! 3. Project config (.toolgate/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::permissions::PermissionSettings;
use crate::security::{DEFAULT_ASSISTANT_CHANNEL, ValidationPolicy};

/// Default number of calls per channel allowed in a 60 second window.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;

/// Complete toolgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub permissions: PermissionSettings,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub log_level: String,
    pub log_json: bool,
    pub database_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            database_path: None,
        }
    }
}

/// Request validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    pub rate_limit_per_minute: u32,
    /// Channel carrying assistant prose, exempt from shell checks for code.
    pub assistant_channel: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            assistant_channel: DEFAULT_ASSISTANT_CHANNEL.to_string(),
        }
    }
}

impl ValidationConfig {
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            assistant_channel: self.assistant_channel.clone(),
            ..ValidationPolicy::default()
        }
    }
}

impl Config {
    /// Database file, falling back to the platform data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.gateway.database_path.clone().or_else(database_path)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let global = global_config_path();
    let mut config = load_config_files(global.as_deref(), project_dir)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Resolve defaults, the global file and the project file, without
/// consulting the environment.
///
/// Files are merged key by key: a later file only overrides the fields it
/// actually sets.
pub fn load_config_files(global_path: Option<&Path>, project_dir: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(path) = global_path.filter(|p| p.exists()) {
        merge_values(&mut merged, load_config_file(path)?);
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".toolgate").join("settings.json");
        if project_path.exists() {
            merge_values(&mut merged, load_config_file(&project_path)?);
        }
    }

    serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("toolgate").join("settings.json"))
}

/// Default database path.
pub fn database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("toolgate").join("toolgate.db"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively merge `overlay` into `base`. Objects merge per key; any other
/// value (arrays included) replaces what was there. `null` leaves the base
/// untouched.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

/// Apply `TOOLGATE_*` overrides read through `lookup`. Unparseable values
/// are logged and ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("TOOLGATE_LOG_LEVEL") {
        config.gateway.log_level = val;
    }
    if let Some(val) = lookup("TOOLGATE_AUTO_APPROVE") {
        match val.parse() {
            Ok(level) => config.permissions.auto_approve_level = level,
            Err(e) => warn!(value = %val, error = %e, "Ignoring TOOLGATE_AUTO_APPROVE"),
        }
    }
    if let Some(val) = lookup("TOOLGATE_REQUEST_TIMEOUT") {
        match val.parse() {
            Ok(secs) => config.permissions.request_timeout_secs = secs,
            Err(e) => warn!(value = %val, error = %e, "Ignoring TOOLGATE_REQUEST_TIMEOUT"),
        }
    }
    if let Some(val) = lookup("TOOLGATE_RATE_LIMIT") {
        match val.parse() {
            Ok(n) => config.validation.rate_limit_per_minute = n,
            Err(e) => warn!(value = %val, error = %e, "Ignoring TOOLGATE_RATE_LIMIT"),
        }
    }
}
