//! Configuration – reads `/etc/smartcar/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `SMARTCAR_*` environment variables are applied on top of whatever was
//! loaded.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use smartcar_hal::DEFAULT_SYSFS_ROOT;
use smartcar_runtime::{DEFAULT_COMMAND_CAPACITY, LoopConfig};
use smartcar_service::DEFAULT_SOCKET_PATH;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/smartcar/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Unix socket the control service listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Root of the sysfs GPIO tree.
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    /// Delay between attempts to reach the control service.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}
fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_command_queue_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            gpio_root: default_gpio_root(),
            retry_interval_ms: default_retry_interval_ms(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

impl Config {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            retry_interval: Duration::from_millis(self.retry_interval_ms.max(1)),
            command_capacity: self.command_queue_capacity.max(1),
        }
    }
}

/// Load the config from `path`, falling back to defaults when the file does
/// not exist, then apply environment overrides.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Load the config file only.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `SMARTCAR_*` overrides, reading variables through `var`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SMARTCAR_SOCKET` | `socket_path` |
/// | `SMARTCAR_GPIO_ROOT` | `gpio_root` |
/// | `SMARTCAR_RETRY_MS` | `retry_interval_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SMARTCAR_SOCKET") {
        cfg.socket_path = PathBuf::from(v);
    }
    if let Some(v) = var("SMARTCAR_GPIO_ROOT") {
        cfg.gpio_root = PathBuf::from(v);
    }
    if let Some(v) = var("SMARTCAR_RETRY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.retry_interval_ms = ms;
    }
}
