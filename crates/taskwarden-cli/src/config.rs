//! Configuration Vault – reads/writes `~/.taskwarden/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use taskwarden_runtime::SupervisorConfig;

/// Persisted supervisor configuration stored in `~/.taskwarden/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Longest a unit may go without kicking its watchdog, in milliseconds.
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    /// Watchdog monitor polling period, in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Watchdog subscription slots.
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Priority used by `/spawn` when none is given.
    #[serde(default = "default_priority")]
    pub default_priority: u32,

    /// Stack size used by `/spawn` when none is given, in bytes.
    #[serde(default = "default_stack_size")]
    pub default_stack_size: usize,
}

/// Floor for `monitor_interval_ms`; a zero interval would spin the monitor.
const MIN_MONITOR_INTERVAL_MS: u64 = 10;

fn default_watchdog_timeout_ms() -> u64 {
    5000
}
fn default_monitor_interval_ms() -> u64 {
    500
}
fn default_max_subscribers() -> usize {
    16
}
fn default_priority() -> u32 {
    1
}
fn default_stack_size() -> usize {
    4096
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            max_subscribers: default_max_subscribers(),
            default_priority: default_priority(),
            default_stack_size: default_stack_size(),
        }
    }
}

impl Config {
    /// Supervisor tunables derived from this config.
    ///
    /// Zero values are clamped: the timeout to 1 ms, the monitor interval to
    /// `MIN_MONITOR_INTERVAL_MS` and the subscriber count to one slot.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            watchdog_timeout: Duration::from_millis(self.watchdog_timeout_ms.max(1)),
            poll_interval: Duration::from_millis(self.monitor_interval_ms.max(MIN_MONITOR_INTERVAL_MS)),
            max_subscribers: self.max_subscribers.max(1),
        }
    }

    /// How often demo workers kick: a quarter of the watchdog timeout.
    pub fn kick_interval(&self) -> Duration {
        Duration::from_millis((self.watchdog_timeout_ms / 4).max(1))
    }
}

/// Return the path to `~/.taskwarden/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".taskwarden").join("config.toml")
}

/// Load the config from disk and apply env overrides.  Returns `None` if
/// the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `TASKWARDEN_*` environment variable overrides to `cfg`.
///
/// Unparseable and zero values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `TASKWARDEN_WATCHDOG_TIMEOUT_MS` | `watchdog_timeout_ms` |
/// | `TASKWARDEN_MONITOR_INTERVAL_MS` | `monitor_interval_ms` |
/// | `TASKWARDEN_MAX_SUBSCRIBERS` | `max_subscribers` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TASKWARDEN_WATCHDOG_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.watchdog_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("TASKWARDEN_MONITOR_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.monitor_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("TASKWARDEN_MAX_SUBSCRIBERS")
        && let Ok(n) = v.parse::<usize>()
        && n > 0
    {
        cfg.max_subscribers = n;
    }
}

/// Save the config to disk, creating `~/.taskwarden/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
