//! Application-level configuration loading: port and timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ADABRA_CONFIG_PATH";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TICK_INTERVAL_MS: u64 = 200;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_IDLE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_EMPTY_TTL_SECS: u64 = 2 * 60;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// TCP port the server listens on.
    pub port: u16,
    /// Cadence of the process-wide countdown ticker.
    pub tick_interval: Duration,
    /// Cadence of the room reaper.
    pub reaper_interval: Duration,
    /// Rooms idle longer than this are deleted.
    pub idle_ttl: Duration,
    /// Rooms with no attached sessions and idle longer than this are deleted.
    pub empty_ttl: Duration,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults so
    /// the server runs with no configuration at all.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), ?config, "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            idle_ttl: Duration::from_secs(DEFAULT_IDLE_TTL_SECS),
            empty_ttl: Duration::from_secs(DEFAULT_EMPTY_TTL_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    tick_interval_ms: Option<u64>,
    reaper_interval_secs: Option<u64>,
    idle_ttl_secs: Option<u64>,
    empty_ttl_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            port: raw.port.unwrap_or(defaults.port),
            tick_interval: raw
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            reaper_interval: raw
                .reaper_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            idle_ttl: raw
                .idle_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_ttl),
            empty_ttl: raw
                .empty_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.empty_ttl),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
