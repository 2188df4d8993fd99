//! TOML-based configuration persistence for the latency daemon.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Linux:    `$XDG_CONFIG_HOME/latency-daemon/config.toml`
//!             (falls back to `~/.config/latency-daemon/config.toml`)
//! - macOS:    `~/Library/Application Support/latency-daemon/config.toml`
//!
//! Command-line flags override whatever the file says; see `main.rs`.
//!
//! # Example
//!
//! ```toml
//! [daemon]
//! log_level = "debug"
//!
//! [delays]
//! click_min_ms = 40
//! click_max_ms = 120
//! move_min_ms = 0
//! move_max_ms = 15
//! distribution = "normal"
//! mu = 80.0
//! sigma = 10.0
//!
//! [engine]
//! queue_capacity = 4096
//! shutdown_policy = "drain"
//! shutdown_deadline_ms = 1000
//!
//! [io]
//! device = "/dev/input/event3"
//! control_socket = "/run/latency-daemon.sock"
//! event_log = "event_log.csv"
//! ```
//!
//! # Serde default values
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a valid configuration: zero delays, uniform distribution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use latency_core::{DelayConfig, DelayRange, Distribution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::engine::{EngineSettings, ShutdownPolicy};
use crate::application::schedule_events::DEFAULT_QUEUE_CAPACITY;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub delays: DelaysConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub io: IoConfig,
}

/// General daemon behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Schema version string – bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Initial delay ranges and distribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelaysConfig {
    #[serde(default)]
    pub click_min_ms: u64,
    #[serde(default)]
    pub click_max_ms: u64,
    #[serde(default)]
    pub move_min_ms: u64,
    #[serde(default)]
    pub move_max_ms: u64,
    #[serde(default)]
    pub distribution: Distribution,
    /// Normal mean in ms.  Defaults to the click midpoint when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mu: Option<f64>,
    /// Normal standard deviation in ms.  Defaults to `mu / 20` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
}

/// Queue and shutdown tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
    /// How long shutdown keeps emitting already-scheduled events.
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Device, socket and log file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IoConfig {
    /// Input device node to capture from, e.g. `/dev/input/event3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    /// Where re-emitted records are written.  Absent means dry run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Unix socket accepting reconfiguration lines.  Absent disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_socket: Option<PathBuf>,
    /// Event log appended at shutdown.  Defaults to `event_log.csv`; the
    /// value `"none"` disables persistence.
    #[serde(default = "default_event_log", with = "disableable_path")]
    pub event_log: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_shutdown_deadline_ms() -> u64 {
    1_000
}
fn default_event_log() -> Option<PathBuf> {
    Some(PathBuf::from("event_log.csv"))
}

/// Returns `None` for the literal `none` (any case), otherwise the path.
pub fn parse_optional_path(value: &str) -> Option<PathBuf> {
    (!value.eq_ignore_ascii_case(DISABLED)).then(|| PathBuf::from(value))
}

const DISABLED: &str = "none";

/// Serde adapter writing a disabled path as `"none"`, since TOML has no null.
mod disableable_path {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(path) => path.serialize(serializer),
            None => serializer.serialize_str(super::DISABLED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(super::parse_optional_path(&raw))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            shutdown_policy: ShutdownPolicy::default(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
            seed: None,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            device: None,
            output: None,
            control_socket: None,
            event_log: default_event_log(),
        }
    }
}

impl AppConfig {
    /// The initial delay configuration described by `[delays]`.
    ///
    /// Missing `mu`/`sigma` fall back to the click midpoint and `mu / 20`.
    pub fn delay_config(&self) -> DelayConfig {
        let d = &self.delays;
        let mut config = DelayConfig::with_defaults(
            DelayRange::new(d.click_min_ms, d.click_max_ms),
            DelayRange::new(d.move_min_ms, d.move_max_ms),
            d.distribution,
        );
        if let Some(mu) = d.mu {
            config.mu = mu;
            config.sigma = mu / 20.0;
        }
        if let Some(sigma) = d.sigma {
            config.sigma = sigma;
        }
        config
    }

    /// Engine settings described by `[engine]` and `[io]`.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            queue_capacity: self.engine.queue_capacity,
            shutdown_policy: self.engine.shutdown_policy,
            log_path: self.io.event_log.clone(),
            seed: self.engine.seed,
        }
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.engine.shutdown_deadline_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`.
///
/// Creates the parent directory and file if they do not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `latency-daemon` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("latency-daemon"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("latency-daemon")
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── AppConfig defaults ────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_has_zero_uniform_delays() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.delays.click_max_ms, 0);
        assert_eq!(cfg.delays.move_max_ms, 0);
        assert_eq!(cfg.delays.distribution, Distribution::Uniform);
        assert_eq!(cfg.engine.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(cfg.engine.shutdown_policy, ShutdownPolicy::Drain);
    }

    #[test]
    fn test_daemon_config_default_log_level_is_info() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_io_config_defaults_to_event_log_csv() {
        let cfg = IoConfig::default();
        assert_eq!(cfg.event_log, Some(PathBuf::from("event_log.csv")));
        assert!(cfg.device.is_none());
        assert!(cfg.control_socket.is_none());
    }

    // ── Derived settings ──────────────────────────────────────────────────────

    #[test]
    fn test_delay_config_defaults_mu_to_click_midpoint() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.delays.click_min_ms = 40;
        cfg.delays.click_max_ms = 120;
        cfg.delays.distribution = Distribution::Normal;

        // Act
        let delay = cfg.delay_config();

        // Assert
        assert_eq!(delay.mu, 80.0);
        assert_eq!(delay.sigma, 4.0);
        assert_eq!(delay.distribution, Distribution::Normal);
    }

    #[test]
    fn test_delay_config_uses_explicit_mu_and_sigma() {
        let mut cfg = AppConfig::default();
        cfg.delays.click_max_ms = 100;
        cfg.delays.mu = Some(30.0);
        cfg.delays.sigma = Some(7.5);

        let delay = cfg.delay_config();

        assert_eq!((delay.mu, delay.sigma), (30.0, 7.5));
    }

    #[test]
    fn test_engine_settings_carry_log_path_and_policy() {
        let mut cfg = AppConfig::default();
        cfg.engine.shutdown_policy = ShutdownPolicy::Discard;
        cfg.engine.seed = Some(9);
        cfg.io.event_log = None;

        let settings = cfg.engine_settings();

        assert_eq!(settings.shutdown_policy, ShutdownPolicy::Discard);
        assert_eq!(settings.seed, Some(9));
        assert!(settings.log_path.is_none());
        assert_eq!(cfg.shutdown_deadline(), Duration::from_secs(1));
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.delays.click_max_ms = 250;
        cfg.delays.mu = Some(120.0);
        cfg.io.device = Some(PathBuf::from("/dev/input/event3"));

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_sections_override_defaults() {
        // Arrange
        let toml_str = r#"
[delays]
click_min_ms = 50
click_max_ms = 150
distribution = "normal"

[engine]
shutdown_policy = "discard"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.delays.click_min_ms, 50);
        assert_eq!(cfg.delays.distribution, Distribution::Normal);
        assert_eq!(cfg.engine.shutdown_policy, ShutdownPolicy::Discard);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.engine.shutdown_deadline_ms, 1_000);
    }

    #[test]
    fn test_deserialize_unknown_distribution_is_a_parse_error() {
        let result: Result<AppConfig, toml::de::Error> =
            toml::from_str("[delays]\ndistribution = \"poisson\"\n");
        assert!(result.is_err());
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config(&path).expect("absent file is not an error");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_returns_same_config() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("latency-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.delays.move_max_ms = 15;
        cfg.io.control_socket = Some(PathBuf::from("/tmp/latency.sock"));

        // Act
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_event_log_none_disables_persistence_and_round_trips() {
        // Arrange
        let cfg: AppConfig = toml::from_str("[io]\nevent_log = \"none\"\n").expect("deserialize");

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize again");

        // Assert
        assert!(cfg.io.event_log.is_none());
        assert!(cfg.engine_settings().log_path.is_none());
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_event_log_path_is_kept() {
        let cfg: AppConfig = toml::from_str("[io]\nevent_log = \"/var/log/delays.csv\"\n").expect("deserialize");
        assert_eq!(cfg.io.event_log, Some(PathBuf::from("/var/log/delays.csv")));
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("latency-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_file(&path);
    }
}
