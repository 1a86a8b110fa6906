//! Daemon configuration.
//!
//! Layered from YAML files and `EDGED_`-prefixed environment variables over
//! built-in defaults. The default paths mirror a conventional
//! `/etc/edged/` layout; every path is overridable.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::discovery::PeerSeed;
use crate::engine::EngineConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for the configuration file path.
pub const CONFIG_ENV_VAR: &str = "EDGED_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EDGED";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EDGED_LOG";

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

/// Main daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform string advertised for this device.
    pub platform: String,
    /// Execution type this device hosts.
    pub execution_type: String,
    /// Persisted device identity file.
    pub identity_file: PathBuf,
    /// Shared cipher secret file.
    pub cipher_key_file: PathBuf,
    /// Directory of application descriptors consumed by the watcher.
    pub app_config_dir: PathBuf,
    /// Port of the internal peer-facing surface.
    pub internal_port: u16,
    /// Base URL under which peers reach this device.
    pub advertise_endpoint: String,
    /// Discovery refresh period in seconds.
    pub refresh_interval_secs: u64,
    /// Scoring refresh period in seconds.
    pub score_interval_secs: u64,
    /// Watcher poll period in seconds.
    pub watch_interval_secs: u64,
    /// Bounded timeout of one peer exchange, in seconds.
    pub request_timeout_secs: u64,
    /// Statically seeded peers.
    pub peers: Vec<PeerSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: "linux".to_string(),
            execution_type: "rpm".to_string(),
            identity_file: PathBuf::from("/etc/edged/deviceID.txt"),
            cipher_key_file: PathBuf::from("/etc/edged/cipher.key"),
            app_config_dir: PathBuf::from("/etc/edged/apps"),
            internal_port: 56001,
            advertise_endpoint: "http://127.0.0.1:56001".to_string(),
            refresh_interval_secs: 15,
            score_interval_secs: 30,
            watch_interval_secs: 10,
            request_timeout_secs: 5,
            peers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overrides earlier:
    /// 1. `config.yaml` in the current directory (if present)
    /// 2. File given by the `path` argument (if provided)
    /// 3. File named by `EDGED_CONFIG` (if set)
    /// 4. Environment variables with the `EDGED` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            advertise_endpoint: self.advertise_endpoint.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            score_interval: Duration::from_secs(self.score_interval_secs),
            watch_interval: Duration::from_secs(self.watch_interval_secs),
        }
    }

    /// Bounded timeout of one peer exchange.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
