//! Configuration system for the `courier` CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// COURIER CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Session configuration.
    pub session: SessionConfig,
    /// Scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Transfer configuration.
    pub transfer: TransferConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address for `serve`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Maximum number of confirmed sessions a server or bridge accepts.
    #[serde(default = "default_session_limit_count")]
    pub session_limit_count: usize,
}

/// Session-level defaults, negotiated into every accepted or initiated
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shared secret verified at handshake.
    #[serde(default = "default_connection_key")]
    pub connection_key: String,
    /// Whether containers are DEFLATE-compressed before encryption.
    #[serde(default)]
    pub compress_mode: bool,
    /// Whether containers are AES-GCM-encrypted after compression.
    #[serde(default)]
    pub encrypt_mode: bool,
    /// Whether this session sends periodic echo probes.
    #[serde(default)]
    pub auto_echo: bool,
    /// Interval between echo probes, in seconds. `0` disables the loop
    /// even if `auto_echo` is set.
    #[serde(default)]
    pub auto_echo_interval_seconds: u16,
}

/// Worker counts for the priority scheduler. `top` is always exactly one
/// worker per session and is not configurable here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Threads servicing the shared high/normal/low pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Bounded queue capacity per priority tier.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Default output directory for received files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, passed to `tracing_subscriber`'s `EnvFilter`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_session_limit_count() -> usize {
    64
}

fn default_connection_key() -> String {
    "courier".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            session_limit_count: default_session_limit_count(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_key: default_connection_key(),
            compress_mode: false,
            encrypt_mode: false,
            auto_echo: false,
            auto_echo_interval_seconds: 0,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default config path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("courier/config.toml")
    }

    /// Load config from the default path, or create a default one if it
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Parse the listen address as a [`SocketAddr`].
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if self.network.session_limit_count == 0 {
            anyhow::bail!("session_limit_count must be at least 1");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.session.connection_key.is_empty() {
            anyhow::bail!("connection_key must not be empty");
        }

        if self.scheduler.worker_count == 0 {
            anyhow::bail!("scheduler worker_count must be at least 1");
        }

        if self.scheduler.queue_capacity == 0 {
            anyhow::bail!("scheduler queue_capacity must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.session.connection_key, "courier");
        assert!(!config.session.encrypt_mode);
        assert_eq!(config.scheduler.worker_count, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "info".to_string();
        config.session.connection_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.network.listen_addr, deserialized.network.listen_addr);
        assert_eq!(config.session.connection_key, deserialized.session.connection_key);
    }
}
