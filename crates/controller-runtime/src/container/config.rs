//! # Controller Configuration
//!
//! Unified configuration for the tunnel interface, logging and the module
//! runtime.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. TOML file at `$IPOP_CONFIG` (default `./controller.toml`); a missing
//!    file is not an error
//! 3. Environment overrides: `IPOP_CTRL_RECV_PORT`, `IPOP_CTRL_SEND_PORT`,
//!    `IPOP_LOG_LEVEL`, `IPOP_PREFER_IPV6`

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tincan_interface::{EngineLogging, TincanConfig};
use tracing::info;

/// Variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "IPOP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./controller.toml";

/// Log levels understood by both the controller and the tunnel engine.
pub const LOG_LEVELS: [&str; 6] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "NONE"];

/// Complete controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Control channel and overlay settings.
    pub tincan: TincanConfig,
    /// Controller and engine logging.
    pub logger: LoggerConfig,
    /// Module runtime tuning.
    pub runtime: RuntimeConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ControllerConfig {
    /// Load from the configured file, apply environment overrides and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is unreadable or malformed, an
    /// override does not parse, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_file(&path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Read a TOML file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` for a value that does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("IPOP_CTRL_RECV_PORT") {
            self.tincan.ctrl_recv_port = parse_port("IPOP_CTRL_RECV_PORT", value)?;
        }
        if let Some(value) = lookup("IPOP_CTRL_SEND_PORT") {
            self.tincan.ctrl_send_port = parse_port("IPOP_CTRL_SEND_PORT", value)?;
        }
        if let Some(value) = lookup("IPOP_LOG_LEVEL") {
            self.logger.level = value.trim().to_ascii_uppercase();
        }
        if let Some(value) = lookup("IPOP_PREFER_IPV6") {
            self.tincan.prefer_ipv6 = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "IPOP_PREFER_IPV6",
                        value,
                    })
                }
            };
        }
        Ok(())
    }

    /// Check the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let tincan = &self.tincan;

        if tincan.ctrl_recv_port == 0 || tincan.ctrl_send_port == 0 {
            errors.push("control ports must be non-zero".to_string());
        }
        if tincan.ctrl_recv_port == tincan.ctrl_send_port {
            errors.push(format!(
                "ctrl_recv_port and ctrl_send_port are both {}",
                tincan.ctrl_recv_port
            ));
        }
        if !(1..=65535).contains(&tincan.buf_size) {
            errors.push(format!("buf_size {} outside 1..=65535", tincan.buf_size));
        }
        if !tincan.vnets.is_empty() && tincan.stun.is_empty() {
            errors.push("at least one STUN address is required when vnets are configured".into());
        }

        let mut taps = HashSet::new();
        for vnet in &tincan.vnets {
            if !taps.insert(vnet.tap_name.as_str()) {
                errors.push(format!("duplicate tap name {}", vnet.tap_name));
            }
            if vnet.ip4_prefix_len > 32 {
                errors.push(format!(
                    "{}: prefix length {} exceeds 32",
                    vnet.tap_name, vnet.ip4_prefix_len
                ));
            }
            if vnet.ip4.parse::<Ipv4Addr>().is_err() {
                errors.push(format!("{}: ip4 {:?} is not IPv4", vnet.tap_name, vnet.ip4));
            }
        }

        if !LOG_LEVELS.contains(&self.logger.level.as_str()) {
            errors.push(format!("unknown log level {}", self.logger.level));
        }
        if self.runtime.inbox_capacity == 0 {
            errors.push("inbox_capacity must be at least 1".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

/// Logging configuration shared by the controller and the tunnel engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// One of `LOG_LEVELS`.
    pub level: String,
    /// `Console`, `File` or `All`.
    pub device: String,
    pub directory: String,
    pub controller_file_name: String,
    pub tincan_file_name: String,
    pub max_archives: u32,
    /// Bytes.
    pub max_file_size: u64,
    pub console_level: String,
    /// Emit controller logs as JSON lines.
    pub json_logs: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
            device: "File".into(),
            directory: "./logs/".into(),
            controller_file_name: "ctrl.log".into(),
            tincan_file_name: "tincan_log".into(),
            max_archives: 5,
            max_file_size: 1_000_000,
            console_level: "NONE".into(),
            json_logs: false,
        }
    }
}

impl LoggerConfig {
    /// Parameters forwarded to the engine's `ConfigureLogging` request.
    #[must_use]
    pub fn engine_logging(&self) -> EngineLogging {
        EngineLogging {
            level: self.level.clone(),
            device: self.device.clone(),
            directory: self.directory.clone(),
            filename: self.tincan_file_name.clone(),
            max_archives: self.max_archives,
            max_file_size: self.max_file_size,
            console_level: self.console_level.clone(),
        }
    }

    /// `tracing` filter directive equivalent to `level`.
    #[must_use]
    pub fn filter_directive(&self) -> &'static str {
        match self.level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            "NONE" => "off",
            _ => "info",
        }
    }
}

/// Module runtime tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// CBTs buffered per module inbox.
    pub inbox_capacity: usize,
    /// How long stopped module tasks get to finish before being aborted.
    pub shutdown_grace_ms: u64,
    /// Period of each module's timer hook. Disabled when unset.
    pub timer_interval_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: cbt_bus::DEFAULT_INBOX_CAPACITY,
            shutdown_grace_ms: 2_000,
            timer_interval_ms: None,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    #[must_use]
    pub fn timer_interval(&self) -> Option<Duration> {
        self.timer_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tincan_interface::VnetConfig;

    fn vnet(tap: &str, ip4: &str, prefix: u8) -> VnetConfig {
        VnetConfig {
            tap_name: tap.into(),
            description: String::new(),
            ip4: ip4.into(),
            ip4_prefix_len: prefix,
            mtu4: None,
            ip_mapping_enabled: None,
            ignored_net_interfaces: None,
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.inbox_capacity, 1000);
        assert_eq!(config.logger.filter_directive(), "info");
    }

    #[test]
    fn test_parse_toml() {
        let config = ControllerConfig::from_toml(
            r#"
            [tincan]
            ctrl_recv_port = 6801
            prefer_ipv6 = false
            stun = ["stun.l.google.com:19302"]

            [[tincan.vnets]]
            tap_name = "ipop_tap0"
            ip4 = "10.254.0.1"
            ip4_prefix_len = 16
            ignored_net_interfaces = ["eth1"]

            [logger]
            level = "DEBUG"
            json_logs = true

            [runtime]
            timer_interval_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.tincan.ctrl_recv_port, 6801);
        assert_eq!(config.tincan.ctrl_send_port, 5800);
        assert!(!config.tincan.prefer_ipv6);
        assert_eq!(config.tincan.vnets[0].local_uid(), "c31dcee6fe");
        assert_eq!(config.logger.filter_directive(), "debug");
        assert!(config.logger.json_logs);
        assert_eq!(config.runtime.timer_interval(), Some(Duration::from_millis(500)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = ControllerConfig::from_toml(include_str!("../../controller.toml")).unwrap();
        assert_eq!(config.tincan.vnets.len(), 1);
        assert_eq!(config.tincan.vnets[0].mtu4, Some(1200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config =
            ControllerConfig::from_file(Path::new("/nonexistent/overlay/controller.toml")).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ControllerConfig::default();
        config
            .apply_env(env(&[
                ("IPOP_CTRL_RECV_PORT", "7801"),
                ("IPOP_CTRL_SEND_PORT", "7800"),
                ("IPOP_LOG_LEVEL", "warning"),
                ("IPOP_PREFER_IPV6", "false"),
            ]))
            .unwrap();

        assert_eq!(config.tincan.ctrl_recv_port, 7801);
        assert_eq!(config.tincan.ctrl_send_port, 7800);
        assert_eq!(config.logger.level, "WARNING");
        assert_eq!(config.logger.filter_directive(), "warn");
        assert!(!config.tincan.prefer_ipv6);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = ControllerConfig::default();
        let result = config.apply_env(env(&[("IPOP_CTRL_RECV_PORT", "not-a-port")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                var: "IPOP_CTRL_RECV_PORT",
                ..
            })
        ));

        let result = config.apply_env(env(&[("IPOP_PREFER_IPV6", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = ControllerConfig::default();
        config.tincan.ctrl_send_port = config.tincan.ctrl_recv_port;
        config.tincan.buf_size = 70_000;
        config.tincan.vnets = vec![
            vnet("ipop_tap0", "10.254.0.1", 16),
            vnet("ipop_tap0", "not-an-ip", 40),
        ];
        config.logger.level = "VERBOSE".into();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("both")));
        assert!(errors.iter().any(|e| e.contains("buf_size")));
        assert!(errors.iter().any(|e| e.contains("STUN")));
        assert!(errors.iter().any(|e| e.contains("duplicate tap name")));
        assert!(errors.iter().any(|e| e.contains("prefix length")));
        assert!(errors.iter().any(|e| e.contains("not IPv4")));
        assert!(errors.iter().any(|e| e.contains("log level")));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = ControllerConfig::default();
        config.tincan.ctrl_recv_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_logging_uses_tincan_file_name() {
        let logger = LoggerConfig {
            tincan_file_name: "engine.log".into(),
            ..LoggerConfig::default()
        };
        let engine = logger.engine_logging();
        assert_eq!(engine.filename, "engine.log");
        assert_eq!(engine.level, "INFO");
        assert_eq!(engine.console_level, "NONE");
    }

    #[test]
    fn test_level_mapping() {
        for (level, directive) in [
            ("DEBUG", "debug"),
            ("INFO", "info"),
            ("WARNING", "warn"),
            ("ERROR", "error"),
            ("CRITICAL", "error"),
            ("NONE", "off"),
        ] {
            let logger = LoggerConfig {
                level: level.into(),
                ..LoggerConfig::default()
            };
            assert_eq!(logger.filter_directive(), directive, "{level}");
        }
    }
}
