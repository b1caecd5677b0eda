//! Service configuration for llrp-fleet.
//!
//! Serialized defaults, then a TOML file, then `LLRP_`-prefixed environment
//! variables (`__` separates nesting levels, e.g.
//! `LLRP_SERVICE__COMMAND_TIMEOUT_SECS=10`). The result is validated and
//! translated into `llrp_core::DriverConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use llrp_core::{DeviceAddress, DiscoveryConfig, DriverConfig, LLRP_PORT, RetryPolicy};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub discovery: DiscoverySection,

    #[serde(default)]
    pub logging: LoggingSection,

    /// Readers registered at startup, by device name.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    pub name: String,
    pub command_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub dial_timeout_secs: u64,
    pub async_buffer: usize,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "llrp-fleet".into(),
            command_timeout_secs: 30,
            shutdown_timeout_secs: 1,
            dial_timeout_secs: 30,
            async_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySection {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Unset means retry recoverable failures forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub enabled: bool,
    /// IPv4 CIDR blocks to scan.
    pub subnets: Vec<String>,
    pub port: u16,
    pub probe_timeout_ms: u64,
    pub concurrency: usize,
    /// Delay before the scan that runs at service start.
    pub startup_delay_secs: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: false,
            subnets: Vec::new(),
            port: LLRP_PORT,
            probe_timeout_ms: 1000,
            concurrency: 64,
            startup_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also write logs to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

/// A reader registered by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    LLRP_PORT
}

impl DeviceEntry {
    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.host.clone(), self.port)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "llrp", "llrp-fleet").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("llrp-fleet");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the service config.
///
/// `path` overrides the platform config location. A missing file is not
/// an error; defaults and environment still apply.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(ServiceConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("LLRP_").split("__"));

    let config: ServiceConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &ServiceConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}

// ── Validation and translation ──────────────────────────────────────

impl ServiceConfig {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let service = &self.service;
        if service.command_timeout_secs == 0 {
            return Err(invalid("service.command_timeout_secs", "must be greater than 0"));
        }
        if service.dial_timeout_secs == 0 {
            return Err(invalid("service.dial_timeout_secs", "must be greater than 0"));
        }
        if service.async_buffer == 0 {
            return Err(invalid("service.async_buffer", "must be greater than 0"));
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.initial_delay_ms",
                format!(
                    "{} exceeds retry.max_delay_ms ({})",
                    self.retry.initial_delay_ms, self.retry.max_delay_ms
                ),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(invalid("retry.max_attempts", "must be at least 1 when set"));
        }

        if self.discovery.concurrency == 0 {
            return Err(invalid("discovery.concurrency", "must be greater than 0"));
        }
        for subnet in &self.discovery.subnets {
            llrp_core::discovery::expand_subnet(subnet)
                .map_err(|e| invalid("discovery.subnets", e.to_string()))?;
        }

        for (name, device) in &self.devices {
            if device.host.trim().is_empty() {
                return Err(invalid(format!("devices.{name}.host"), "must not be empty"));
            }
            if device.port == 0 {
                return Err(invalid(format!("devices.{name}.port"), "must not be 0"));
            }
        }
        Ok(())
    }

    /// The runtime settings for `llrp_core::Driver`.
    pub fn to_driver_config(&self) -> DriverConfig {
        DriverConfig {
            command_timeout: Duration::from_secs(self.service.command_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.service.shutdown_timeout_secs),
            dial_timeout: Duration::from_secs(self.service.dial_timeout_secs),
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                max_attempts: self.retry.max_attempts,
            },
            async_buffer: self.service.async_buffer,
            discovery: DiscoveryConfig {
                subnets: self.discovery.subnets.clone(),
                port: self.discovery.port,
                probe_timeout: Duration::from_millis(self.discovery.probe_timeout_ms),
                concurrency: self.discovery.concurrency,
            },
        }
    }
}
