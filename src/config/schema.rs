//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it changes.

use super::error::{ConfigError, ConfigResult};
use crate::driver::DriverKind;
use crate::port::{BindingResult, MockPortOptions, NativeSettings, OpenOptions, PortPath};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver selection
    pub binding: BindingConfig,
    /// Serial port defaults
    pub serial: SerialConfig,
    /// Virtual port defaults
    pub mock: MockConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no driver can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.serial
            .open_options()
            .map_err(|e| ConfigError::port("serial.default_baud", e))?;
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "serial.read_timeout_ms",
                "timeout must be greater than zero",
            ));
        }
        if self.mock.max_read_size == 0 {
            return Err(ConfigError::invalid(
                "mock.max_read_size",
                "must be greater than zero",
            ));
        }
        for alias in self.serial.port_aliases.keys() {
            self.serial
                .resolve_path(alias)
                .map_err(|e| ConfigError::port(format!("serial.port_aliases.{alias}"), e))?;
        }
        Ok(())
    }
}

/// Driver selection section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// "auto", "native" or "mock"
    pub driver: DriverKind,
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when the caller does not pick one
    pub default_baud: u32,
    /// How long a native read waits before returning zero bytes
    pub read_timeout_ms: u64,
    /// Request exclusive access on open
    pub lock: bool,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115200,
            read_timeout_ms: 1000,
            lock: true,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Settings for native bindings.
    pub fn native_settings(&self) -> NativeSettings {
        NativeSettings {
            read_timeout: self.read_timeout(),
        }
    }

    /// Resolve a port name through aliases.
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Resolve `name` through aliases into a validated path.
    pub fn resolve_path(&self, name: &str) -> BindingResult<PortPath> {
        PortPath::new(self.resolve_port(name))
    }

    /// Open options carrying the configured baud rate and lock default.
    pub fn open_options(&self) -> BindingResult<OpenOptions> {
        Ok(OpenOptions::new(self.default_baud)?.with_lock(self.lock))
    }
}

/// Virtual port configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Cap on bytes returned by one read
    pub max_read_size: usize,
    /// Loop writes back into the input
    pub echo: bool,
    /// Keep a recording of everything written
    pub record: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        let options = MockPortOptions::default();
        Self {
            max_read_size: options.max_read_size,
            echo: options.echo,
            record: options.record,
        }
    }
}

impl MockConfig {
    /// Port options seeded from this section.
    pub fn port_options(&self) -> MockPortOptions {
        MockPortOptions {
            echo: self.echo,
            record: self.record,
            max_read_size: self.max_read_size,
            ..MockPortOptions::default()
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or
    /// "serial_binding=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}
