//! Errors raised while loading, checking and saving configuration.

use crate::port::BindingError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A setting no driver can use.
    #[error("{key}: {message}")]
    Invalid { key: String, message: String },

    /// A setting rejected by the port layer, e.g. a zero baud rate or an
    /// empty alias target.
    #[error("{key}: {source}")]
    Port {
        key: String,
        #[source]
        source: BindingError,
    },

    /// `SERIAL_BINDING_*` override that does not parse.
    #[error("{var}: {message}")]
    Env { var: String, message: String },

    /// `save` on a loader that never read a file.
    #[error("No config file to save to; use save_to")]
    NoPath,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn port(key: impl Into<String>, source: BindingError) -> Self {
        Self::Port {
            key: key.into(),
            source,
        }
    }

    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }

    /// The config key or environment variable the error is about.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Invalid { key, .. } | Self::Port { key, .. } => Some(key.as_str()),
            Self::Env { var, .. } => Some(var.as_str()),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_keeps_binding_source() {
        let err = ConfigError::port("serial.default_baud", BindingError::invalid_argument("zero"));
        assert_eq!(err.key(), Some("serial.default_baud"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source, Some(BindingError::invalid_argument("zero").to_string()));
    }

    #[test]
    fn test_file_errors_have_no_key() {
        assert_eq!(ConfigError::NoPath.key(), None);
        let err = ConfigError::env("SERIAL_BINDING_SERIAL_LOCK", "Expected a boolean");
        assert_eq!(err.key(), Some("SERIAL_BINDING_SERIAL_LOCK"));
        assert_eq!(err.to_string(), "SERIAL_BINDING_SERIAL_LOCK: Expected a boolean");
    }
}
