//! Configuration module for serial_binding.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_BINDING_CONFIG` environment variable (explicit path)
//! 2. `./serial-binding.toml` (current directory)
//! 3. `serial-binding.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_BINDING_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_BINDING_BINDING_DRIVER=mock`
//! - `SERIAL_BINDING_SERIAL_DEFAULT_BAUD=9600`
//! - `SERIAL_BINDING_LOGGING_LEVEL=serial_binding=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_binding::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Driver: {}", config.binding.driver);
//! println!("Default baud: {}", config.serial.default_baud);
//! # Ok::<(), serial_binding::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{BindingConfig, Config, LogFormat, LoggingConfig, MockConfig, SerialConfig};
