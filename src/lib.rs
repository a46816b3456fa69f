//! Serial Binding Library
//!
//! A driver contract for serial ports: one async `PortBinding` trait with a
//! native driver over OS devices and a mock driver over virtual ports, plus
//! a façade that owns the binding and handles disconnects.
//!
//! # Modules
//!
//! - `port`: The binding trait, its value types, errors and both drivers
//! - `driver`: Runtime driver selection
//! - `service`: `PortService` façade owning a binding
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//! - `conformance`: Reusable driver checks (when the `conformance` feature is enabled)

pub mod config;
pub mod driver;
pub mod logging;
pub mod port;
pub mod service;

#[cfg(feature = "conformance")]
pub mod conformance;

// Re-export commonly used types for convenience
pub use driver::{create_binding, create_enumerator, DriverKind};
pub use port::{
    BaudRate, BindingError, BindingOptions, BindingResult, ControlFlags, DataBits,
    DisconnectCallback, DisconnectFn, ErrorKind, FlowControl, MockBinding, MockPortHandle,
    MockPortOptions, MockRegistry, ModemStatus, NativeBinding, NativeEnumerator, NativeSettings,
    OpenOptions, Parity, PortBinding, PortEnumerator, PortInfo, PortList, PortPath, StopBits,
    UpdateOptions,
};
pub use service::PortService;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
