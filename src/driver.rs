//! Driver selection.
//!
//! Picks the binding implementation for a target at runtime and hands it out
//! as a boxed trait object so callers stay driver-agnostic.

use crate::port::{
    BindingError, BindingOptions, BindingResult, MockBinding, MockRegistry, NativeBinding,
    NativeEnumerator, NativeSettings, PortBinding, PortEnumerator,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which binding implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Native where the platform has serial devices, mock elsewhere.
    #[default]
    Auto,
    Native,
    Mock,
}

impl DriverKind {
    /// Resolve `Auto` for the current target.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(any(unix, windows)) => Self::Native,
            Self::Auto => Self::Mock,
            other => other,
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Native => "native",
            Self::Mock => "mock",
        };
        f.write_str(name)
    }
}

impl FromStr for DriverKind {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "mock" => Ok(Self::Mock),
            other => Err(BindingError::invalid_argument(format!(
                "unknown driver '{other}', expected auto, native or mock"
            ))),
        }
    }
}

/// Construct a closed binding of the given kind.
///
/// `registry` backs mock bindings and is ignored otherwise.
pub fn create_binding(
    kind: DriverKind,
    options: BindingOptions,
    registry: &MockRegistry,
    settings: NativeSettings,
) -> BindingResult<Box<dyn PortBinding>> {
    let kind = kind.resolve();
    tracing::debug!(driver = %kind, "Creating port binding");
    match kind {
        DriverKind::Mock => Ok(Box::new(MockBinding::new(registry.clone(), options)?)),
        _ => Ok(Box::new(NativeBinding::with_settings(options, settings)?)),
    }
}

/// Enumerator matching the given kind.
pub fn create_enumerator(kind: DriverKind, registry: &MockRegistry) -> Box<dyn PortEnumerator> {
    match kind.resolve() {
        DriverKind::Mock => Box::new(registry.clone()),
        _ => Box::new(NativeEnumerator),
    }
}
