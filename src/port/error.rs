//! Binding error types.
//!
//! Every driver reports failures through `BindingError`. Callers that only care
//! about the category of a failure use [`BindingError::kind`].

use thiserror::Error;

/// Errors reported by a [`PortBinding`](super::PortBinding).
#[derive(Debug, Error)]
pub enum BindingError {
    /// The caller violated a type or shape precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation requires an open port.
    #[error("Port is not open")]
    NotOpen,

    /// `open` was requested on a port that is already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// `offset + length` exceeds the capacity of the read buffer.
    #[error("Buffer is too small: offset {offset} + length {length} exceeds capacity {capacity}")]
    BufferTooSmall {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    /// The driver or the OS rejected the operation.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The connection was lost while the operation was in flight.
    ///
    /// The disconnect callback has already been invoked when this is returned.
    #[error("Port was disconnected")]
    Disconnected,

    /// An I/O error occurred while talking to the device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Coarse failure categories shared by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Programming error in the caller, reported before any I/O.
    InvalidArgument,
    /// The binding is closed.
    NotOpen,
    /// The binding is already open.
    AlreadyOpen,
    /// Driver or OS level failure.
    OperationFailed,
    /// Out-of-band disconnection; the owner recovers through the callback.
    Disconnected,
}

impl BindingError {
    /// Create an InvalidArgument error from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an OperationFailed error from a message.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }

    /// The taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotOpen => ErrorKind::NotOpen,
            Self::AlreadyOpen => ErrorKind::AlreadyOpen,
            Self::Disconnected => ErrorKind::Disconnected,
            Self::BufferTooSmall { .. }
            | Self::OperationFailed(_)
            | Self::Io(_)
            | Self::Serial(_) => ErrorKind::OperationFailed,
        }
    }
}

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
