//! Port abstraction layer for serial communication.
//!
//! Provides the `PortBinding` trait plus a native driver over OS devices and
//! a mock driver over in-memory ports for tests.

pub mod contract;
pub mod disconnect;
pub mod error;
pub mod mock;
pub mod native;
pub mod traits;
pub mod types;

pub use disconnect::{BindingOptions, DisconnectCallback, DisconnectFn};
pub use error::{BindingError, BindingResult, ErrorKind};
pub use mock::{MockBinding, MockPortHandle, MockPortOptions, MockRegistry, DEFAULT_MAX_READ_SIZE};
pub use native::{NativeBinding, NativeEnumerator, NativeSettings};
pub use traits::{PortBinding, PortEnumerator};
pub use types::{
    BaudRate, ControlFlags, DataBits, FlowControl, ModemStatus, OpenOptions, Parity, PortInfo,
    PortList, PortPath, StopBits, UpdateOptions,
};
