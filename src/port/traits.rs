//! Core traits for serial port bindings.
//!
//! `PortBinding` is the surface every driver implements so that native and
//! virtual ports can be used interchangeably. Enumeration lives in a separate
//! `PortEnumerator` trait since it does not belong to any one open port.

use super::error::BindingResult;
use super::types::{ControlFlags, ModemStatus, OpenOptions, PortList, PortPath, UpdateOptions};
use async_trait::async_trait;

/// Lifecycle and I/O surface of one serial port.
///
/// A binding starts closed. Every I/O method, `close` included, fails with
/// `BindingError::NotOpen` while closed; `open` fails with
/// `BindingError::AlreadyOpen` while open. Operations are issued one at a time
/// by the owner, which `&mut self` enforces.
///
/// When a driver detects that the connection was lost it closes itself,
/// invokes its disconnect callback and resolves the operation in flight with
/// `BindingError::Disconnected`.
#[async_trait]
pub trait PortBinding: Send + std::fmt::Debug {
    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Open `path` and apply `options`, including the initial control flags.
    async fn open(&mut self, path: PortPath, options: OpenOptions) -> BindingResult<()>;

    /// Release the underlying handle.
    async fn close(&mut self) -> BindingResult<()>;

    /// Read up to `length` bytes into `buffer[offset..offset + length]`.
    ///
    /// Returns the number of bytes read. Fewer than `length` bytes, zero
    /// included, is a normal outcome: drivers never promise full reads.
    /// Reports `BufferTooSmall` without touching `buffer` when
    /// `offset + length` exceeds its length.
    async fn read(&mut self, buffer: &mut [u8], offset: usize, length: usize)
        -> BindingResult<usize>;

    /// Hand `buffer` to the driver. Resolves once the data is accepted for
    /// transmission; use `drain` to wait until it has been sent.
    async fn write(&mut self, buffer: &[u8]) -> BindingResult<()>;

    /// Change the baud rate without closing the port.
    async fn update(&mut self, options: UpdateOptions) -> BindingResult<()>;

    /// Assert all five control lines.
    async fn set(&mut self, flags: ControlFlags) -> BindingResult<()>;

    /// Read the modem status lines.
    async fn get(&mut self) -> BindingResult<ModemStatus>;

    /// Discard unread input and untransmitted output.
    async fn flush(&mut self) -> BindingResult<()>;

    /// Wait until all written data has been transmitted.
    async fn drain(&mut self) -> BindingResult<()>;
}

/// Enumerates the ports a driver can open.
#[async_trait]
pub trait PortEnumerator: Send + Sync {
    /// Take a fresh snapshot of the available ports.
    ///
    /// Finding no ports is not an error and yields an empty list.
    async fn list(&self) -> BindingResult<PortList>;
}

#[async_trait]
impl<B: PortBinding + ?Sized> PortBinding for Box<B> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn open(&mut self, path: PortPath, options: OpenOptions) -> BindingResult<()> {
        (**self).open(path, options).await
    }

    async fn close(&mut self) -> BindingResult<()> {
        (**self).close().await
    }

    async fn read(
        &mut self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> BindingResult<usize> {
        (**self).read(buffer, offset, length).await
    }

    async fn write(&mut self, buffer: &[u8]) -> BindingResult<()> {
        (**self).write(buffer).await
    }

    async fn update(&mut self, options: UpdateOptions) -> BindingResult<()> {
        (**self).update(options).await
    }

    async fn set(&mut self, flags: ControlFlags) -> BindingResult<()> {
        (**self).set(flags).await
    }

    async fn get(&mut self) -> BindingResult<ModemStatus> {
        (**self).get().await
    }

    async fn flush(&mut self) -> BindingResult<()> {
        (**self).flush().await
    }

    async fn drain(&mut self) -> BindingResult<()> {
        (**self).drain().await
    }
}
