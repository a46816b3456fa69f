//! Native driver built on the `serialport` crate.
//!
//! `serialport` calls block, so every operation runs on Tokio's blocking pool
//! with the port behind an `Arc<Mutex<..>>`.

use super::contract;
use super::disconnect::{BindingOptions, DisconnectCallback};
use super::error::{BindingError, BindingResult};
use super::traits::{PortBinding, PortEnumerator};
use super::types::{
    ControlFlags, ModemStatus, OpenOptions, PortInfo, PortList, PortPath, UpdateOptions,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Tunables for native ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSettings {
    /// How long a read waits for data before resolving with zero bytes.
    pub read_timeout: Duration,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Binding over an OS serial device.
pub struct NativeBinding {
    disconnect: DisconnectCallback,
    settings: NativeSettings,
    port: Option<SharedPort>,
    path: Option<PortPath>,
    /// RTS is owned by the driver when hardware flow control is on.
    rtscts: bool,
    /// Lower the output lines when the port is closed.
    hupcl: bool,
}

impl NativeBinding {
    /// Create a closed binding with default settings.
    pub fn new(options: BindingOptions) -> BindingResult<Self> {
        Self::with_settings(options, NativeSettings::default())
    }

    pub fn with_settings(options: BindingOptions, settings: NativeSettings) -> BindingResult<Self> {
        Ok(Self {
            disconnect: options.validate()?,
            settings,
            port: None,
            path: None,
            rtscts: false,
            hupcl: true,
        })
    }

    /// Path of the open port.
    pub fn path(&self) -> Option<&PortPath> {
        self.path.as_ref()
    }

    fn shared(&self) -> BindingResult<SharedPort> {
        contract::ensure_open(self.is_open())?;
        self.port.clone().ok_or(BindingError::NotOpen)
    }

    /// Turn a disconnect-shaped failure into a driver-initiated close.
    fn settle<T>(&mut self, result: BindingResult<T>) -> BindingResult<T> {
        match result {
            Err(err) if is_disconnect_error(&err) => {
                tracing::debug!(error = %err, "Treating I/O failure as disconnect");
                Err(self.lost())
            }
            other => other,
        }
    }

    fn lost(&mut self) -> BindingError {
        self.port = None;
        let path = self.path.take();
        tracing::warn!(port = ?path, "Serial port disconnected");
        self.disconnect.invoke();
        BindingError::Disconnected
    }
}

impl std::fmt::Debug for NativeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBinding")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .field("is_open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl PortBinding for NativeBinding {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn open(&mut self, path: PortPath, options: OpenOptions) -> BindingResult<()> {
        contract::ensure_closed(self.is_open())?;

        let name = path.as_str().to_string();
        let settings = self.settings;
        let requested = options.clone();
        let port = tokio::task::spawn_blocking(move || open_port(&name, &requested, settings))
            .await
            .map_err(join_error)??;

        tracing::info!(port = %path, baud_rate = %options.baud_rate, "Opened serial port");
        self.port = Some(Arc::new(Mutex::new(port)));
        self.path = Some(path);
        self.rtscts = options.rtscts;
        self.hupcl = options.hupcl;
        Ok(())
    }

    async fn close(&mut self) -> BindingResult<()> {
        contract::ensure_open(self.is_open())?;
        if let Some(port) = self.port.take() {
            let (hupcl, rtscts) = (self.hupcl, self.rtscts);
            tokio::task::spawn_blocking(move || {
                if hupcl {
                    hang_up(&mut **port.lock(), rtscts);
                }
                drop(port);
            })
            .await
            .map_err(join_error)?;
        }
        if let Some(path) = self.path.take() {
            tracing::info!(port = %path, "Closed serial port");
        }
        Ok(())
    }

    async fn read(
        &mut self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> BindingResult<usize> {
        contract::check_read(self.is_open(), buffer.len(), offset, length)?;
        let port = self.shared()?;
        if length == 0 {
            return Ok(0);
        }

        let result = run_blocking(&port, move |port| {
            let mut chunk = vec![0u8; length];
            match port.read(&mut chunk) {
                Ok(n) => {
                    chunk.truncate(n);
                    Ok(chunk)
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
                Err(e) => Err(BindingError::Io(e)),
            }
        })
        .await;
        let chunk = self.settle(result)?;

        buffer[offset..offset + chunk.len()].copy_from_slice(&chunk);
        tracing::trace!(bytes = chunk.len(), "Serial read");
        Ok(chunk.len())
    }

    async fn write(&mut self, buffer: &[u8]) -> BindingResult<()> {
        let port = self.shared()?;
        let data = buffer.to_vec();
        let result = run_blocking(&port, move |port| {
            port.write_all(&data).map_err(BindingError::Io)
        })
        .await;
        self.settle(result)?;
        tracing::trace!(bytes = buffer.len(), "Serial write");
        Ok(())
    }

    async fn update(&mut self, options: UpdateOptions) -> BindingResult<()> {
        let port = self.shared()?;
        let rate = options.baud_rate.get();
        let result = run_blocking(&port, move |port| {
            port.set_baud_rate(rate).map_err(|e| match e.kind() {
                serialport::ErrorKind::InvalidInput => {
                    BindingError::operation_failed(format!("Unsupported baud rate {rate}: {e}"))
                }
                _ => BindingError::Serial(e),
            })
        })
        .await;
        self.settle(result)?;
        tracing::debug!(baud_rate = rate, "Updated serial port");
        Ok(())
    }

    async fn set(&mut self, flags: ControlFlags) -> BindingResult<()> {
        let port = self.shared()?;
        let rtscts = self.rtscts;
        let result = run_blocking(&port, move |port| apply_flags(port, flags, rtscts)).await;
        self.settle(result)
    }

    async fn get(&mut self) -> BindingResult<ModemStatus> {
        let port = self.shared()?;
        let result = run_blocking(&port, |port| {
            Ok(ModemStatus {
                cts: port.read_clear_to_send()?,
                dsr: port.read_data_set_ready()?,
                dcd: port.read_carrier_detect()?,
            })
        })
        .await;
        self.settle(result)
    }

    async fn flush(&mut self) -> BindingResult<()> {
        let port = self.shared()?;
        let result = run_blocking(&port, |port| {
            port.clear(serialport::ClearBuffer::All)
                .map_err(BindingError::Serial)
        })
        .await;
        self.settle(result)
    }

    async fn drain(&mut self) -> BindingResult<()> {
        let port = self.shared()?;
        let result = run_blocking(&port, |port| {
            Write::flush(port).map_err(BindingError::Io)
        })
        .await;
        self.settle(result)
    }
}

/// Enumerates OS serial devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEnumerator;

#[async_trait]
impl PortEnumerator for NativeEnumerator {
    async fn list(&self) -> BindingResult<PortList> {
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(join_error)?
            .map_err(|e| BindingError::operation_failed(format!("Failed to list ports: {e}")))?;
        tracing::debug!(count = ports.len(), "Enumerated serial ports");
        Ok(PortList::new(ports.into_iter().filter_map(port_info)))
    }
}

fn port_info(port: serialport::SerialPortInfo) -> Option<PortInfo> {
    let mut info = PortInfo::new(PortPath::new(port.port_name).ok()?);
    if let serialport::SerialPortType::UsbPort(usb) = port.port_type {
        info.vendor_id = Some(format!("{:04x}", usb.vid));
        info.product_id = Some(format!("{:04x}", usb.pid));
        info.manufacturer = usb.manufacturer;
        info.serial_number = usb.serial_number;
    }
    Some(info)
}

async fn run_blocking<T, F>(port: &SharedPort, op: F) -> BindingResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn SerialPort) -> BindingResult<T> + Send + 'static,
{
    let port = Arc::clone(port);
    tokio::task::spawn_blocking(move || {
        let mut guard = port.lock();
        op(&mut **guard)
    })
    .await
    .map_err(join_error)?
}

fn join_error(err: tokio::task::JoinError) -> BindingError {
    BindingError::operation_failed(format!("Blocking serial task failed: {err}"))
}

fn open_port(
    name: &str,
    options: &OpenOptions,
    settings: NativeSettings,
) -> BindingResult<Box<dyn SerialPort>> {
    let builder = serialport::new(name, options.baud_rate.get())
        .data_bits(options.data_bits.into())
        .parity(options.parity.into())
        .stop_bits(options.stop_bits.into())
        .flow_control(options.flow_control().into())
        .timeout(settings.read_timeout);

    let mut port = open_builder(builder, name, options)?;
    apply_flags(port.as_mut(), options.flags, options.rtscts)?;
    Ok(port)
}

#[cfg(unix)]
fn open_builder(
    builder: serialport::SerialPortBuilder,
    name: &str,
    options: &OpenOptions,
) -> BindingResult<Box<dyn SerialPort>> {
    let mut port = builder.open_native().map_err(|e| open_error(name, e))?;
    port.set_exclusive(options.lock)?;
    Ok(Box::new(port))
}

// COM ports are always opened exclusively on Windows.
#[cfg(not(unix))]
fn open_builder(
    builder: serialport::SerialPortBuilder,
    name: &str,
    _options: &OpenOptions,
) -> BindingResult<Box<dyn SerialPort>> {
    builder.open().map_err(|e| open_error(name, e))
}

/// Drop DTR (and RTS unless flow control owns it) before the port closes.
/// The device may already be gone, so failures are only logged.
fn hang_up(port: &mut dyn SerialPort, rtscts: bool) {
    if let Err(err) = port.write_data_terminal_ready(false) {
        tracing::debug!(error = %err, "Failed to lower DTR on close");
    }
    if !rtscts {
        if let Err(err) = port.write_request_to_send(false) {
            tracing::debug!(error = %err, "Failed to lower RTS on close");
        }
    }
}

fn open_error(name: &str, err: serialport::Error) -> BindingError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => {
            BindingError::operation_failed(format!("Serial port not found: {name}"))
        }
        serialport::ErrorKind::InvalidInput => BindingError::operation_failed(err.to_string()),
        _ => BindingError::Serial(err),
    }
}

/// Drive the output lines. CTS and DSR are inputs and are left alone.
fn apply_flags(port: &mut dyn SerialPort, flags: ControlFlags, rtscts: bool) -> BindingResult<()> {
    if flags.brk {
        port.set_break()?;
    } else {
        port.clear_break()?;
    }
    port.write_data_terminal_ready(flags.dtr)?;
    if !rtscts {
        port.write_request_to_send(flags.rts)?;
    }
    Ok(())
}

fn is_disconnect_error(err: &BindingError) -> bool {
    match err {
        BindingError::Io(e) => is_disconnect_io(e),
        BindingError::Serial(e) => match e.kind() {
            serialport::ErrorKind::NoDevice => true,
            serialport::ErrorKind::Io(kind) => is_disconnect_kind(kind),
            _ => false,
        },
        _ => false,
    }
}

fn is_disconnect_io(err: &std::io::Error) -> bool {
    is_disconnect_kind(err.kind()) || err.raw_os_error().is_some_and(is_disconnect_code)
}

fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(unix)]
fn is_disconnect_code(code: i32) -> bool {
    matches!(code, libc::EIO | libc::ENXIO | libc::ENODEV)
}

#[cfg(windows)]
fn is_disconnect_code(code: i32) -> bool {
    use winapi::shared::winerror::{
        ERROR_ACCESS_DENIED, ERROR_BAD_COMMAND, ERROR_DEVICE_NOT_CONNECTED, ERROR_GEN_FAILURE,
        ERROR_OPERATION_ABORTED,
    };
    matches!(
        code as u32,
        ERROR_ACCESS_DENIED
            | ERROR_BAD_COMMAND
            | ERROR_DEVICE_NOT_CONNECTED
            | ERROR_GEN_FAILURE
            | ERROR_OPERATION_ABORTED
    )
}

#[cfg(not(any(unix, windows)))]
fn is_disconnect_code(_code: i32) -> bool {
    false
}
