//! Virtual serial ports for testing.
//!
//! A [`MockRegistry`] plays the role of the host's set of devices: tests create
//! ports in it, drive them through a [`MockPortHandle`], and open them with a
//! [`MockBinding`] exactly as they would a real device.
//!
//! # Example
//! ```
//! use serial_binding::port::{
//!     BindingOptions, DisconnectFn, MockPortOptions, MockRegistry, OpenOptions, PortBinding,
//!     PortPath,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = MockRegistry::new();
//! let path = PortPath::new("/dev/ROBOT").unwrap();
//! let device = registry.create_port(
//!     path.clone(),
//!     MockPortOptions {
//!         echo: true,
//!         record: true,
//!         ..Default::default()
//!     },
//! );
//!
//! let on_disconnect: Arc<DisconnectFn> = Arc::new(|| {});
//! let mut binding = registry
//!     .binding(BindingOptions::with_handler(&on_disconnect))
//!     .unwrap();
//! binding.open(path, OpenOptions::new(9600).unwrap()).await.unwrap();
//!
//! binding.write(b"ping").await.unwrap();
//! let mut buffer = [0u8; 4];
//! let n = binding.read(&mut buffer, 0, 4).await.unwrap();
//! assert_eq!(&buffer[..n], b"ping");
//! assert_eq!(device.recording(), b"ping");
//! # });
//! ```

use super::contract;
use super::disconnect::{BindingOptions, DisconnectCallback};
use super::error::{BindingError, BindingResult};
use super::traits::{PortBinding, PortEnumerator};
use super::types::{
    BaudRate, ControlFlags, ModemStatus, OpenOptions, PortInfo, PortList, PortPath, UpdateOptions,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Default cap on the number of bytes a single read returns.
pub const DEFAULT_MAX_READ_SIZE: usize = 1024;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Behaviour of a virtual port.
#[derive(Debug, Clone)]
pub struct MockPortOptions {
    /// Loop written bytes back into the input queue.
    pub echo: bool,
    /// Append written bytes to the recording.
    pub record: bool,
    /// Bytes queued for reading as soon as the port opens.
    pub ready_data: Option<Vec<u8>>,
    /// Maximum bytes returned by one read.
    pub max_read_size: usize,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    /// Baud rates the virtual device accepts. `None` accepts any rate.
    pub supported_baud_rates: Option<Vec<u32>>,
}

impl Default for MockPortOptions {
    fn default() -> Self {
        Self {
            echo: false,
            record: false,
            ready_data: None,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            manufacturer: None,
            serial_number: None,
            vendor_id: None,
            product_id: None,
            supported_baud_rates: None,
        }
    }
}

impl MockPortOptions {
    fn supports(&self, rate: BaudRate) -> bool {
        self.supported_baud_rates
            .as_ref()
            .map_or(true, |rates| rates.contains(&rate.get()))
    }
}

#[derive(Debug)]
struct MockPortState {
    info: PortInfo,
    options: MockPortOptions,
    /// False once the device has been unplugged.
    present: bool,
    /// Bumped on every replug. Sessions opened under an older value are dead.
    plug: u64,
    /// Bindings holding the port, keyed by binding id, with their `lock` flag.
    holders: BTreeMap<u64, bool>,
    baud_rate: Option<BaudRate>,
    input: VecDeque<u8>,
    recording: Vec<u8>,
    last_write: Option<Vec<u8>>,
    flags: ControlFlags,
    dcd: bool,
    flush_count: usize,
    drain_count: usize,
}

impl MockPortState {
    fn is_locked(&self) -> bool {
        self.holders.values().any(|lock| *lock)
    }

    /// Whether a session opened under `plug` still reaches the device.
    fn reaches(&self, plug: u64) -> bool {
        self.present && self.plug == plug
    }
}

#[derive(Debug)]
struct MockPort {
    state: Mutex<MockPortState>,
    /// Wakes readers when input arrives or the device goes away.
    data_ready: Notify,
}

impl MockPort {
    fn new(path: PortPath, options: MockPortOptions) -> Self {
        let info = PortInfo {
            manufacturer: options.manufacturer.clone(),
            serial_number: options.serial_number.clone(),
            vendor_id: options.vendor_id.clone(),
            product_id: options.product_id.clone(),
            ..PortInfo::new(path)
        };
        Self {
            state: Mutex::new(MockPortState {
                info,
                options,
                present: true,
                plug: 0,
                holders: BTreeMap::new(),
                baud_rate: None,
                input: VecDeque::new(),
                recording: Vec::new(),
                last_write: None,
                flags: ControlFlags::default(),
                dcd: false,
                flush_count: 0,
                drain_count: 0,
            }),
            data_ready: Notify::new(),
        }
    }
}

/// The set of virtual devices visible to mock bindings.
///
/// Clones share the same devices.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    ports: Arc<Mutex<BTreeMap<String, Arc<MockPort>>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device at `path`, replacing any device already there.
    pub fn create_port(&self, path: PortPath, options: MockPortOptions) -> MockPortHandle {
        let port = Arc::new(MockPort::new(path.clone(), options));
        tracing::debug!(port = %path, "Created mock port");
        self.ports
            .lock()
            .insert(path.as_str().to_string(), Arc::clone(&port));
        MockPortHandle { port }
    }

    /// Control handle for the device at `path`.
    pub fn port(&self, path: &str) -> Option<MockPortHandle> {
        self.lookup(path).map(|port| MockPortHandle { port })
    }

    /// Remove every device.
    pub fn reset(&self) {
        self.ports.lock().clear();
    }

    /// A closed binding over this registry.
    pub fn binding(&self, options: BindingOptions) -> BindingResult<MockBinding> {
        MockBinding::new(self.clone(), options)
    }

    fn lookup(&self, path: &str) -> Option<Arc<MockPort>> {
        self.ports.lock().get(path).cloned()
    }
}

#[async_trait]
impl PortEnumerator for MockRegistry {
    async fn list(&self) -> BindingResult<PortList> {
        let ports: Vec<Arc<MockPort>> = self.ports.lock().values().cloned().collect();
        let infos: Vec<PortInfo> = ports
            .iter()
            .filter_map(|port| {
                let state = port.state.lock();
                state.present.then(|| state.info.clone())
            })
            .collect();
        Ok(PortList::new(infos))
    }
}

/// Test-side control over one virtual device.
#[derive(Debug, Clone)]
pub struct MockPortHandle {
    port: Arc<MockPort>,
}

impl MockPortHandle {
    /// Make `data` available to readers.
    pub fn emit_data(&self, data: &[u8]) {
        self.port.state.lock().input.extend(data);
        self.port.data_ready.notify_waiters();
    }

    /// Simulate the device being unplugged.
    ///
    /// A pending read fails at once. An idle binding only notices on its next
    /// operation, which is when its disconnect handler runs.
    pub fn disconnect(&self) {
        self.port.state.lock().present = false;
        self.port.data_ready.notify_waiters();
    }

    /// Plug the device back in. Bindings must reopen it.
    ///
    /// Sessions from before the unplug stay dead: a binding that had not
    /// noticed the unplug reports `Disconnected` on its next operation, and
    /// its claim on the port no longer counts.
    pub fn reconnect(&self) {
        let mut state = self.port.state.lock();
        state.present = true;
        state.plug += 1;
        state.holders.clear();
    }

    /// Drive the carrier-detect line reported by `get`.
    pub fn set_dcd(&self, dcd: bool) {
        self.port.state.lock().dcd = dcd;
    }

    /// All bytes written while `record` is enabled.
    pub fn recording(&self) -> Vec<u8> {
        self.port.state.lock().recording.clone()
    }

    /// The buffer passed to the most recent write.
    pub fn last_write(&self) -> Option<Vec<u8>> {
        self.port.state.lock().last_write.clone()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.port.state.lock().baud_rate.map(BaudRate::get)
    }

    /// Control lines last asserted by a binding.
    pub fn control_flags(&self) -> ControlFlags {
        self.port.state.lock().flags
    }

    /// Whether a binding holds the port with `lock` enabled.
    pub fn is_locked(&self) -> bool {
        self.port.state.lock().is_locked()
    }

    /// Number of bindings holding the port open.
    pub fn holders(&self) -> usize {
        self.port.state.lock().holders.len()
    }

    pub fn is_present(&self) -> bool {
        self.port.state.lock().present
    }

    /// Bytes waiting to be read.
    pub fn pending_input(&self) -> usize {
        self.port.state.lock().input.len()
    }

    pub fn flush_count(&self) -> usize {
        self.port.state.lock().flush_count
    }

    pub fn drain_count(&self) -> usize {
        self.port.state.lock().drain_count
    }
}

enum ReadOutcome {
    Data(usize),
    Lost,
    Wait,
}

/// Binding that talks to a device in a [`MockRegistry`].
#[derive(Debug)]
pub struct MockBinding {
    id: u64,
    registry: MockRegistry,
    disconnect: DisconnectCallback,
    port: Option<Arc<MockPort>>,
    path: Option<PortPath>,
    /// Plug generation the open session belongs to.
    plug: u64,
    hupcl: bool,
}

impl MockBinding {
    /// Create a closed binding.
    ///
    /// Fails with `InvalidArgument` if `options` carries no live disconnect
    /// handler.
    pub fn new(registry: MockRegistry, options: BindingOptions) -> BindingResult<Self> {
        Ok(Self {
            id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            disconnect: options.validate()?,
            port: None,
            path: None,
            plug: 0,
            hupcl: true,
        })
    }

    /// Path of the open port.
    pub fn path(&self) -> Option<&PortPath> {
        self.path.as_ref()
    }

    /// The open port, provided its device is still present.
    fn connected_port(&mut self) -> BindingResult<Arc<MockPort>> {
        contract::ensure_open(self.is_open())?;
        let port = match &self.port {
            Some(port) => Arc::clone(port),
            None => return Err(BindingError::NotOpen),
        };
        let reaches = port.state.lock().reaches(self.plug);
        if reaches {
            Ok(port)
        } else {
            Err(self.lost())
        }
    }

    /// Force-close after the device vanished and notify the owner.
    fn lost(&mut self) -> BindingError {
        if let Some(port) = self.port.take() {
            let mut state = port.state.lock();
            if state.plug == self.plug {
                state.holders.remove(&self.id);
            }
        }
        let path = self.path.take();
        tracing::warn!(port = ?path, "Mock port disconnected");
        self.disconnect.invoke();
        BindingError::Disconnected
    }
}

#[async_trait]
impl PortBinding for MockBinding {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn open(&mut self, path: PortPath, options: OpenOptions) -> BindingResult<()> {
        contract::ensure_closed(self.is_open())?;

        let port = self.registry.lookup(path.as_str()).ok_or_else(|| {
            BindingError::operation_failed(format!(
                "Port does not exist - please call MockRegistry::create_port(\"{path}\") first"
            ))
        })?;

        {
            let mut state = port.state.lock();
            if !state.present {
                return Err(BindingError::operation_failed(format!(
                    "Port {path} is not connected"
                )));
            }
            if state.is_locked() {
                return Err(BindingError::operation_failed("Port is locked cannot open"));
            }
            if !state.options.supports(options.baud_rate) {
                return Err(BindingError::operation_failed(format!(
                    "Unsupported baud rate: {}",
                    options.baud_rate
                )));
            }

            state.baud_rate = Some(options.baud_rate);
            state.flags = options.flags;
            state.input.clear();
            if let Some(ready) = state.options.ready_data.clone() {
                state.input.extend(ready);
            }
            state.holders.insert(self.id, options.lock);
            self.plug = state.plug;
        }

        tracing::info!(port = %path, baud_rate = %options.baud_rate, "Opened mock port");
        self.port = Some(port);
        self.path = Some(path);
        self.hupcl = options.hupcl;
        Ok(())
    }

    async fn close(&mut self) -> BindingResult<()> {
        contract::ensure_open(self.is_open())?;
        if let Some(port) = self.port.take() {
            let mut state = port.state.lock();
            if state.plug == self.plug {
                state.holders.remove(&self.id);
            }
            if self.hupcl && state.reaches(self.plug) {
                state.flags.dtr = false;
                state.flags.rts = false;
            }
        }
        if let Some(path) = self.path.take() {
            tracing::info!(port = %path, "Closed mock port");
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
        let port = self.connected_port()?;
        if length == 0 {
            return Ok(0);
        }

        loop {
            // Registered before inspecting the queue so a concurrent
            // `emit_data` cannot slip between the check and the wait.
            let notified = port.data_ready.notified();

            let outcome = {
                let mut state = port.state.lock();
                if !state.reaches(self.plug) {
                    ReadOutcome::Lost
                } else if state.input.is_empty() {
                    ReadOutcome::Wait
                } else {
                    let count = length
                        .min(state.options.max_read_size.max(1))
                        .min(state.input.len());
                    let target = &mut buffer[offset..offset + count];
                    for (slot, byte) in target.iter_mut().zip(state.input.drain(..count)) {
                        *slot = byte;
                    }
                    ReadOutcome::Data(count)
                }
            };

            match outcome {
                ReadOutcome::Data(count) => {
                    tracing::trace!(bytes = count, "Mock read");
                    return Ok(count);
                }
                ReadOutcome::Lost => return Err(self.lost()),
                ReadOutcome::Wait => notified.await,
            }
        }
    }

    async fn write(&mut self, buffer: &[u8]) -> BindingResult<()> {
        let port = self.connected_port()?;
        let echoed = {
            let mut state = port.state.lock();
            if state.options.record {
                state.recording.extend_from_slice(buffer);
            }
            state.last_write = Some(buffer.to_vec());
            if state.options.echo {
                state.input.extend(buffer);
            }
            state.options.echo
        };
        if echoed {
            port.data_ready.notify_waiters();
        }
        tracing::trace!(bytes = buffer.len(), "Mock write");
        Ok(())
    }

    async fn update(&mut self, options: UpdateOptions) -> BindingResult<()> {
        let port = self.connected_port()?;
        let mut state = port.state.lock();
        if !state.options.supports(options.baud_rate) {
            return Err(BindingError::operation_failed(format!(
                "Unsupported baud rate: {}",
                options.baud_rate
            )));
        }
        state.baud_rate = Some(options.baud_rate);
        tracing::debug!(baud_rate = %options.baud_rate, "Updated mock port");
        Ok(())
    }

    async fn set(&mut self, flags: ControlFlags) -> BindingResult<()> {
        let port = self.connected_port()?;
        port.state.lock().flags = flags;
        Ok(())
    }

    async fn get(&mut self) -> BindingResult<ModemStatus> {
        let port = self.connected_port()?;
        let state = port.state.lock();
        Ok(ModemStatus {
            cts: state.flags.cts,
            dsr: state.flags.dsr,
            dcd: state.dcd,
        })
    }

    async fn flush(&mut self) -> BindingResult<()> {
        let port = self.connected_port()?;
        let mut state = port.state.lock();
        state.input.clear();
        state.flush_count += 1;
        Ok(())
    }

    async fn drain(&mut self) -> BindingResult<()> {
        let port = self.connected_port()?;
        port.state.lock().drain_count += 1;
        Ok(())
    }
}
