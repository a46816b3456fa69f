//! Service layer owning a single port binding.
//!
//! `PortService` is the façade applications talk to. It owns the disconnect
//! handler, hands the binding a weak reference to it, and serializes every
//! operation through one lock so the binding only ever sees one caller.
//!
//! # Architecture
//!
//! ```text
//! caller ──> PortService ──> tokio::Mutex<Box<dyn PortBinding>> ──> driver
//!                 ▲                                                   │
//!                 └──────────── disconnect handler (Weak) ◄───────────┘
//! ```

use crate::config::{Config, SerialConfig};
use crate::driver::{create_binding, create_enumerator};
use crate::port::{
    BindingOptions, BindingResult, ControlFlags, DisconnectFn, MockRegistry, ModemStatus,
    OpenOptions, PortBinding, PortEnumerator, PortInfo, PortPath, UpdateOptions,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Façade over one binding. Clones share the same binding.
#[derive(Clone)]
pub struct PortService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    binding: Mutex<Box<dyn PortBinding>>,
    enumerator: Box<dyn PortEnumerator>,
    serial: SerialConfig,
    /// Keeps the handler alive; the binding only holds a `Weak`.
    _handler: Arc<DisconnectFn>,
    disconnects: Arc<AtomicU64>,
    disconnected: Arc<Notify>,
    /// Bumped on every successful open.
    session: Arc<AtomicU64>,
    /// Session that was live when the last disconnect was reported.
    lost_session: Arc<AtomicU64>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        // Lets a recovery task observe that the service is gone.
        self.disconnected.notify_one();
    }
}

impl PortService {
    /// Create a service around the binding built by `make_binding`.
    pub fn new<F>(make_binding: F, enumerator: Box<dyn PortEnumerator>) -> BindingResult<Self>
    where
        F: FnOnce(BindingOptions) -> BindingResult<Box<dyn PortBinding>>,
    {
        Self::build(make_binding, enumerator, SerialConfig::default())
    }

    /// Create a service using the configured driver and serial defaults.
    ///
    /// `registry` backs the mock driver and is ignored by the native one.
    pub fn from_config(config: &Config, registry: &MockRegistry) -> BindingResult<Self> {
        let kind = config.binding.driver;
        let settings = config.serial.native_settings();
        Self::build(
            |options| create_binding(kind, options, registry, settings),
            create_enumerator(kind, registry),
            config.serial.clone(),
        )
    }

    fn build<F>(
        make_binding: F,
        enumerator: Box<dyn PortEnumerator>,
        serial: SerialConfig,
    ) -> BindingResult<Self>
    where
        F: FnOnce(BindingOptions) -> BindingResult<Box<dyn PortBinding>>,
    {
        let disconnects = Arc::new(AtomicU64::new(0));
        let disconnected = Arc::new(Notify::new());
        let session = Arc::new(AtomicU64::new(0));
        let lost_session = Arc::new(AtomicU64::new(0));

        // Runs inside a binding call, so `session` is the one that was lost.
        let handler: Arc<DisconnectFn> = {
            let disconnects = Arc::clone(&disconnects);
            let disconnected = Arc::clone(&disconnected);
            let session = Arc::clone(&session);
            let lost_session = Arc::clone(&lost_session);
            Arc::new(move || {
                lost_session.store(session.load(Ordering::SeqCst), Ordering::SeqCst);
                disconnects.fetch_add(1, Ordering::SeqCst);
                disconnected.notify_one();
            })
        };
        let binding = make_binding(BindingOptions::with_handler(&handler))?;

        Ok(Self {
            inner: Arc::new(ServiceInner {
                binding: Mutex::new(binding),
                enumerator,
                serial,
                _handler: handler,
                disconnects,
                disconnected,
                session,
                lost_session,
            }),
        })
    }

    /// Snapshot of the ports the driver can open.
    pub async fn list(&self) -> BindingResult<Vec<PortInfo>> {
        Ok(self.inner.enumerator.list().await?.collect())
    }

    /// Resolve a port name through the configured aliases.
    pub fn resolve_path(&self, name: &str) -> BindingResult<PortPath> {
        self.inner.serial.resolve_path(name)
    }

    /// Open options carrying the configured baud rate and lock default.
    pub fn default_options(&self) -> BindingResult<OpenOptions> {
        self.inner.serial.open_options()
    }

    pub async fn is_open(&self) -> bool {
        self.inner.binding.lock().await.is_open()
    }

    /// Open `name` (a path or alias) with `options`.
    pub async fn open(&self, name: &str, options: OpenOptions) -> BindingResult<()> {
        let path = self.resolve_path(name)?;
        let mut binding = self.inner.binding.lock().await;
        binding.open(path, options).await?;
        self.inner.session.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Open `name` with the configured defaults.
    pub async fn open_default(&self, name: &str) -> BindingResult<()> {
        let options = self.default_options()?;
        self.open(name, options).await
    }

    pub async fn close(&self) -> BindingResult<()> {
        self.inner.binding.lock().await.close().await
    }

    pub async fn read(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> BindingResult<usize> {
        self.inner
            .binding
            .lock()
            .await
            .read(buffer, offset, length)
            .await
    }

    pub async fn write(&self, buffer: &[u8]) -> BindingResult<()> {
        self.inner.binding.lock().await.write(buffer).await
    }

    pub async fn update(&self, options: UpdateOptions) -> BindingResult<()> {
        self.inner.binding.lock().await.update(options).await
    }

    pub async fn set(&self, flags: ControlFlags) -> BindingResult<()> {
        self.inner.binding.lock().await.set(flags).await
    }

    pub async fn get(&self) -> BindingResult<ModemStatus> {
        self.inner.binding.lock().await.get().await
    }

    pub async fn flush(&self) -> BindingResult<()> {
        self.inner.binding.lock().await.flush().await
    }

    pub async fn drain(&self) -> BindingResult<()> {
        self.inner.binding.lock().await.drain().await
    }

    /// Number of disconnects the binding has reported.
    pub fn disconnect_count(&self) -> u64 {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    /// Close the binding after a disconnect. Errors are expected here, the
    /// driver usually closed itself already, and are only logged.
    pub async fn recover_from_disconnect(&self) {
        let mut binding = self.inner.binding.lock().await;
        close_after_disconnect(&mut **binding).await;
    }

    /// Like [`recover_from_disconnect`], but leaves alone a session opened
    /// after the disconnect was reported.
    ///
    /// [`recover_from_disconnect`]: Self::recover_from_disconnect
    async fn recover_lost_session(&self) {
        let mut binding = self.inner.binding.lock().await;
        let current = self.inner.session.load(Ordering::SeqCst);
        let lost = self.inner.lost_session.load(Ordering::SeqCst);
        if current != lost {
            tracing::debug!(current, lost, "Port reopened since disconnect, keeping it");
            return;
        }
        close_after_disconnect(&mut **binding).await;
    }

    /// Spawn a task that closes the disconnected session after every
    /// disconnect. A port reopened in the meantime is kept open. The task
    /// ends once every clone of the service is dropped.
    pub fn spawn_recovery(&self) -> JoinHandle<()> {
        let disconnected = Arc::clone(&self.inner.disconnected);
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                disconnected.notified().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                PortService { inner }.recover_lost_session().await;
            }
            tracing::debug!("Disconnect recovery task finished");
        })
    }
}

async fn close_after_disconnect(binding: &mut dyn PortBinding) {
    match binding.close().await {
        Ok(()) => tracing::info!("Closed port after disconnect"),
        Err(err) => tracing::debug!(error = %err, "Ignoring close error after disconnect"),
    }
}

impl std::fmt::Debug for PortService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortService")
            .field("disconnects", &self.disconnect_count())
            .finish_non_exhaustive()
    }
}

// ========== Tests ==========
