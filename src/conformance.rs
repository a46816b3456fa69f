//! Driver conformance checks.
//!
//! Every `PortBinding` implementation must behave identically with respect to
//! lifecycle and argument errors. [`Conformance`] runs those guarantees against
//! any driver and panics with a message naming the guarantee that broke, so it
//! can be dropped straight into a driver's test suite.
//!
//! ```
//! use serial_binding::conformance::Conformance;
//! use serial_binding::port::{MockPortOptions, MockRegistry, OpenOptions, PortPath};
//!
//! # tokio_test::block_on(async {
//! let registry = MockRegistry::new();
//! let path = PortPath::new("/dev/ttyCONF").unwrap();
//! registry.create_port(path.clone(), MockPortOptions::default());
//!
//! Conformance::new(
//!     move |options| registry.binding(options),
//!     path,
//!     OpenOptions::new(9600).unwrap(),
//! )
//! .with_control_roundtrip(true)
//! .run()
//! .await;
//! # });
//! ```

use crate::port::{
    BindingError, BindingOptions, BindingResult, ControlFlags, DisconnectCallback, DisconnectFn,
    ErrorKind, OpenOptions, PortBinding, PortPath, UpdateOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SENTINEL: u8 = 0xA5;

/// Conformance suite for one driver.
pub struct Conformance<F> {
    factory: F,
    path: PortPath,
    options: OpenOptions,
    control_roundtrip: bool,
    disconnects: Arc<AtomicUsize>,
    handler: Arc<DisconnectFn>,
}

impl<F, B> Conformance<F>
where
    F: Fn(BindingOptions) -> BindingResult<B>,
    B: PortBinding,
{
    /// `factory` builds a closed binding; `path` must be openable with
    /// `options` for the lifecycle checks.
    pub fn new(factory: F, path: PortPath, options: OpenOptions) -> Self {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let handler: Arc<DisconnectFn> = {
            let disconnects = Arc::clone(&disconnects);
            Arc::new(move || {
                disconnects.fetch_add(1, Ordering::SeqCst);
            })
        };
        Self {
            factory,
            path,
            options,
            control_roundtrip: false,
            disconnects,
            handler,
        }
    }

    /// Also check that `get` reflects the lines passed to `set`. Only
    /// meaningful for drivers that loop control lines back.
    pub fn with_control_roundtrip(mut self, enabled: bool) -> Self {
        self.control_roundtrip = enabled;
        self
    }

    fn binding(&self) -> B {
        match (self.factory)(BindingOptions::with_handler(&self.handler)) {
            Ok(binding) => binding,
            Err(err) => panic!("construction with a valid disconnect handler failed: {err}"),
        }
    }

    /// Run every enabled check.
    pub async fn run(&self) {
        self.construction();
        self.closed_operations().await;
        self.open_lifecycle().await;
        self.read_bounds().await;
        if self.control_roundtrip {
            self.control_roundtrip().await;
        }
        assert_eq!(
            self.disconnects.load(Ordering::SeqCst),
            0,
            "disconnect handler fired without a disconnect"
        );
    }

    /// Construction needs a live handler and yields a closed binding.
    pub fn construction(&self) {
        let missing = (self.factory)(BindingOptions::default());
        assert_kind(missing.err(), ErrorKind::InvalidArgument, "construction without handler");

        let dropped: Arc<DisconnectFn> = Arc::new(|| {});
        let dangling = BindingOptions::new(DisconnectCallback::new(&dropped));
        drop(dropped);
        let dangling = (self.factory)(dangling);
        assert_kind(dangling.err(), ErrorKind::InvalidArgument, "construction with dropped handler");

        assert!(!self.binding().is_open(), "new binding reports open");
    }

    /// Every operation on a closed binding reports `NotOpen`.
    pub async fn closed_operations(&self) {
        let mut binding = self.binding();
        let mut buffer = [SENTINEL; 8];

        assert_kind(binding.close().await.err(), ErrorKind::NotOpen, "close while closed");
        assert_kind(
            binding.read(&mut buffer, 0, 8).await.err(),
            ErrorKind::NotOpen,
            "read while closed",
        );
        assert_kind(
            binding.write(b"conformance").await.err(),
            ErrorKind::NotOpen,
            "write while closed",
        );
        assert_kind(
            binding.update(update_options(&self.options)).await.err(),
            ErrorKind::NotOpen,
            "update while closed",
        );
        assert_kind(
            binding.set(ControlFlags::default()).await.err(),
            ErrorKind::NotOpen,
            "set while closed",
        );
        assert_kind(binding.get().await.err(), ErrorKind::NotOpen, "get while closed");
        assert_kind(binding.flush().await.err(), ErrorKind::NotOpen, "flush while closed");
        assert_kind(binding.drain().await.err(), ErrorKind::NotOpen, "drain while closed");

        assert!(buffer.iter().all(|&b| b == SENTINEL), "closed read touched the buffer");
        assert!(!binding.is_open(), "failed operations opened the binding");
    }

    /// open, open again, close, close again.
    pub async fn open_lifecycle(&self) {
        let mut binding = self.binding();

        if let Err(err) = binding.open(self.path.clone(), self.options.clone()).await {
            panic!("open {} failed: {err}", self.path);
        }
        assert!(binding.is_open(), "open resolved but binding reports closed");

        assert_kind(
            binding
                .open(self.path.clone(), self.options.clone())
                .await
                .err(),
            ErrorKind::AlreadyOpen,
            "open while open",
        );
        assert!(binding.is_open(), "rejected open closed the existing connection");

        if let Err(err) = binding.close().await {
            panic!("close after open failed: {err}");
        }
        assert!(!binding.is_open(), "close resolved but binding reports open");

        assert_kind(binding.close().await.err(), ErrorKind::NotOpen, "second close");
        assert_kind(
            binding.write(b"conformance").await.err(),
            ErrorKind::NotOpen,
            "write after close",
        );
    }

    /// Out-of-range reads report `BufferTooSmall` and leave the buffer alone,
    /// whether or not the binding is open.
    pub async fn read_bounds(&self) {
        let mut binding = self.binding();
        check_out_of_range_reads(&mut binding, "closed").await;

        if let Err(err) = binding.open(self.path.clone(), self.options.clone()).await {
            panic!("open {} failed: {err}", self.path);
        }
        check_out_of_range_reads(&mut binding, "open").await;

        let mut buffer = [SENTINEL; 4];
        match binding.read(&mut buffer, 4, 0).await {
            Ok(0) => {}
            other => panic!("zero-length read at end of buffer returned {other:?}"),
        }
        assert!(buffer.iter().all(|&b| b == SENTINEL), "zero-length read touched the buffer");

        if let Err(err) = binding.close().await {
            panic!("close after open failed: {err}");
        }
    }

    /// `get` observes CTS and DSR as last passed to `set`.
    pub async fn control_roundtrip(&self) {
        let mut binding = self.binding();
        if let Err(err) = binding.open(self.path.clone(), self.options.clone()).await {
            panic!("open {} failed: {err}", self.path);
        }

        for (cts, dsr) in [(true, false), (false, true), (true, true), (false, false)] {
            let flags = ControlFlags {
                cts,
                dsr,
                ..ControlFlags::default()
            };
            if let Err(err) = binding.set(flags).await {
                panic!("set {flags:?} failed: {err}");
            }
            match binding.get().await {
                Ok(status) => {
                    assert_eq!(status.cts, cts, "get did not observe CTS from set");
                    assert_eq!(status.dsr, dsr, "get did not observe DSR from set");
                }
                Err(err) => panic!("get failed: {err}"),
            }
        }

        if let Err(err) = binding.close().await {
            panic!("close after open failed: {err}");
        }
    }
}

async fn check_out_of_range_reads<B: PortBinding>(binding: &mut B, state: &str) {
    let mut buffer = [SENTINEL; 8];
    for (offset, length) in [(0, 9), (8, 1), (4, 5), (usize::MAX, 1)] {
        let result = binding.read(&mut buffer, offset, length).await;
        assert!(
            matches!(result, Err(BindingError::BufferTooSmall { .. })),
            "read({offset}, {length}) into 8 bytes while {state} returned {result:?}"
        );
    }
    assert!(
        buffer.iter().all(|&b| b == SENTINEL),
        "out-of-range read while {state} touched the buffer"
    );
}

fn update_options(options: &OpenOptions) -> UpdateOptions {
    UpdateOptions {
        baud_rate: options.baud_rate,
    }
}

fn assert_kind(err: Option<BindingError>, expected: ErrorKind, what: &str) {
    match err {
        Some(err) => assert_eq!(err.kind(), expected, "{what}: unexpected error {err}"),
        None => panic!("{what}: succeeded, expected {expected:?}"),
    }
}
