//! Shared test utilities for serial_binding integration tests.
//!
//! - Mock fixtures with a live disconnect handler
//! - Hardware test configuration from the environment

#![allow(dead_code)]

use serial_binding::port::{
    BindingOptions, DisconnectFn, MockBinding, MockPortHandle, MockPortOptions, MockRegistry,
    PortPath,
};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A registry with one virtual device and a counting disconnect handler.
pub struct MockFixture {
    pub registry: MockRegistry,
    pub path: PortPath,
    pub handle: MockPortHandle,
    pub handler: Arc<DisconnectFn>,
    disconnects: Arc<AtomicUsize>,
}

impl MockFixture {
    pub fn new(path: &str, options: MockPortOptions) -> Self {
        let registry = MockRegistry::new();
        let path = PortPath::new(path).expect("valid test path");
        let handle = registry.create_port(path.clone(), options);

        let disconnects = Arc::new(AtomicUsize::new(0));
        let handler: Arc<DisconnectFn> = {
            let disconnects = Arc::clone(&disconnects);
            Arc::new(move || {
                disconnects.fetch_add(1, Ordering::SeqCst);
            })
        };

        Self {
            registry,
            path,
            handle,
            handler,
            disconnects,
        }
    }

    /// Echoing, recording device.
    pub fn echo(path: &str) -> Self {
        Self::new(
            path,
            MockPortOptions {
                echo: true,
                record: true,
                ..Default::default()
            },
        )
    }

    pub fn binding(&self) -> MockBinding {
        self.registry
            .binding(BindingOptions::with_handler(&self.handler))
            .expect("binding with live handler")
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Test port configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// `TEST_PORT` (required), `TEST_BAUD` (default 9600), `TEST_LOOPBACK=1`.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }
}

/// Skip test if hardware is not available.
pub fn skip_without_hardware() -> Option<TestPortConfig> {
    let config = TestPortConfig::from_env();
    if config.is_none() {
        println!("Skipping hardware test: TEST_PORT not set");
    }
    config
}
