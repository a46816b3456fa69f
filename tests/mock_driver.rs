//! Mock driver integration tests.
//!
//! Runs the conformance suite against several virtual device setups and walks
//! through the lifecycle scenarios every binding must support.

mod common;

use common::MockFixture;
use pretty_assertions::assert_eq;
use serde_json::json;
use serial_binding::conformance::Conformance;
use serial_binding::port::{
    BindingError, ControlFlags, DataBits, ErrorKind, MockPortOptions, OpenOptions, Parity,
    PortBinding, PortEnumerator, PortPath, StopBits, UpdateOptions,
};
use std::time::Duration;

// ========== Conformance ==========

#[tokio::test]
async fn test_default_device_conforms() {
    let fixture = MockFixture::new("COM_TEST", MockPortOptions::default());
    let registry = fixture.registry.clone();

    Conformance::new(
        move |options| registry.binding(options),
        fixture.path.clone(),
        OpenOptions::new(9600).unwrap(),
    )
    .with_control_roundtrip(true)
    .run()
    .await;
}

#[tokio::test]
async fn test_restricted_device_conforms() {
    let fixture = MockFixture::new(
        "/dev/ttyRESTRICTED",
        MockPortOptions {
            echo: true,
            max_read_size: 1,
            ready_data: Some(b"boot\r\n".to_vec()),
            supported_baud_rates: Some(vec![9600, 115200]),
            ..Default::default()
        },
    );
    let registry = fixture.registry.clone();

    Conformance::new(
        move |options| registry.binding(options),
        fixture.path.clone(),
        OpenOptions::new(115200).unwrap(),
    )
    .run()
    .await;
}

// ========== Lifecycle scenarios ==========

#[tokio::test]
async fn test_open_close_scenario() {
    // Arrange
    let fixture = MockFixture::new("COM_TEST", MockPortOptions::default());
    let mut binding = fixture.binding();
    let options = OpenOptions::from_value(&json!({ "baudRate": 9600 })).unwrap();

    // Act & Assert
    assert!(!binding.is_open());
    binding.open(fixture.path.clone(), options.clone()).await.unwrap();
    assert!(binding.is_open());

    let again = binding.open(fixture.path.clone(), options).await;
    assert!(matches!(again, Err(BindingError::AlreadyOpen)));
    assert!(binding.is_open());

    binding.close().await.unwrap();
    assert!(!binding.is_open());

    let second_close = binding.close().await;
    assert!(matches!(second_close, Err(BindingError::NotOpen)));
}

#[tokio::test]
async fn test_reopen_leaves_existing_connection_untouched() {
    let fixture = MockFixture::new("/dev/ttyKEEP", MockPortOptions::default());
    let mut binding = fixture.binding();
    binding
        .open(fixture.path.clone(), OpenOptions::new(9600).unwrap())
        .await
        .unwrap();
    let flags_before = fixture.handle.control_flags();

    let other = OpenOptions::new(115200)
        .unwrap()
        .with_lock(false)
        .with_flags(ControlFlags {
            dtr: false,
            rts: false,
            brk: true,
            ..ControlFlags::default()
        });
    let again = binding.open(fixture.path.clone(), other).await;

    assert!(matches!(again, Err(BindingError::AlreadyOpen)));
    assert!(binding.is_open());
    assert_eq!(fixture.handle.baud_rate(), Some(9600));
    assert_eq!(fixture.handle.control_flags(), flags_before);
    assert!(fixture.handle.is_locked());
    assert_eq!(fixture.handle.holders(), 1);
}

#[tokio::test]
async fn test_write_on_closed_binding_sends_nothing() {
    let fixture = MockFixture::echo("COM_TEST");
    let mut binding = fixture.binding();

    let result = binding.write(b"hello").await;

    assert!(matches!(result, Err(BindingError::NotOpen)));
    assert!(fixture.handle.recording().is_empty());
    assert_eq!(fixture.handle.last_write(), None);
}

#[tokio::test]
async fn test_reads_follow_max_read_size() {
    let fixture = MockFixture::new(
        "/dev/ttySLOW",
        MockPortOptions {
            max_read_size: 3,
            ready_data: Some(b"abcdefg".to_vec()),
            ..Default::default()
        },
    );
    let mut binding = fixture.binding();
    binding
        .open(fixture.path.clone(), OpenOptions::new(9600).unwrap())
        .await
        .unwrap();

    let mut buffer = [0u8; 16];
    let mut filled = 0;
    while filled < 7 {
        let n = binding.read(&mut buffer, filled, 16 - filled).await.unwrap();
        assert!(n <= 3, "read returned {n} bytes, cap is 3");
        filled += n;
    }

    assert_eq!(&buffer[..7], b"abcdefg");
    assert_eq!(fixture.handle.pending_input(), 0);
}

#[tokio::test]
async fn test_pending_read_wakes_on_emitted_data() {
    let fixture = MockFixture::new("/dev/ttyWAIT", MockPortOptions::default());
    let mut binding = fixture.binding();
    binding
        .open(fixture.path.clone(), OpenOptions::new(9600).unwrap())
        .await
        .unwrap();

    let handle = fixture.handle.clone();
    let emitter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.emit_data(b"OK\r\n");
    });

    let mut buffer = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(1), binding.read(&mut buffer, 0, 8))
        .await
        .expect("read should wake on emitted data")
        .unwrap();
    emitter.await.unwrap();

    assert_eq!(&buffer[..n], b"OK\r\n");
}

#[tokio::test]
async fn test_open_options_reach_device() {
    let fixture = MockFixture::new("/dev/ttyOPTS", MockPortOptions::default());
    let mut binding = fixture.binding();
    let options = OpenOptions::from_value(&json!({
        "baudRate": 57600,
        "dataBits": 7,
        "parity": "even",
        "stopBits": 2,
        "lock": false,
        "flags": { "dtr": false, "brk": true }
    }))
    .unwrap();

    assert_eq!(options.data_bits, DataBits::Seven);
    assert_eq!(options.parity, Parity::Even);
    assert_eq!(options.stop_bits, StopBits::Two);

    binding.open(fixture.path.clone(), options).await.unwrap();

    assert_eq!(fixture.handle.baud_rate(), Some(57600));
    assert!(!fixture.handle.is_locked());
    let flags = fixture.handle.control_flags();
    assert!(!flags.dtr);
    assert!(flags.brk);
    assert!(flags.rts);
}

#[tokio::test]
async fn test_update_rejects_unsupported_rate_and_keeps_port_open() {
    let fixture = MockFixture::new(
        "/dev/ttyFIXED",
        MockPortOptions {
            supported_baud_rates: Some(vec![9600]),
            ..Default::default()
        },
    );
    let mut binding = fixture.binding();
    binding
        .open(fixture.path.clone(), OpenOptions::new(9600).unwrap())
        .await
        .unwrap();

    let err = binding
        .update(UpdateOptions::new(230400).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationFailed);
    assert!(binding.is_open());
    assert_eq!(fixture.handle.baud_rate(), Some(9600));
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected_before_any_call() {
    assert!(PortPath::new("").is_err());
    assert!(OpenOptions::new(0).is_err());
    assert!(OpenOptions::from_value(&json!({})).is_err());
    assert!(OpenOptions::from_value(&json!("9600")).is_err());
    assert!(OpenOptions::from_value(&json!({ "baudRate": 9600, "turbo": true })).is_err());
    assert!(UpdateOptions::from_value(&json!({ "baudRate": -1 })).is_err());
    assert!(ControlFlags::from_value(&json!({ "dtr": "yes" })).is_err());

    let platform = OpenOptions::from_value(&json!({
        "baudRate": 9600,
        "platform": { "vmin": 1, "vtime": 0 }
    }))
    .unwrap();
    assert_eq!(platform.platform.len(), 2);
}

#[tokio::test]
async fn test_disconnect_mid_session() {
    // Arrange
    let fixture = MockFixture::echo("/dev/ttyUNPLUG");
    let mut binding = fixture.binding();
    binding
        .open(fixture.path.clone(), OpenOptions::new(9600).unwrap())
        .await
        .unwrap();
    binding.write(b"before").await.unwrap();

    // Act
    fixture.handle.disconnect();
    let result = binding.write(b"after").await;

    // Assert
    assert!(matches!(result, Err(BindingError::Disconnected)));
    assert!(!binding.is_open());
    assert_eq!(fixture.disconnects(), 1);
    assert_eq!(fixture.handle.recording(), b"before");

    // Closed bindings report NotOpen from here on, without another callback.
    assert!(matches!(binding.drain().await, Err(BindingError::NotOpen)));
    assert_eq!(fixture.disconnects(), 1);
}

#[tokio::test]
async fn test_listing_hides_unplugged_devices() {
    let fixture = MockFixture::new("/dev/ttyA", MockPortOptions::default());
    fixture
        .registry
        .create_port(PortPath::new("/dev/ttyB").unwrap(), MockPortOptions::default());

    fixture.handle.disconnect();
    let ports: Vec<_> = fixture.registry.list().await.unwrap().collect();

    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].path.as_str(), "/dev/ttyB");
}
