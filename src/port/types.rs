//! Value types exchanged with a binding.
//!
//! Arguments are validated when they are built, so a malformed path, baud rate
//! or options object is rejected with `InvalidArgument` before any binding
//! state is touched.

use super::error::{BindingError, BindingResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::num::NonZeroU32;

/// Non-empty platform identifier of a serial port (`/dev/ttyUSB0`, `COM3`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortPath(String);

impl PortPath {
    /// Validate a port identifier.
    pub fn new(path: impl Into<String>) -> BindingResult<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(BindingError::invalid_argument("\"path\" is not a valid port"));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PortPath {
    type Error = BindingError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<PortPath> for String {
    fn from(path: PortPath) -> Self {
        path.0
    }
}

impl AsRef<str> for PortPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Baud rate in bits per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BaudRate(NonZeroU32);

impl BaudRate {
    pub fn new(rate: u32) -> BindingResult<Self> {
        NonZeroU32::new(rate)
            .map(Self)
            .ok_or_else(|| BindingError::invalid_argument("\"baudRate\" must be a positive number"))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = BindingError;

    fn try_from(rate: u32) -> Result<Self, Self::Error> {
        Self::new(rate)
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.get()
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = BindingError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(BindingError::invalid_argument(format!(
                "\"dataBits\" must be 5, 6, 7 or 8, got {other}"
            ))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = BindingError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(BindingError::invalid_argument(format!(
                "\"stopBits\" must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Flow control modes, derived from the `rtscts`/`xon`/`xoff` open options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Modem control lines asserted by `set`.
///
/// Every call to `set` re-asserts all five lines; fields missing from a parsed
/// options object take the defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlFlags {
    pub brk: bool,
    pub cts: bool,
    pub dsr: bool,
    pub dtr: bool,
    pub rts: bool,
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self {
            brk: false,
            cts: false,
            dsr: false,
            dtr: true,
            rts: true,
        }
    }
}

impl ControlFlags {
    /// Parse a loosely-typed options object such as `{"dtr": false}`.
    pub fn from_value(value: &Value) -> BindingResult<Self> {
        parse_object(value)
    }
}

/// Modem status lines observed by `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModemStatus {
    pub cts: bool,
    pub dsr: bool,
    pub dcd: bool,
}

fn default_lock() -> bool {
    true
}

fn default_hupcl() -> bool {
    true
}

/// Options applied by `open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenOptions {
    pub baud_rate: BaudRate,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    /// Hardware (RTS/CTS) flow control.
    #[serde(default)]
    pub rtscts: bool,
    #[serde(default)]
    pub xon: bool,
    #[serde(default)]
    pub xoff: bool,
    /// Refuse the port if another binding already holds it.
    #[serde(default = "default_lock")]
    pub lock: bool,
    /// Drop DTR/RTS when the port is closed.
    #[serde(default = "default_hupcl")]
    pub hupcl: bool,
    /// Control lines asserted right after the port opens.
    #[serde(default)]
    pub flags: ControlFlags,
    /// Driver-specific extensions, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub platform: Map<String, Value>,
}

impl OpenOptions {
    /// Options with the given baud rate and defaults everywhere else.
    pub fn new(baud_rate: u32) -> BindingResult<Self> {
        Ok(Self {
            baud_rate: BaudRate::new(baud_rate)?,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            rtscts: false,
            xon: false,
            xoff: false,
            lock: true,
            hupcl: true,
            flags: ControlFlags::default(),
            platform: Map::new(),
        })
    }

    /// Parse a loosely-typed options object such as `{"baudRate": 9600}`.
    pub fn from_value(value: &Value) -> BindingResult<Self> {
        parse_object(value)
    }

    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_hupcl(mut self, hupcl: bool) -> Self {
        self.hupcl = hupcl;
        self
    }

    pub fn with_flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Flow control mode implied by `rtscts`, `xon` and `xoff`.
    pub fn flow_control(&self) -> FlowControl {
        if self.rtscts {
            FlowControl::Hardware
        } else if self.xon || self.xoff {
            FlowControl::Software
        } else {
            FlowControl::None
        }
    }
}

/// Options accepted by `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub baud_rate: BaudRate,
}

impl UpdateOptions {
    pub fn new(baud_rate: u32) -> BindingResult<Self> {
        Ok(Self {
            baud_rate: BaudRate::new(baud_rate)?,
        })
    }

    /// Parse a loosely-typed options object such as `{"baudRate": 115200}`.
    pub fn from_value(value: &Value) -> BindingResult<Self> {
        parse_object(value)
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(value: &Value) -> BindingResult<T> {
    if !value.is_object() {
        return Err(BindingError::invalid_argument("\"options\" is not an object"));
    }
    serde_json::from_value(value.clone())
        .map_err(|e| BindingError::invalid_argument(format!("invalid options: {e}")))
}

/// Description of a port found by `list`.
///
/// Only `path` is guaranteed. Descriptive fields are `None` when the platform
/// cannot supply them and are omitted from serialized output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    #[serde(alias = "comName")]
    pub path: PortPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
}

impl PortInfo {
    /// Info carrying only the path.
    pub fn new(path: PortPath) -> Self {
        Self {
            path,
            manufacturer: None,
            serial_number: None,
            pnp_id: None,
            location_id: None,
            product_id: None,
            vendor_id: None,
        }
    }
}

/// One-shot sequence of ports produced by a single enumeration.
///
/// Consuming it cannot be restarted; call `list` again for a fresh snapshot.
pub struct PortList {
    inner: Box<dyn Iterator<Item = PortInfo> + Send>,
}

impl PortList {
    pub fn new<I>(ports: I) -> Self
    where
        I: IntoIterator<Item = PortInfo>,
        I::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(ports.into_iter()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for PortList {
    type Item = PortInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl fmt::Debug for PortList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortList")
            .field("remaining", &self.inner.size_hint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_empty_path_rejected() {
        assert_eq!(PortPath::new("").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            PortPath::new("   ").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(PortPath::new("COM3").unwrap().as_str(), "COM3");
    }

    #[test]
    fn test_zero_baud_rejected() {
        assert!(matches!(
            BaudRate::new(0),
            Err(BindingError::InvalidArgument(_))
        ));
        assert_eq!(BaudRate::new(9600).unwrap().get(), 9600);
    }

    #[test]
    fn test_default_control_flags() {
        let flags = ControlFlags::default();
        assert!(!flags.brk);
        assert!(!flags.cts);
        assert!(!flags.dsr);
        assert!(flags.dtr);
        assert!(flags.rts);
    }

    #[test]
    fn test_partial_flags_take_defaults() {
        let flags = ControlFlags::from_value(&json!({"brk": true})).unwrap();
        assert_eq!(
            flags,
            ControlFlags {
                brk: true,
                ..ControlFlags::default()
            }
        );
    }

    #[test]
    fn test_malformed_flags_rejected() {
        assert!(ControlFlags::from_value(&json!(true)).is_err());
        assert!(ControlFlags::from_value(&json!({"dtr": "yes"})).is_err());
        assert!(ControlFlags::from_value(&json!({"ring": true})).is_err());
    }

    #[test]
    fn test_open_options_minimal() {
        let options = OpenOptions::from_value(&json!({"baudRate": 9600})).unwrap();
        assert_eq!(options, OpenOptions::new(9600).unwrap());
        assert_eq!(options.data_bits, DataBits::Eight);
        assert_eq!(options.parity, Parity::None);
        assert_eq!(options.stop_bits, StopBits::One);
        assert!(options.lock);
        assert!(options.hupcl);
        assert_eq!(options.flags, ControlFlags::default());
        assert_eq!(options.flow_control(), FlowControl::None);
    }

    #[test]
    fn test_open_options_full() {
        let options = OpenOptions::from_value(&json!({
            "baudRate": 115200,
            "dataBits": 7,
            "parity": "even",
            "stopBits": 2,
            "rtscts": true,
            "lock": false,
            "hupcl": false,
            "flags": {"dtr": false},
            "platform": {"vmin": 1}
        }))
        .unwrap();

        assert_eq!(options.baud_rate.get(), 115200);
        assert_eq!(options.data_bits, DataBits::Seven);
        assert_eq!(options.parity, Parity::Even);
        assert_eq!(options.stop_bits, StopBits::Two);
        assert_eq!(options.flow_control(), FlowControl::Hardware);
        assert!(!options.lock);
        assert!(!options.hupcl);
        assert!(!options.flags.dtr);
        assert!(options.flags.rts);
        assert_eq!(options.platform.get("vmin"), Some(&json!(1)));
    }

    #[test]
    fn test_open_options_rejections() {
        let cases = vec![
            (json!(null), "null options"),
            (json!("9600"), "string options"),
            (json!({}), "missing baudRate"),
            (json!({"baudRate": "fast"}), "non-numeric baudRate"),
            (json!({"baudRate": 0}), "zero baudRate"),
            (json!({"baudRate": 9600.5}), "fractional baudRate"),
            (json!({"baudRate": 9600, "dataBits": 9}), "bad dataBits"),
            (json!({"baudRate": 9600, "parity": "mark"}), "unsupported parity"),
            (json!({"baudRate": 9600, "speed": 1}), "unrecognized key"),
        ];

        for (value, description) in cases {
            let err = OpenOptions::from_value(&value)
                .expect_err(&format!("{description} should be rejected"));
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{description}");
        }
    }

    #[test]
    fn test_update_options() {
        assert_eq!(
            UpdateOptions::from_value(&json!({"baudRate": 57600}))
                .unwrap()
                .baud_rate
                .get(),
            57600
        );
        assert!(UpdateOptions::from_value(&json!({"baudRate": "57600"})).is_err());
        assert!(UpdateOptions::from_value(&json!([57600])).is_err());
    }

    #[test]
    fn test_port_info_omits_missing_fields() {
        let info = PortInfo::new(PortPath::new("/dev/ttyS0").unwrap());
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value, json!({"path": "/dev/ttyS0"}));

        let parsed: PortInfo =
            serde_json::from_value(json!({"comName": "COM4", "vendorId": "0403"})).unwrap();
        assert_eq!(parsed.path.as_str(), "COM4");
        assert_eq!(parsed.vendor_id.as_deref(), Some("0403"));
        assert_eq!(parsed.manufacturer, None);

        assert!(serde_json::from_value::<PortInfo>(json!({"path": ""})).is_err());
    }

    #[test]
    fn test_port_list_is_one_shot() {
        let mut list = PortList::new(vec![
            PortInfo::new(PortPath::new("COM1").unwrap()),
            PortInfo::new(PortPath::new("COM2").unwrap()),
        ]);
        assert_eq!(list.size_hint(), (2, Some(2)));
        assert_eq!(list.by_ref().count(), 2);
        assert!(list.next().is_none());
        assert_eq!(PortList::empty().count(), 0);
    }

    #[test]
    fn test_data_bits_conversion() {
        let serialport_bits: serialport::DataBits = DataBits::Eight.into();
        assert_eq!(serialport_bits, serialport::DataBits::Eight);
    }

    #[test]
    fn test_flow_control_conversion() {
        let serialport_flow: serialport::FlowControl = FlowControl::Hardware.into();
        assert_eq!(serialport_flow, serialport::FlowControl::Hardware);
    }

    #[test]
    fn test_parity_conversion() {
        let serialport_parity: serialport::Parity = Parity::Even.into();
        assert_eq!(serialport_parity, serialport::Parity::Even);
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits: serialport::StopBits = StopBits::Two.into();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
    }
}
