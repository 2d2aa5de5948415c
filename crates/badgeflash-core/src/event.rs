//! Device descriptors and the events built from them
//!
//! The watcher reports every serial device as a flat, udev-style property
//! map ([`DeviceProperties`]). The dispatcher turns each map into a
//! [`DeviceEvent`] exactly once; a map that lacks usable USB identifiers is
//! rejected with an [`EventError`] and dropped.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::EventError;

/// Well-known property keys
pub mod keys {
    /// Bus the device hangs off ("usb" for everything we flash)
    pub const BUS: &str = "ID_BUS";
    /// USB vendor id, hexadecimal without prefix
    pub const VENDOR_ID: &str = "ID_VENDOR_ID";
    /// USB product id, hexadecimal without prefix
    pub const MODEL_ID: &str = "ID_MODEL_ID";
    /// Device node of the serial port
    pub const DEVNAME: &str = "DEVNAME";
    /// USB interface number the tty belongs to
    pub const INTERFACE_NUM: &str = "ID_USB_INTERFACE_NUM";
    /// Product string
    pub const MODEL: &str = "ID_MODEL";
    /// Manufacturer string
    pub const VENDOR: &str = "ID_VENDOR";
    /// Serial number string
    pub const SERIAL_SHORT: &str = "ID_SERIAL_SHORT";
}

/// Flat property set describing one serial device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties(BTreeMap<String, String>);

impl DeviceProperties {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a property
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the device sits on the USB bus
    pub fn is_usb(&self) -> bool {
        self.get(keys::BUS) == Some("usb")
    }

    /// Device node, if known
    pub fn devname(&self) -> Option<&str> {
        self.get(keys::DEVNAME)
    }

    /// Iterate over all properties in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for DeviceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "  {}={}", key, value)?;
        }
        Ok(())
    }
}

/// A classified-ready device event
///
/// Immutable once parsed. Handlers receive it by value, so every event is
/// consumed by exactly one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    vendor_id: u16,
    product_id: u16,
    device_path: Option<String>,
    interface: Option<u8>,
    properties: DeviceProperties,
}

impl DeviceEvent {
    /// Parse an event from a watcher property set
    ///
    /// Vendor and product ids are mandatory. The device path and interface
    /// number are optional here; handlers that need them check for
    /// themselves.
    pub fn parse(props: &DeviceProperties) -> Result<Self, EventError> {
        let vendor_id = parse_hex_id(props, keys::VENDOR_ID)?;
        let product_id = parse_hex_id(props, keys::MODEL_ID)?;

        let interface = match props.get(keys::INTERFACE_NUM) {
            Some(raw) => match raw.trim().parse::<u8>() {
                Ok(num) => Some(num),
                Err(_) => {
                    log::debug!("Ignoring unparsable interface number {:?}", raw);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            vendor_id,
            product_id,
            device_path: props.devname().map(str::to_owned),
            interface,
            properties: props.clone(),
        })
    }

    /// USB vendor id
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// USB product id
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Serial device node, e.g. `/dev/ttyUSB0`
    pub fn device_path(&self) -> Option<&str> {
        self.device_path.as_deref()
    }

    /// USB interface number of the tty
    pub fn interface(&self) -> Option<u8> {
        self.interface
    }

    /// All raw properties the event was built from
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Human-readable model name for log lines
    pub fn model(&self) -> String {
        match self.properties.get(keys::MODEL) {
            Some(model) => model.to_owned(),
            None => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

fn parse_hex_id(props: &DeviceProperties, key: &'static str) -> Result<u16, EventError> {
    let raw = props.get(key).ok_or(EventError::MissingProperty(key))?;
    let digits = raw.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    u16::from_str_radix(digits, 16).map_err(|_| EventError::InvalidId {
        key,
        value: raw.to_owned(),
    })
}
