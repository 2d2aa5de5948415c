//! Serial port enumeration
//!
//! Ports are described with the same udev property names the rest of the
//! daemon uses, whatever platform backend `serialport` enumerated them
//! with.

use std::collections::HashMap;

use badgeflash_core::event::keys;
use badgeflash_core::DeviceProperties;
use serialport::{SerialPortInfo, SerialPortType};

use crate::error::Result;

/// Describe a serial port, or `None` if it is not on the USB bus
pub fn properties_for(info: &SerialPortInfo) -> Option<DeviceProperties> {
    let SerialPortType::UsbPort(usb) = &info.port_type else {
        return None;
    };

    let mut props = DeviceProperties::new()
        .with(keys::BUS, "usb")
        .with(keys::DEVNAME, info.port_name.as_str())
        .with(keys::VENDOR_ID, format!("{:04x}", usb.vid))
        .with(keys::MODEL_ID, format!("{:04x}", usb.pid));

    if let Some(interface) = usb.interface {
        props.insert(keys::INTERFACE_NUM, format!("{:02}", interface));
    }
    if let Some(product) = &usb.product {
        props.insert(keys::MODEL, product.replace(' ', "_"));
    }
    if let Some(manufacturer) = &usb.manufacturer {
        props.insert(keys::VENDOR, manufacturer.replace(' ', "_"));
    }
    if let Some(serial) = &usb.serial_number {
        props.insert(keys::SERIAL_SHORT, serial.as_str());
    }

    Some(props)
}

/// List every USB serial port currently attached
pub fn scan_usb_serial() -> Result<Vec<DeviceProperties>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .iter()
        .filter_map(|port| {
            let props = properties_for(port);
            if props.is_none() {
                log::debug!("Ignoring non-USB serial device {}", port.port_name);
            }
            props
        })
        .collect())
}

/// Whether `props` belongs to the USB device `vid:pid`
pub fn matches_ids(props: &DeviceProperties, vid: u16, pid: u16) -> bool {
    props.get(keys::VENDOR_ID) == Some(format!("{:04x}", vid).as_str())
        && props.get(keys::MODEL_ID) == Some(format!("{:04x}", pid).as_str())
}

/// What a port path is currently attached to
///
/// A board that re-enumerates (an application switching to its bootloader)
/// keeps its path but changes ids, and counts as a new attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PortIdentity {
    vid: Option<String>,
    pid: Option<String>,
    serial: Option<String>,
}

impl PortIdentity {
    fn of(props: &DeviceProperties) -> Self {
        let field = |key: &str| props.get(key).map(str::to_owned);
        Self {
            vid: field(keys::VENDOR_ID),
            pid: field(keys::MODEL_ID),
            serial: field(keys::SERIAL_SHORT),
        }
    }
}

/// Remembers which ports have already been reported
///
/// A port is reported once per attachment: it becomes reportable again
/// after a scan shows it gone, or as soon as a different device shows up
/// at its path.
#[derive(Debug, Default)]
pub struct PortTracker {
    reported: HashMap<String, PortIdentity>,
}

impl PortTracker {
    /// Keep only ports not reported before, and remember them
    pub fn admit(&mut self, scan: Vec<DeviceProperties>) -> Vec<DeviceProperties> {
        scan.into_iter()
            .filter(|props| {
                let Some(path) = props.devname() else {
                    return true;
                };
                let identity = PortIdentity::of(props);
                match self.reported.get(path) {
                    Some(known) if *known == identity => false,
                    Some(_) => {
                        log::debug!("{} now belongs to another device", path);
                        self.reported.insert(path.to_owned(), identity);
                        true
                    }
                    None => {
                        self.reported.insert(path.to_owned(), identity);
                        true
                    }
                }
            })
            .collect()
    }

    /// Forget ports missing from `scan`, or attached to something else now
    pub fn retain_present(&mut self, scan: &[DeviceProperties]) {
        let present: HashMap<&str, PortIdentity> = scan
            .iter()
            .filter_map(|props| Some((props.devname()?, PortIdentity::of(props))))
            .collect();
        self.reported
            .retain(|path, identity| present.get(path.as_str()) == Some(&*identity));
    }

    /// Whether `path` has been reported and not seen removed since
    pub fn is_reported(&self, path: &str) -> bool {
        self.reported.contains_key(path)
    }

    /// Number of ports currently remembered
    pub fn len(&self) -> usize {
        self.reported.len()
    }

    /// Whether no port is remembered
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }
}
