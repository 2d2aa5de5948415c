//! [`FlashEngine`] backed by the `espflash` library
//!
//! A port moves through three states: a plain serial port, a connection to
//! the ROM bootloader once a chip has answered, and a connection to the stub
//! loader. Each step hands the serial port on to the next `Flasher`, so the
//! port only ever has one owner and is closed when the [`EspPort`] drops.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io;
use std::mem;
use std::time::Duration;

use badgeflash_core::FlashSegment;
use espflash::connection::reset::{ResetAfterOperation, ResetBeforeOperation};
use espflash::elf::RomSegment;
use espflash::flasher::Flasher;
use espflash::targets::Chip;
use serialport::{DataBits, FlowControl, Parity, SerialPortType, StopBits, UsbPortInfo};

use crate::engine::{ChipInfo, FlashEngine, FlashParam, WriteOptions, DEFAULT_CONNECT_ATTEMPTS};
use crate::error::{EngineError, Result};

/// Baud rate the ROM bootloader listens on after reset
pub const ROM_BAUD: u32 = 115_200;

const PORT_TIMEOUT: Duration = Duration::from_secs(3);

// Assumed when the port can no longer be found in the enumeration
const CP2105_VID: u16 = 0x10c4;
const CP2105_PID: u16 = 0xea70;

#[cfg(unix)]
type NativePort = serialport::TTYPort;
#[cfg(windows)]
type NativePort = serialport::COMPort;

enum Link {
    /// Nothing open; the next detection attempt reopens the port
    Closed,
    Serial(NativePort),
    Rom { flasher: Flasher, chip: Chip },
    Stub { flasher: Flasher, chip: Chip },
}

/// An open connection to an ESP32 behind a USB-UART bridge
pub struct EspPort {
    path: String,
    usb: UsbPortInfo,
    link: Link,
}

impl EspPort {
    /// Device path the port was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Take the serial port back from whoever holds it
    fn take_serial(&mut self) -> Result<NativePort> {
        match mem::replace(&mut self.link, Link::Closed) {
            Link::Serial(serial) => Ok(serial),
            Link::Rom { flasher, .. } | Link::Stub { flasher, .. } => Ok(flasher.into_serial()),
            Link::Closed => {
                log::debug!("Reopening serial port {}", self.path);
                open_native(&self.path)
            }
        }
    }

    fn flasher(&mut self, operation: &'static str) -> Result<(&mut Flasher, Chip)> {
        match &mut self.link {
            Link::Rom { flasher, chip } | Link::Stub { flasher, chip } => Ok((flasher, *chip)),
            _ => Err(EngineError::NotReady(operation)),
        }
    }
}

impl Drop for EspPort {
    fn drop(&mut self) {
        log::debug!("Closed serial port {}", self.path);
    }
}

/// Flashes ESP chips in-process with `espflash`
#[derive(Debug, Clone, Copy)]
pub struct EspflashEngine {
    attempts: u32,
}

impl EspflashEngine {
    /// Engine granting the default number of detection attempts
    pub fn new() -> Self {
        Self::with_attempts(DEFAULT_CONNECT_ATTEMPTS)
    }

    /// Engine granting `attempts` detection attempts
    pub fn with_attempts(attempts: u32) -> Self {
        Self { attempts }
    }
}

impl Default for EspflashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashEngine for EspflashEngine {
    type Port = EspPort;

    fn connect_attempts(&self) -> u32 {
        self.attempts
    }

    fn open(&self, path: &str) -> Result<EspPort> {
        let serial = open_native(path)?;
        log::debug!("Opened serial port {} at {} baud", path, ROM_BAUD);
        Ok(EspPort {
            path: path.to_owned(),
            usb: usb_port_info(path),
            link: Link::Serial(serial),
        })
    }

    fn detect_chip(&self, port: &mut EspPort) -> Result<ChipInfo> {
        let serial = port.take_serial()?;
        // A failed attempt consumes the port; it is reopened on the next one
        let flasher = Flasher::connect(
            serial,
            port.usb.clone(),
            None,
            false,
            true,
            false,
            None,
            ResetAfterOperation::NoReset,
            ResetBeforeOperation::DefaultReset,
        )
        .map_err(|e| engine_error(e, EngineError::NoResponse))?;

        let chip = flasher.chip();
        port.link = Link::Rom { flasher, chip };
        Ok(ChipInfo::new(chip.to_string()))
    }

    fn chip_id(&self, _port: &mut EspPort, chip: &ChipInfo) -> Result<u32> {
        Err(EngineError::not_supported(chip, "chip_id"))
    }

    fn read_mac(&self, port: &mut EspPort, _chip: &ChipInfo) -> Result<[u8; 6]> {
        let (flasher, _) = port.flasher("read_mac")?;
        let info = flasher
            .device_info()
            .map_err(|e| engine_error(e, EngineError::Protocol))?;
        parse_mac(&info.mac_address).ok_or_else(|| {
            EngineError::Protocol(format!("unexpected MAC address {:?}", info.mac_address))
        })
    }

    fn run_stub(&self, port: &mut EspPort, _chip: &ChipInfo) -> Result<()> {
        let chip = match &port.link {
            Link::Rom { chip, .. } => *chip,
            _ => return Err(EngineError::NotReady("run_stub")),
        };
        let serial = port.take_serial()?;
        // The chip is already in its bootloader, resetting it again could
        // boot the application instead
        let flasher = Flasher::connect(
            serial,
            port.usb.clone(),
            None,
            true,
            true,
            false,
            Some(chip),
            ResetAfterOperation::NoReset,
            ResetBeforeOperation::NoReset,
        )
        .map_err(|e| engine_error(e, EngineError::Protocol))?;

        port.link = Link::Stub { flasher, chip };
        Ok(())
    }

    fn change_baud(&self, port: &mut EspPort, baud: u32) -> Result<()> {
        let (flasher, _) = port.flasher("change_baud")?;
        flasher
            .change_baud(baud)
            .map_err(|e| engine_error(e, EngineError::Protocol))
    }

    fn write_flash(
        &self,
        port: &mut EspPort,
        segments: &[FlashSegment],
        options: &WriteOptions,
    ) -> Result<()> {
        if options.stub_running && !matches!(port.link, Link::Stub { .. }) {
            return Err(EngineError::NotReady("write_flash"));
        }
        let (flasher, chip) = port.flasher("write_flash")?;
        let chip = ChipInfo::new(chip.to_string());

        if options.encrypt {
            return Err(EngineError::not_supported(&chip, "encrypted writes"));
        }
        let params = [&options.flash_size, &options.flash_mode, &options.flash_freq];
        if params.iter().any(|p| matches!(p, FlashParam::Set(_))) {
            return Err(EngineError::not_supported(&chip, "rewriting image headers"));
        }

        if options.erase_all {
            log::debug!("Erasing flash of {}", chip);
            flasher
                .erase_flash()
                .map_err(|e| engine_error(e, EngineError::Protocol))?;
        }

        let rom_segments: Vec<RomSegment<'_>> = segments
            .iter()
            .map(|segment| RomSegment {
                addr: segment.offset,
                data: Cow::Borrowed(segment.data.as_slice()),
            })
            .collect();
        // Transfers are always compressed and verified by the stub
        flasher
            .write_bins_to_flash(&rom_segments, None)
            .map_err(|e| engine_error(e, EngineError::Protocol))
    }
}

fn open_native(path: &str) -> Result<NativePort> {
    let serial = serialport::new(path, ROM_BAUD)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(PORT_TIMEOUT)
        .open_native()?;
    Ok(serial)
}

fn usb_port_info(path: &str) -> UsbPortInfo {
    let found = serialport::available_ports()
        .ok()
        .and_then(|ports| ports.into_iter().find(|port| port.port_name == path))
        .and_then(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => Some(usb),
            _ => None,
        });

    found.unwrap_or_else(|| {
        log::debug!("{} is not enumerated, assuming a CP2105", path);
        UsbPortInfo {
            vid: CP2105_VID,
            pid: CP2105_PID,
            serial_number: None,
            manufacturer: None,
            product: None,
            interface: None,
        }
    })
}

/// Classify an `espflash` error
///
/// Serial and OS errors anywhere in the chain mean the link is gone.
/// Anything else becomes `otherwise`.
fn engine_error(err: espflash::error::Error, otherwise: fn(String) -> EngineError) -> EngineError {
    let message = err.to_string();
    let root: &(dyn StdError + 'static) = &err;
    let mut cause = Some(root);

    while let Some(e) = cause {
        if let Some(serial) = e.downcast_ref::<serialport::Error>() {
            return EngineError::Serial(serialport::Error::new(serial.kind(), message));
        }
        if let Some(os) = e.downcast_ref::<io::Error>() {
            if !matches!(os.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                return EngineError::Io(io::Error::new(os.kind(), message));
            }
        }
        cause = e.source();
    }
    otherwise(message)
}

/// Parse `aa:bb:cc:dd:ee:ff`
fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port() -> EspPort {
        EspPort {
            path: "/dev/ttyUSB0".to_owned(),
            usb: UsbPortInfo {
                vid: CP2105_VID,
                pid: CP2105_PID,
                serial_number: None,
                manufacturer: None,
                product: None,
                interface: Some(0),
            },
            link: Link::Closed,
        }
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("24:0a:c4:01:02:ff"),
            Some([0x24, 0x0a, 0xc4, 0x01, 0x02, 0xff])
        );
        assert_eq!(parse_mac("24:0a:c4:01:02"), None);
        assert_eq!(parse_mac("24:0a:c4:01:02:03:04"), None);
        assert_eq!(parse_mac("24:0a:c4:01:02:zz"), None);
    }

    #[test]
    fn test_open_missing_port_is_a_link_failure() {
        let err = EspflashEngine::new()
            .open("/dev/badgeflash-does-not-exist")
            .err()
            .unwrap();
        assert!(err.is_link_failure());
    }

    #[test]
    fn test_steps_out_of_order() {
        let engine = EspflashEngine::new();
        let chip = ChipInfo::new("esp32");
        let mut port = closed_port();

        assert!(matches!(
            engine.run_stub(&mut port, &chip),
            Err(EngineError::NotReady("run_stub"))
        ));
        assert!(matches!(
            engine.change_baud(&mut port, 921_600),
            Err(EngineError::NotReady("change_baud"))
        ));
        assert!(matches!(
            engine.write_flash(&mut port, &[], &WriteOptions::production()),
            Err(EngineError::NotReady("write_flash"))
        ));
        assert!(matches!(
            engine.read_mac(&mut port, &chip),
            Err(EngineError::NotReady("read_mac"))
        ));
    }

    #[test]
    fn test_chip_id_falls_back() {
        let engine = EspflashEngine::new();
        let err = engine
            .chip_id(&mut closed_port(), &ChipInfo::new("esp32"))
            .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_attempts() {
        assert_eq!(EspflashEngine::default().connect_attempts(), 7);
        assert_eq!(EspflashEngine::with_attempts(3).connect_attempts(), 3);
    }
}
