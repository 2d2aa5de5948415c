//! The flashing engine interface
//!
//! The ESP serial bootloader protocol (sync handshake, stub loader, deflate
//! writes) lives in an external engine. The daemon only sequences the
//! engine's operations, so this module describes exactly the operations it
//! needs and nothing more.

use std::fmt;

use badgeflash_core::FlashSegment;

use crate::error::Result;

/// Detection attempts the engine grants a freshly opened port
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 7;

/// Baud rate used once the stub is running
pub const FLASH_BAUD: u32 = 921_600;

/// A chip found by [`FlashEngine::detect_chip`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Chip family, e.g. "ESP32"
    pub name: String,
}

impl ChipInfo {
    /// Describe a detected chip family
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Diagnostic identity read from a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipIdentity {
    /// Value of the chip ID register
    ChipId(u32),
    /// Factory MAC address, used when the chip has no chip ID
    Mac([u8; 6]),
}

impl fmt::Display for ChipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipId(id) => write!(f, "chip ID 0x{:08x}", id),
            Self::Mac(mac) => write!(
                f,
                "MAC {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
        }
    }
}

/// A flash parameter that can be left as the image header has it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashParam {
    /// Keep the value already in the image header
    Keep,
    /// Rewrite the header with this value
    Set(String),
}

/// How [`FlashEngine::write_flash`] writes the segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Report progress while writing
    pub progress: bool,
    /// Erase the whole chip before writing
    pub erase_all: bool,
    /// Read back and compare after writing
    pub verify: bool,
    /// Deflate segments for transfer
    pub compress: bool,
    /// Encrypt segments on the way in
    pub encrypt: bool,
    /// The stub loader is already running on the chip
    pub stub_running: bool,
    /// Flash size header field
    pub flash_size: FlashParam,
    /// Flash mode header field
    pub flash_mode: FlashParam,
    /// Flash frequency header field
    pub flash_freq: FlashParam,
}

impl WriteOptions {
    /// Options for unattended production flashing
    ///
    /// Quiet, whole-chip erase, verified and compressed, unencrypted, with
    /// the stub already running and every header field kept as built.
    pub fn production() -> Self {
        Self {
            progress: false,
            erase_all: true,
            verify: true,
            compress: true,
            encrypt: false,
            stub_running: true,
            flash_size: FlashParam::Keep,
            flash_mode: FlashParam::Keep,
            flash_freq: FlashParam::Keep,
        }
    }
}

/// An in-process flashing engine
///
/// Every operation blocks on serial I/O. The port returned by
/// [`open`](Self::open) is owned by the caller and closed by dropping it.
pub trait FlashEngine: Send + Sync + 'static {
    /// Open serial connection
    type Port: Send;

    /// Number of detection attempts the caller should make
    fn connect_attempts(&self) -> u32 {
        DEFAULT_CONNECT_ATTEMPTS
    }

    /// Open the serial port at `path`
    fn open(&self, path: &str) -> Result<Self::Port>;

    /// Make a single attempt to detect a chip
    fn detect_chip(&self, port: &mut Self::Port) -> Result<ChipInfo>;

    /// Read the chip ID register
    fn chip_id(&self, port: &mut Self::Port, chip: &ChipInfo) -> Result<u32>;

    /// Read the factory MAC address
    fn read_mac(&self, port: &mut Self::Port, chip: &ChipInfo) -> Result<[u8; 6]>;

    /// Upload and start the stub loader
    fn run_stub(&self, port: &mut Self::Port, chip: &ChipInfo) -> Result<()>;

    /// Switch the link to `baud`
    fn change_baud(&self, port: &mut Self::Port, baud: u32) -> Result<()>;

    /// Write every segment in one go
    fn write_flash(
        &self,
        port: &mut Self::Port,
        segments: &[FlashSegment],
        options: &WriteOptions,
    ) -> Result<()>;
}

/// Read a chip's identity, falling back to the MAC address on chips
/// without a chip ID register
pub fn read_identity<E: FlashEngine>(
    engine: &E,
    port: &mut E::Port,
    chip: &ChipInfo,
) -> Result<ChipIdentity> {
    match engine.chip_id(port, chip) {
        Ok(id) => Ok(ChipIdentity::ChipId(id)),
        Err(e) if e.is_not_supported() => {
            log::debug!("Chip ID is not supported - falling back to MAC");
            engine.read_mac(port, chip).map(ChipIdentity::Mac)
        }
        Err(e) => Err(e),
    }
}
