//! badgeflash-esp - Flashing engine for ESP32 boards
//!
//! ESP32 boards on the badge sit behind a CP2105 USB-UART bridge. This crate
//! defines the [`FlashEngine`] operations the daemon sequences, the
//! [`EngineError`] classification its retry loop relies on, and
//! [`EspflashEngine`], which talks to the ROM bootloader through `espflash`.
//!
//! # Example
//!
//! ```ignore
//! use badgeflash_esp::{read_identity, FlashEngine, WriteOptions, FLASH_BAUD};
//!
//! fn flash<E: FlashEngine>(engine: &E, path: &str, segments: &[FlashSegment]) -> Result<()> {
//!     let mut port = engine.open(path)?;
//!     let chip = engine.detect_chip(&mut port)?;
//!     log::debug!("{}", read_identity(engine, &mut port, &chip)?);
//!     engine.run_stub(&mut port, &chip)?;
//!     engine.change_baud(&mut port, FLASH_BAUD)?;
//!     engine.write_flash(&mut port, segments, &WriteOptions::production())
//! }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod loader;

pub use engine::{
    read_identity, ChipIdentity, ChipInfo, FlashEngine, FlashParam, WriteOptions,
    DEFAULT_CONNECT_ATTEMPTS, FLASH_BAUD,
};
pub use error::{EngineError, Result};
pub use loader::{EspPort, EspflashEngine, ROM_BAUD};
