//! badgeflash-core - Shared types for the badge flashing daemon
//!
//! This crate holds everything the watcher, the dispatcher and the handlers
//! agree on:
//!
//! - [`event`] - udev-style device property sets and the parsed
//!   [`DeviceEvent`] built from them
//! - [`images`] - the validated offset to image map written to ESP32 boards
//! - [`config`] - the immutable daemon configuration assembled at startup
//!
//! # Example
//!
//! ```ignore
//! use badgeflash_core::{DeviceEvent, DeviceProperties};
//!
//! let props: DeviceProperties = [
//!     ("ID_BUS", "usb"),
//!     ("ID_VENDOR_ID", "10c4"),
//!     ("ID_MODEL_ID", "ea70"),
//!     ("DEVNAME", "/dev/ttyUSB0"),
//! ]
//! .into_iter()
//! .collect();
//!
//! let event = DeviceEvent::parse(&props)?;
//! assert_eq!(event.vendor_id(), 0x10c4);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod event;
pub mod images;

pub use config::{DaemonConfig, SamConfig, Settings};
pub use error::{ConfigError, EventError, FileKind};
pub use event::{DeviceEvent, DeviceProperties};
pub use images::{parse_offset, FlashImageSet, FlashSegment};

/// Log targets for the outcome classes an operator watches for
///
/// Records on these targets are rendered with their own tag and stay
/// visible at the default (warn) verbosity.
pub mod targets {
    /// A flashable device was recognised
    pub const DETECT: &str = "badge::detect";
    /// A device finished flashing
    pub const SUCCESS: &str = "badge::success";
}
