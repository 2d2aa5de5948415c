//! badgeflash-watch - USB serial device discovery
//!
//! Boards show up as USB serial ports. [`UsbSerialWatcher`] first reports
//! every port already attached, then every port that appears later, as
//! udev-style [`DeviceProperties`](badgeflash_core::DeviceProperties).
//!
//! Enumeration uses `serialport`; attach and detach notifications come from
//! `nusb`'s hotplug watcher.
//!
//! # Example
//!
//! ```no_run
//! use badgeflash_watch::{DeviceSource, UsbSerialWatcher};
//!
//! # async fn watch() -> Result<(), badgeflash_watch::WatchError> {
//! let mut watcher = UsbSerialWatcher::start()?;
//! loop {
//!     let props = watcher.next_device().await?;
//!     println!("{:?} attached", props.devname());
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod ports;
pub mod watcher;

pub use error::{Result, WatchError};
pub use ports::{properties_for, scan_usb_serial, PortTracker};
pub use watcher::{DeviceSource, UsbSerialWatcher};
