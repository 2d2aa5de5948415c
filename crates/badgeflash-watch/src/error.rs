//! Error types for device watching

use thiserror::Error;

/// Watcher failures
///
/// All of these are fatal to the daemon: without a working monitor no
/// further boards would ever be flashed.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Serial port enumeration failed
    #[error("Failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),

    /// The USB hotplug monitor could not be started
    #[error("Failed to start USB hotplug monitor: {0}")]
    Hotplug(#[from] nusb::Error),

    /// The USB hotplug monitor stopped delivering events
    #[error("USB hotplug monitor closed unexpectedly")]
    Closed,
}

/// Result type for watcher operations
pub type Result<T> = core::result::Result<T, WatchError>;
