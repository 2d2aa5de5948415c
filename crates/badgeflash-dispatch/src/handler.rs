//! The handler capability shared by every device variant

use std::fmt;

use async_trait::async_trait;
use badgeflash_core::DeviceEvent;

use crate::error::FlashError;

/// The concrete handler variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Only tells the operator what to do with the board
    Informational,
    /// Flashes through an external program
    ExternalProcessFlash,
    /// Detects a chip behind a USB-UART bridge and flashes it in-process
    BridgeDetectAndFlash,
    /// Logs and ignores the device
    Unknown,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Informational => "informational",
            Self::ExternalProcessFlash => "external-process flash",
            Self::BridgeDetectAndFlash => "bridge detect-and-flash",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How handling one device ended
#[derive(Debug)]
pub enum Outcome {
    /// The device was flashed
    Flashed,
    /// The operator was told what to do
    Advised,
    /// The device is not one we handle
    Ignored,
    /// The device is handled, but not through this interface
    Skipped,
    /// Handling the device failed
    Failed(FlashError),
}

impl Outcome {
    /// Whether the outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Something that knows what to do with one kind of device
///
/// Handlers are shared between workers, so they hold configuration only.
/// Everything a run opens belongs to that run.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> HandlerKind;

    /// Handle one device event to completion
    async fn handle(&self, event: DeviceEvent) -> Outcome;
}
