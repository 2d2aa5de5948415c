//! Error types for flashing engine operations

use thiserror::Error;

/// Errors reported by a [`FlashEngine`](crate::FlashEngine)
///
/// The variants fall into three classes that callers treat differently:
///
/// - the chip did not answer as expected ([`NoResponse`](Self::NoResponse),
///   [`Protocol`](Self::Protocol)) - a detection attempt may simply be
///   retried
/// - the link itself failed ([`Serial`](Self::Serial), [`Io`](Self::Io)) -
///   almost always the board being unplugged, never worth retrying
/// - everything else
#[derive(Debug, Error)]
pub enum EngineError {
    /// The chip did not respond to the handshake
    #[error("No serial data received: {0}")]
    NoResponse(String),

    /// The chip responded with something unexpected
    #[error("{0}")]
    Protocol(String),

    /// The detected chip family does not implement an operation
    #[error("{operation} is not supported on {chip}")]
    NotSupported {
        /// Chip family name
        chip: String,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// An operation was called before the step it depends on
    #[error("{0} is not possible in the current connection state")]
    NotReady(&'static str),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// An operation the detected chip family does not implement
    pub fn not_supported(chip: &crate::ChipInfo, operation: &'static str) -> Self {
        Self::NotSupported {
            chip: chip.name.clone(),
            operation,
        }
    }

    /// Whether a detection attempt that failed this way may be retried
    pub fn is_detection_miss(&self) -> bool {
        matches!(self, Self::NoResponse(_) | Self::Protocol(_))
    }

    /// Whether the serial link itself failed
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::Serial(_) | Self::Io(_))
    }

    /// Whether the operation is unsupported on the detected chip
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

/// Result type for engine operations
pub type Result<T> = core::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let miss = EngineError::NoResponse("timeout".into());
        assert!(miss.is_detection_miss());
        assert!(!miss.is_link_failure());

        let unplugged = EngineError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device disconnected",
        ));
        assert!(unplugged.is_link_failure());
        assert!(!unplugged.is_detection_miss());

        let unsupported = EngineError::NotSupported {
            chip: "ESP32".into(),
            operation: "chip_id",
        };
        assert!(unsupported.is_not_supported());
        assert!(!unsupported.is_detection_miss());
        assert_eq!(unsupported.to_string(), "chip_id is not supported on ESP32");

        let early = EngineError::NotReady("write_flash");
        assert!(!early.is_detection_miss());
        assert!(!early.is_link_failure());
    }
}
