//! Per-device failure types

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use badgeflash_esp::EngineError;
use thiserror::Error;

/// Failures running the external flashing program
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        /// Program that was run
        program: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the program failed
    #[error("failed waiting for the flasher: {0}")]
    Wait(#[source] std::io::Error),

    /// The program did not finish in time and was killed
    #[error("timed out after {} seconds", .0.as_secs_f32())]
    TimedOut(Duration),

    /// The program exited unsuccessfully
    #[error("flasher {0}")]
    Failed(ExitStatus),
}

/// Why flashing one device failed
///
/// Every variant is contained to the device it happened on.
#[derive(Debug, Error)]
pub enum FlashError {
    /// The device descriptor carried no device node
    #[error("unable to get device name")]
    MissingDevicePath,

    /// The information query of the external flasher failed
    #[error("failed to get device info: {0}")]
    InfoQuery(#[source] ProcessError),

    /// The external flasher failed to program the image
    #[error("failed to flash: {0}")]
    Program(#[source] ProcessError),

    /// The serial port could not be opened
    #[error("failed to open serial port: {0}")]
    OpenPort(#[source] EngineError),

    /// The serial link failed during detection
    #[error("serial connection error: {0}")]
    Link(#[source] EngineError),

    /// Detection failed in a way retrying cannot fix
    #[error("unable to detect device: {0}")]
    Detect(#[source] EngineError),

    /// No chip answered within the engine's attempt budget
    #[error("failed to detect device after {attempts} attempts: {last}")]
    DetectionExhausted {
        /// Attempts made
        attempts: u32,
        /// Failure of the final attempt
        #[source]
        last: EngineError,
    },

    /// The stub loader could not be started
    #[error("unable to run stub: {0}")]
    Stub(#[source] EngineError),

    /// The link could not be switched to the flashing baud rate
    #[error("unable to change baud rate: {0}")]
    Baud(#[source] EngineError),

    /// A flash image could not be read
    #[error("unable to read flash image: {0}")]
    Image(#[source] std::io::Error),

    /// Writing the flash failed
    #[error("failed to write flash: {0}")]
    Write(#[source] EngineError),

    /// The worker running the handler died
    #[error("flashing worker failed: {0}")]
    Worker(String),
}
