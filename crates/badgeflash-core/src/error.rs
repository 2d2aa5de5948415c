//! Error types for badgeflash-core

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which required file a configuration problem refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// An image listed in the ESP `flasher_args.json`
    EspImage,
    /// The SAMD21 application image
    SamImage,
    /// The external SAMD21 flashing program
    SamFlasher,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EspImage => write!(f, "ESP binary image"),
            Self::SamImage => write!(f, "SAM application image"),
            Self::SamFlasher => write!(f, "SAM flashing program"),
        }
    }
}

/// Startup configuration errors
///
/// All of these are fatal: the daemon refuses to watch for devices until
/// every required file is present.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The ESP programming configuration could not be read
    #[error("Missing ESP programming configuration: {}", path.display())]
    EspConfigUnreadable {
        /// Path to the `flasher_args.json`
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The ESP programming configuration is not valid JSON of the expected shape
    #[error("Invalid ESP programming configuration {}: {source}", path.display())]
    EspConfigInvalid {
        /// Path to the `flasher_args.json`
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// A flash offset could not be parsed as a number
    #[error("Invalid flash offset {0:?}")]
    InvalidOffset(String),

    /// A required file does not exist
    #[error("Missing {kind}: {}", path.display())]
    MissingFile {
        /// What the file is used for
        kind: FileKind,
        /// Path that was checked
        path: PathBuf,
    },

    /// One or more of the above, already reported individually
    #[error("Missing required files ({} problem{})", .0.len(), if .0.len() == 1 { "" } else { "s" })]
    Invalid(Vec<ConfigError>),
}

impl ConfigError {
    /// Flatten nested [`ConfigError::Invalid`] lists into single problems
    pub fn problems(&self) -> Vec<&ConfigError> {
        match self {
            Self::Invalid(errors) => errors.iter().flat_map(|e| e.problems()).collect(),
            other => vec![other],
        }
    }
}

/// Per-device property problems
///
/// These only ever drop the offending device event; they never stop the
/// daemon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A required property is missing from the device descriptor
    #[error("missing device property {0}")]
    MissingProperty(&'static str),

    /// A USB identifier is not a 16-bit hexadecimal number
    #[error("invalid {key} {value:?}: expected a 16-bit hex value")]
    InvalidId {
        /// Property name
        key: &'static str,
        /// Raw property value
        value: String,
    },
}
