//! Daemon configuration
//!
//! [`Settings`] is what the operator asked for (flags or environment);
//! [`DaemonConfig`] is the validated, immutable result. It is built once in
//! `main` and handed to the handlers explicitly.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, FileKind};
use crate::images::FlashImageSet;

/// Default location of the ESP-IDF `flasher_args.json`
pub const DEFAULT_ESP_JSON: &str = "out/esp32/flasher_args.json";
/// Default SAMD21 application image
pub const DEFAULT_SAM_IMAGE: &str = "out/samd21/io_coprocessor.bin";
/// Default external SAMD21 flashing program
pub const DEFAULT_SAM_FLASHER: &str = "external/bossac/bossac";
/// The SAM flasher copes badly with boards being unplugged, so every
/// invocation is bounded by this wall-clock timeout
pub const DEFAULT_SAM_FLASHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Unvalidated configuration sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path to the ESP `flasher_args.json`
    pub esp_json: PathBuf,
    /// Replacement for the ESP application image
    pub esp_image_override: Option<PathBuf>,
    /// SAMD21 application image
    pub sam_image: PathBuf,
    /// External SAMD21 flashing program
    pub sam_flasher: PathBuf,
    /// Wall-clock timeout for each flasher invocation
    pub sam_flasher_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            esp_json: PathBuf::from(DEFAULT_ESP_JSON),
            esp_image_override: None,
            sam_image: PathBuf::from(DEFAULT_SAM_IMAGE),
            sam_flasher: PathBuf::from(DEFAULT_SAM_FLASHER),
            sam_flasher_timeout: DEFAULT_SAM_FLASHER_TIMEOUT,
        }
    }
}

/// SAMD21 flashing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamConfig {
    /// Application image written to the board
    pub image: PathBuf,
    /// External flashing program
    pub flasher: PathBuf,
    /// Timeout applied to each flasher invocation
    pub timeout: Duration,
}

/// Validated daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Images written to ESP32 boards
    pub esp_images: FlashImageSet,
    /// SAMD21 flashing parameters
    pub sam: SamConfig,
}

impl Settings {
    /// Validate every configured file
    ///
    /// Each problem is logged at error level as it is found so the operator
    /// sees the full list at once; the returned error only summarises them.
    pub fn validate(self) -> Result<DaemonConfig, ConfigError> {
        let mut problems = Vec::new();

        let esp_images = match FlashImageSet::from_flasher_args(
            &self.esp_json,
            self.esp_image_override.as_deref(),
        ) {
            Ok(images) => Some(images),
            Err(e) => {
                problems.extend(flatten(e));
                None
            }
        };

        if !self.sam_image.is_file() {
            problems.push(ConfigError::MissingFile {
                kind: FileKind::SamImage,
                path: self.sam_image.clone(),
            });
        }
        if !self.sam_flasher.is_file() {
            problems.push(ConfigError::MissingFile {
                kind: FileKind::SamFlasher,
                path: self.sam_flasher.clone(),
            });
        }

        for problem in &problems {
            log::error!("{}", problem);
        }

        match esp_images {
            Some(esp_images) if problems.is_empty() => Ok(DaemonConfig {
                esp_images,
                sam: SamConfig {
                    image: self.sam_image,
                    flasher: self.sam_flasher,
                    timeout: self.sam_flasher_timeout,
                },
            }),
            _ => Err(ConfigError::Invalid(problems)),
        }
    }
}

fn flatten(err: ConfigError) -> Vec<ConfigError> {
    match err {
        ConfigError::Invalid(errors) => errors.into_iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}
