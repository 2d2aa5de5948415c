//! SAMD21 boards flashed through an external program
//!
//! The flasher is queried for board information first; only when that
//! succeeds is the image written. Each step is a separate invocation bounded
//! by the configured timeout, and neither is retried.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use badgeflash_core::{targets, DeviceEvent, SamConfig};

use crate::error::FlashError;
use crate::handler::{Handler, HandlerKind, Outcome};
use crate::process::{CommandRunner, Invocation, Subprocess};

/// Keys of the information query worth reporting
const INFO_KEYS: &[&str] = &["Device", "Chip ID"];

/// Flashes a board by running an external flashing program
#[derive(Debug, Clone)]
pub struct SamFlashHandler<R: CommandRunner = Subprocess> {
    flasher: PathBuf,
    image: PathBuf,
    timeout: Duration,
    runner: R,
}

impl SamFlashHandler {
    /// Handler running the configured flasher as a child process
    pub fn new(config: &SamConfig) -> Self {
        Self::with_runner(config, Subprocess)
    }
}

impl<R: CommandRunner> SamFlashHandler<R> {
    /// Handler running the flasher through `runner`
    pub fn with_runner(config: &SamConfig, runner: R) -> Self {
        Self {
            flasher: config.flasher.clone(),
            image: config.image.clone(),
            timeout: config.timeout,
            runner,
        }
    }

    fn info_query(&self, path: &str) -> Invocation {
        Invocation::new(&self.flasher, self.timeout)
            .arg(format!("--port={}", path))
            .arg("--info")
            .capture_stdout()
    }

    fn flash(&self, path: &str) -> Invocation {
        Invocation::new(&self.flasher, self.timeout)
            .arg(format!("--port={}", path))
            .arg("--erase")
            .arg("--write")
            .arg("--verify")
            .arg(&self.image)
            .arg("--boot=1")
    }

    async fn program(&self, path: &str) -> Result<(), FlashError> {
        let info = self
            .runner
            .run(&self.info_query(path))
            .await
            .map_err(FlashError::InfoQuery)?;
        for (key, value) in parse_info(&info) {
            log::debug!("{}: {}", key, value);
        }

        self.runner
            .run(&self.flash(path))
            .await
            .map_err(FlashError::Program)?;
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> Handler for SamFlashHandler<R> {
    fn kind(&self) -> HandlerKind {
        HandlerKind::ExternalProcessFlash
    }

    async fn handle(&self, event: DeviceEvent) -> Outcome {
        let Some(path) = event.device_path() else {
            log::error!("Unable to get device name for {}", event.model());
            return Outcome::Failed(FlashError::MissingDevicePath);
        };

        log::info!(target: targets::DETECT, "Detected programmable Arduino at {:?}", path);

        match self.program(path).await {
            Ok(()) => {
                log::info!(target: targets::SUCCESS, "Finished flashing Arduino at {:?}", path);
                Outcome::Flashed
            }
            Err(e) => {
                log::error!("Arduino at {:?}: {}", path, e);
                Outcome::Failed(e)
            }
        }
    }
}

/// Pick the interesting `key: value` lines out of the info query output
///
/// Lines that do not split into exactly one key and one value are skipped.
fn parse_info(output: &str) -> Vec<(&str, &str)> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.trim(), value.trim())),
                _ => None,
            }
        })
        .filter(|(key, _)| INFO_KEYS.contains(key))
        .collect()
}
