//! ESP32 boards behind a CP2105 USB-UART bridge
//!
//! The bridge exposes two UARTs; only the one wired to the ESP32 is
//! flashed. A run opens the port once, tries to detect the chip a bounded
//! number of times, then uploads the stub and writes every image in one
//! pass. The port is closed when the run's [`Session`] is dropped, whichever
//! way the run ends.

use std::sync::Arc;

use async_trait::async_trait;
use badgeflash_core::{targets, DeviceEvent, FlashImageSet};
use badgeflash_esp::{
    read_identity, ChipInfo, EngineError, FlashEngine, WriteOptions, FLASH_BAUD,
};

use crate::error::FlashError;
use crate::handler::{Handler, HandlerKind, Outcome};

/// Bridge interfaces connected to the ESP32
pub const ACCEPTED_INTERFACES: &[u8] = &[0];

/// Detects and flashes an ESP32 through an in-process [`FlashEngine`]
pub struct EspBridgeHandler<E: FlashEngine> {
    engine: Arc<E>,
    images: Arc<FlashImageSet>,
}

impl<E: FlashEngine> EspBridgeHandler<E> {
    /// Flash `images` using `engine`
    pub fn new(engine: Arc<E>, images: FlashImageSet) -> Self {
        Self {
            engine,
            images: Arc::new(images),
        }
    }
}

#[async_trait]
impl<E: FlashEngine> Handler for EspBridgeHandler<E> {
    fn kind(&self) -> HandlerKind {
        HandlerKind::BridgeDetectAndFlash
    }

    async fn handle(&self, event: DeviceEvent) -> Outcome {
        match event.interface() {
            Some(interface) if ACCEPTED_INTERFACES.contains(&interface) => {}
            _ => {
                log::debug!(
                    "Skipping unattached CP2105 UART interface {:?} at {:?}",
                    event.interface(),
                    event.device_path()
                );
                return Outcome::Skipped;
            }
        }

        let Some(path) = event.device_path().map(str::to_owned) else {
            log::error!("Unable to get device name for {}", event.model());
            return Outcome::Failed(FlashError::MissingDevicePath);
        };

        log::info!("Detected CP2105 USB-UART at {:?}", path);

        let engine = Arc::clone(&self.engine);
        let images = Arc::clone(&self.images);
        let result =
            tokio::task::spawn_blocking(move || flash_blocking(engine.as_ref(), &images, &path))
                .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(FlashError::Worker(e.to_string())),
        }
    }
}

/// An open connection to one board
///
/// Dropping the session is the only place the port is released.
struct Session<'a, E: FlashEngine> {
    engine: &'a E,
    path: &'a str,
    port: E::Port,
}

impl<E: FlashEngine> Drop for Session<'_, E> {
    fn drop(&mut self) {
        log::debug!("Releasing serial connection to {:?}", self.path);
    }
}

/// Result of the detection loop
#[derive(Debug)]
enum Detection {
    /// A chip answered
    Found { chip: ChipInfo, attempt: u32 },
    /// The link failed and retrying is pointless
    Aborted(EngineError),
    /// Every attempt missed
    Exhausted { attempts: u32, last: EngineError },
}

impl<E: FlashEngine> Session<'_, E> {
    fn detect_with_retries(&mut self) -> Detection {
        let attempts = self.engine.connect_attempts().max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.engine.detect_chip(&mut self.port) {
                Ok(chip) => return Detection::Found { chip, attempt },
                Err(e) if e.is_detection_miss() => {
                    log::warn!(
                        "Unable to detect ESP device at {:?} ({}/{}): {}",
                        self.path,
                        attempt,
                        attempts,
                        e
                    );
                    if attempt == 1 {
                        log::info!("Hold down ESP BOOT button then press ESP EN to reset");
                    }
                    last = Some(e);
                }
                Err(e) => return Detection::Aborted(e),
            }
        }

        match last {
            Some(last) => Detection::Exhausted { attempts, last },
            None => Detection::Aborted(EngineError::NoResponse(
                "no detection attempt was made".to_owned(),
            )),
        }
    }

    fn flash(&mut self, chip: &ChipInfo, images: &FlashImageSet) -> Result<(), FlashError> {
        match read_identity(self.engine, &mut self.port, chip) {
            Ok(identity) => log::debug!("{} at {:?}: {}", chip, self.path, identity),
            Err(e) => log::debug!("Unable to read {} identity: {}", chip, e),
        }

        self.engine
            .run_stub(&mut self.port, chip)
            .map_err(FlashError::Stub)?;
        log::info!("Download stub running on ESP at {:?}", self.path);
        self.engine
            .change_baud(&mut self.port, FLASH_BAUD)
            .map_err(FlashError::Baud)?;

        let segments = images.load_segments().map_err(FlashError::Image)?;
        log::info!("Flashing application image to ESP at {:?}", self.path);
        log::debug!(
            "Writing {} segments ({} bytes) to {:?}",
            segments.len(),
            segments.iter().map(|s| s.data.len()).sum::<usize>(),
            self.path
        );
        self.engine
            .write_flash(&mut self.port, &segments, &WriteOptions::production())
            .map_err(FlashError::Write)
    }
}

fn flash_blocking<E: FlashEngine>(engine: &E, images: &FlashImageSet, path: &str) -> Outcome {
    let port = match engine.open(path) {
        Ok(port) => port,
        Err(e) => {
            log::error!("Unable to open ESP serial port {:?}: {}", path, e);
            return Outcome::Failed(FlashError::OpenPort(e));
        }
    };
    let mut session = Session { engine, path, port };

    log::info!("Attempting to scan for ESP device");

    let chip = match session.detect_with_retries() {
        Detection::Found { chip, attempt } => {
            log::debug!("{} answered on attempt {}", chip, attempt);
            chip
        }
        Detection::Aborted(e) if e.is_link_failure() => {
            log::error!("Serial connection to {:?} failed: {}", path, e);
            log::warn!("Was the device unplugged?");
            return Outcome::Failed(FlashError::Link(e));
        }
        Detection::Aborted(e) => {
            log::error!("Unable to detect ESP device at {:?}: {}", path, e);
            return Outcome::Failed(FlashError::Detect(e));
        }
        Detection::Exhausted { attempts, last } => {
            let e = FlashError::DetectionExhausted { attempts, last };
            log::error!("ESP at {:?}: {}", path, e);
            return Outcome::Failed(e);
        }
    };

    log::info!(target: targets::DETECT, "Detected ESP device at {:?} ({})", path, chip);

    match session.flash(&chip, images) {
        Ok(()) => {
            log::info!(target: targets::SUCCESS, "Finished flashing ESP at {:?}", path);
            Outcome::Flashed
        }
        Err(e) => {
            log::error!("ESP at {:?}: {}", path, e);
            Outcome::Failed(e)
        }
    }
}
