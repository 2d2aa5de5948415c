//! badgeflash - Flash badge boards as they are plugged in
//!
//! Watches for USB serial devices and flashes every supported board that
//! appears, each on its own task so boards are flashed side by side.
//!
//! # Architecture
//!
//! - **Watcher** (`badgeflash-watch`) - reports already attached serial
//!   ports, then every port that appears later
//! - **Dispatcher** (`badgeflash-dispatch`) - classifies each device by
//!   USB id and starts its handler without waiting for it
//! - **Handlers** - advise the operator, run the external SAMD21 flasher,
//!   or detect and flash an ESP32 through a [`FlashEngine`]
//!
//! [`FlashEngine`]: badgeflash_esp::FlashEngine

mod cli;
mod daemon;
mod logging;

use std::sync::Arc;

use badgeflash_dispatch::{Dispatcher, HandlerRegistry};
use badgeflash_esp::EspflashEngine;
use badgeflash_watch::UsbSerialWatcher;
use clap::Parser;
use cli::Cli;
use daemon::Daemon;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    let config = match cli.settings().validate() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Exiting: {}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Flashing {} ESP image(s) and {}",
        config.esp_images.len(),
        config.sam.image.display()
    );

    let registry = HandlerRegistry::badge(&config, Arc::new(EspflashEngine::new()));
    let mut daemon = Daemon::new(Dispatcher::new(registry));

    let mut watcher = UsbSerialWatcher::start()?;
    log::info!("Waiting for devices");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for ^C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = daemon.run(&mut watcher, shutdown).await;
    if let Err(e) = &result {
        log::error!("Device watcher failed: {}", e);
    }

    if daemon.active() > 0 {
        log::warn!("Exiting: Waiting for threads to end (^C to force exit)");
    }
    tokio::select! {
        summary = daemon.finish() => log::info!("Done: {}", summary),
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Forcing exit");
            std::process::exit(130);
        }
    }

    result.map_err(Into::into)
}
