//! CLI argument parsing

use std::path::PathBuf;
use std::time::Duration;

use badgeflash_core::config::{
    DEFAULT_ESP_JSON, DEFAULT_SAM_FLASHER, DEFAULT_SAM_FLASHER_TIMEOUT, DEFAULT_SAM_IMAGE,
};
use badgeflash_core::Settings;
use clap::{ArgAction, Parser};
use log::LevelFilter;

/// Levels from quietest to loudest
const LEVELS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];

/// Position of the default level (warn) in [`LEVELS`]
const DEFAULT_LEVEL: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "badgeflash")]
#[command(
    author,
    version,
    about = "Flash badge boards as they are plugged in",
    long_about = "Watches for USB serial devices and flashes every supported board that \
                  appears: SAMD21 coprocessors through an external flasher and ESP32 \
                  modules behind a CP2105 bridge. Runs until interrupted."
)]
pub struct Cli {
    /// More output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Less output (-q, -qq)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    #[command(flatten)]
    pub images: ImageArgs,
}

/// Images and tools used for flashing
#[derive(clap::Args, Debug, Clone)]
pub struct ImageArgs {
    /// ESP-IDF flasher_args.json describing the ESP32 images
    #[arg(long, env = "ESP_JSON", default_value = DEFAULT_ESP_JSON)]
    pub esp_json: PathBuf,

    /// Flash this image instead of the application listed in flasher_args.json
    #[arg(long, env = "ESP_IMAGE_OVERRIDE")]
    pub esp_image_override: Option<PathBuf>,

    /// SAMD21 application image
    #[arg(long, env = "SAM_IMAGE", default_value = DEFAULT_SAM_IMAGE)]
    pub sam_image: PathBuf,

    /// External SAMD21 flashing program
    #[arg(long, env = "SAM_FLASHER", default_value = DEFAULT_SAM_FLASHER)]
    pub sam_flasher: PathBuf,

    /// Seconds each run of the SAMD21 flasher may take before it is killed
    #[arg(
        long,
        env = "SAM_FLASHER_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = DEFAULT_SAM_FLASHER_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sam_flasher_timeout: u64,
}

impl Cli {
    /// Log level after applying -v and -q to the default of warn
    pub fn log_level(&self) -> LevelFilter {
        let index = DEFAULT_LEVEL + i32::from(self.verbose) - i32::from(self.quiet);
        LEVELS[index.clamp(0, LEVELS.len() as i32 - 1) as usize]
    }

    /// Unvalidated daemon settings
    pub fn settings(&self) -> Settings {
        Settings {
            esp_json: self.images.esp_json.clone(),
            esp_image_override: self.images.esp_image_override.clone(),
            sam_image: self.images.sam_image.clone(),
            sam_flasher: self.images.sam_flasher.clone(),
            sam_flasher_timeout: Duration::from_secs(self.images.sam_flasher_timeout),
        }
    }
}
