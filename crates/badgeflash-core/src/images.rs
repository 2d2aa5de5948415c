//! ESP flash image sets
//!
//! Images come from an ESP-IDF `flasher_args.json`:
//!
//! ```json
//! {
//!     "flash_files": {
//!         "0x1000": "bootloader/bootloader.bin",
//!         "0x8000": "partition_table/partition-table.bin",
//!         "0x10000": "badge.bin"
//!     },
//!     "app": { "offset": "0x10000", "file": "badge.bin" }
//! }
//! ```
//!
//! Paths under `flash_files` are relative to the directory holding the JSON
//! file. An override image replaces whatever `flash_files` lists at the
//! `app` offset and is used verbatim.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, FileKind};

/// The parts of `flasher_args.json` we use
#[derive(Debug, Deserialize)]
struct FlasherArgs {
    flash_files: HashMap<String, PathBuf>,
    app: AppEntry,
}

#[derive(Debug, Deserialize)]
struct AppEntry {
    offset: String,
}

/// Parse a flash offset with automatic base detection
///
/// Accepts `0x`/`0o`/`0b` prefixes (either case) and plain decimal, so
/// `"0x1000"` and `"4096"` are the same offset.
pub fn parse_offset(s: &str) -> Result<u32, ConfigError> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u32::from_str_radix(oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u32::from_str_radix(bin, 2)
    } else {
        t.parse::<u32>()
    };
    parsed.map_err(|_| ConfigError::InvalidOffset(s.to_owned()))
}

/// One image loaded into memory, ready to be written at `offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSegment {
    /// Flash offset in bytes
    pub offset: u32,
    /// Image contents
    pub data: Vec<u8>,
}

/// Validated mapping from flash offset to an existing image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashImageSet {
    images: BTreeMap<u32, PathBuf>,
}

impl FlashImageSet {
    /// Build a set, checking that every image exists
    ///
    /// Every missing file is reported, not just the first.
    pub fn new(images: BTreeMap<u32, PathBuf>) -> Result<Self, ConfigError> {
        let missing: Vec<ConfigError> = images
            .values()
            .filter(|path| !path.is_file())
            .map(|path| ConfigError::MissingFile {
                kind: FileKind::EspImage,
                path: path.clone(),
            })
            .collect();

        if missing.is_empty() {
            Ok(Self { images })
        } else {
            Err(ConfigError::Invalid(missing))
        }
    }

    /// Load and validate the images listed in a `flasher_args.json`
    pub fn from_flasher_args(
        json_path: impl AsRef<Path>,
        app_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let json_path = json_path.as_ref();
        let content =
            fs::read_to_string(json_path).map_err(|source| ConfigError::EspConfigUnreadable {
                path: json_path.to_path_buf(),
                source,
            })?;
        Self::from_flasher_args_str(&content, json_path, app_override)
    }

    /// Parse `flasher_args.json` content read from `json_path`
    pub fn from_flasher_args_str(
        content: &str,
        json_path: &Path,
        app_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let args: FlasherArgs =
            serde_json::from_str(content).map_err(|source| ConfigError::EspConfigInvalid {
                path: json_path.to_path_buf(),
                source,
            })?;

        let base = json_path.parent().unwrap_or_else(|| Path::new(""));

        let mut images = BTreeMap::new();
        for (offset, file) in &args.flash_files {
            images.insert(parse_offset(offset)?, base.join(file));
        }

        if let Some(image) = app_override {
            let offset = parse_offset(&args.app.offset)?;
            log::info!(
                "Overriding ESP app image at 0x{:x} with {}",
                offset,
                image.display()
            );
            images.insert(offset, image.to_path_buf());
        }

        Self::new(images)
    }

    /// Iterate over `(offset, path)` pairs in offset order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.images.iter().map(|(offset, path)| (*offset, path.as_path()))
    }

    /// Image path at `offset`, if any
    pub fn get(&self, offset: u32) -> Option<&Path> {
        self.images.get(&offset).map(PathBuf::as_path)
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the set has no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Read every image into memory
    ///
    /// Files were checked at startup, but they are read again for every
    /// board so a rebuilt image is picked up without restarting.
    pub fn load_segments(&self) -> io::Result<Vec<FlashSegment>> {
        self.iter()
            .map(|(offset, path)| {
                let data = fs::read(path)
                    .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
                Ok(FlashSegment { offset, data })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLASHER_ARGS: &str = r#"{
        "write_flash_args": ["--flash_mode", "dio"],
        "flash_settings": { "flash_mode": "dio", "flash_size": "4MB", "flash_freq": "40m" },
        "flash_files": {
            "0x1000": "bootloader/bootloader.bin",
            "32768": "partition_table/partition-table.bin",
            "0x10000": "badge.bin"
        },
        "app": { "offset": "0x10000", "file": "badge.bin" }
    }"#;

    fn populate(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir.join("bootloader")).unwrap();
        fs::create_dir_all(dir.join("partition_table")).unwrap();
        fs::write(dir.join("bootloader/bootloader.bin"), [0xE9, 0x02]).unwrap();
        fs::write(dir.join("partition_table/partition-table.bin"), [0xAA, 0x50]).unwrap();
        fs::write(dir.join("badge.bin"), [0xE9, 0x06, 0x02]).unwrap();
        let json = dir.join("flasher_args.json");
        fs::write(&json, FLASHER_ARGS).unwrap();
        json
    }

    #[test]
    fn test_parse_offset_bases() {
        assert_eq!(parse_offset("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_offset("0X1000").unwrap(), 0x1000);
        assert_eq!(parse_offset("4096").unwrap(), 4096);
        assert_eq!(parse_offset("0o10").unwrap(), 8);
        assert_eq!(parse_offset("0b101").unwrap(), 5);
        assert_eq!(parse_offset(" 0x10 ").unwrap(), 16);
        assert!(matches!(
            parse_offset("0xZZ"),
            Err(ConfigError::InvalidOffset(s)) if s == "0xZZ"
        ));
        assert!(parse_offset("").is_err());
    }

    #[test]
    fn test_load_flasher_args_relative_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let json = populate(dir.path());

        let set = FlashImageSet::from_flasher_args(&json, None).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.get(0x1000),
            Some(dir.path().join("bootloader/bootloader.bin").as_path())
        );
        assert_eq!(
            set.get(0x8000),
            Some(dir.path().join("partition_table/partition-table.bin").as_path())
        );

        let offsets: Vec<u32> = set.iter().map(|(offset, _)| offset).collect();
        assert_eq!(offsets, vec![0x1000, 0x8000, 0x10000]);
    }

    #[test]
    fn test_override_replaces_app_entry() {
        let dir = tempfile::tempdir().unwrap();
        let json = populate(dir.path());
        let custom = dir.path().join("custom-app.bin");
        fs::write(&custom, [0x01]).unwrap();

        let set = FlashImageSet::from_flasher_args(&json, Some(&custom)).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0x10000), Some(custom.as_path()));
    }

    #[test]
    fn test_missing_images_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        let json = populate(dir.path());
        fs::remove_file(dir.path().join("badge.bin")).unwrap();
        fs::remove_file(dir.path().join("bootloader/bootloader.bin")).unwrap();

        let err = FlashImageSet::from_flasher_args(&json, None).unwrap_err();
        let problems = err.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| matches!(
            p,
            ConfigError::MissingFile {
                kind: FileKind::EspImage,
                ..
            }
        )));
    }

    #[test]
    fn test_missing_or_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("flasher_args.json");
        assert!(matches!(
            FlashImageSet::from_flasher_args(&json, None),
            Err(ConfigError::EspConfigUnreadable { .. })
        ));

        fs::write(&json, "{ not json").unwrap();
        assert!(matches!(
            FlashImageSet::from_flasher_args(&json, None),
            Err(ConfigError::EspConfigInvalid { .. })
        ));

        fs::write(&json, r#"{"flash_files": {"zero": "a.bin"}, "app": {"offset": "0", "file": "a.bin"}}"#)
            .unwrap();
        assert!(matches!(
            FlashImageSet::from_flasher_args(&json, None),
            Err(ConfigError::InvalidOffset(_))
        ));
    }

    #[test]
    fn test_load_segments_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let json = populate(dir.path());
        let set = FlashImageSet::from_flasher_args(&json, None).unwrap();

        let segments = set.load_segments().unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].offset, 0x1000);
        assert_eq!(segments[0].data, vec![0xE9, 0x02]);
        assert_eq!(segments[2].offset, 0x10000);
        assert_eq!(segments[2].data, vec![0xE9, 0x06, 0x02]);
    }

    #[test]
    fn test_load_segments_reports_vanished_file() {
        let dir = tempfile::tempdir().unwrap();
        let json = populate(dir.path());
        let set = FlashImageSet::from_flasher_args(&json, None).unwrap();
        fs::remove_file(dir.path().join("badge.bin")).unwrap();

        let err = set.load_segments().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("badge.bin"));
    }
}
