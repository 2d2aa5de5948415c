//! Records log output so handler tests can check how a run was reported
//!
//! Tests share one process-wide logger, so each test picks a device path
//! of its own and only looks at the records that mention it.

use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// One recorded log line
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub target: String,
    pub message: String,
}

static RECORDS: Mutex<Vec<Captured>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();

struct Capture;

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let captured = Captured {
            level: record.level(),
            target: record.target().to_owned(),
            message: record.args().to_string(),
        };
        if let Ok(mut records) = RECORDS.lock() {
            records.push(captured);
        }
    }

    fn flush(&self) {}
}

/// Start capturing; later calls do nothing
pub fn install() {
    INSTALL.call_once(|| {
        if log::set_logger(&Capture).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

/// Every record whose message contains `needle`
pub fn mentioning(needle: &str) -> Vec<Captured> {
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.message.contains(needle))
        .cloned()
        .collect()
}

/// Records logged under `target` that mention `needle`
pub fn under(target: &str, needle: &str) -> Vec<Captured> {
    mentioning(needle)
        .into_iter()
        .filter(|r| r.target == target)
        .collect()
}
