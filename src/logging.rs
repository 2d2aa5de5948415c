//! Log output setup
//!
//! Records are rendered as `[badgeflash] @ <timestamp> <TAG>: <message>`.
//! Detection and success records get their own tags and stay visible at the
//! default verbosity.

use std::io::Write;

use badgeflash_core::targets;
use env_logger::fmt::style::{AnsiColor, Style};
use env_logger::Env;
use log::{Level, LevelFilter, Record};

/// Install the global logger
///
/// `RUST_LOG` directives are applied on top of `level`.
pub fn init(level: LevelFilter) {
    filters(level)
        .parse_env(Env::default())
        .format(|buf, record| {
            let (tag, style) = tag_for(record);
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[badgeflash] @ {} {style}{}{style:#}: {}",
                timestamp,
                tag,
                record.args()
            )
        })
        .init();
}

/// Builder filtering at `level`, with detection and success records kept
/// at info unless logging is off
fn filters(level: LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if level != LevelFilter::Off {
        for target in [targets::DETECT, targets::SUCCESS] {
            builder.filter_module(target, level.max(LevelFilter::Info));
        }
    }
    builder
}

/// Tag and colour for a record
fn tag_for(record: &Record<'_>) -> (&'static str, Style) {
    match record.target() {
        targets::DETECT => ("DETECT", AnsiColor::Cyan.on_default().bold()),
        targets::SUCCESS => ("SUCCESS", AnsiColor::Green.on_default().bold()),
        _ => {
            let style = match record.level() {
                Level::Error => AnsiColor::Red.on_default().bold(),
                Level::Warn => AnsiColor::Yellow.on_default(),
                Level::Info => Style::new(),
                Level::Debug | Level::Trace => AnsiColor::BrightBlack.on_default(),
            };
            (record.level().as_str(), style)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(target: &str, level: Level) -> &'static str {
        let args = format_args!("");
        let record = Record::builder()
            .target(target)
            .level(level)
            .args(args)
            .build();
        tag_for(&record).0
    }

    #[test]
    fn test_outcome_targets_get_their_own_tags() {
        assert_eq!(tag(targets::DETECT, Level::Info), "DETECT");
        assert_eq!(tag(targets::SUCCESS, Level::Info), "SUCCESS");
    }

    #[test]
    fn test_other_records_are_tagged_by_level() {
        assert_eq!(tag("badgeflash_dispatch::handlers", Level::Error), "ERROR");
        assert_eq!(tag("badgeflash_watch", Level::Warn), "WARN");
        assert_eq!(tag("badgeflash", Level::Debug), "DEBUG");
    }

    fn shown(level: LevelFilter, target: &str, record_level: Level) -> bool {
        let metadata = log::Metadata::builder()
            .target(target)
            .level(record_level)
            .build();
        log::Log::enabled(&filters(level).build(), &metadata)
    }

    #[test]
    fn test_outcomes_survive_quiet() {
        for target in [targets::DETECT, targets::SUCCESS] {
            assert!(shown(LevelFilter::Warn, target, Level::Info));
            assert!(shown(LevelFilter::Error, target, Level::Info));
            assert!(!shown(LevelFilter::Warn, target, Level::Debug));
        }
        assert!(!shown(LevelFilter::Warn, "badgeflash_dispatch", Level::Info));
        assert!(shown(LevelFilter::Warn, "badgeflash_dispatch", Level::Warn));
    }

    #[test]
    fn test_off_silences_outcomes() {
        for target in [targets::DETECT, targets::SUCCESS] {
            assert!(!shown(LevelFilter::Off, target, Level::Info));
        }
        assert!(!shown(LevelFilter::Off, "badgeflash", Level::Error));
    }

    #[test]
    fn test_verbose_keeps_outcomes() {
        assert!(shown(LevelFilter::Debug, targets::SUCCESS, Level::Info));
        assert!(shown(LevelFilter::Debug, "badgeflash_watch", Level::Debug));
    }
}
