//! Boards that have to be put into programming mode by hand

use async_trait::async_trait;
use badgeflash_core::DeviceEvent;

use crate::handler::{Handler, HandlerKind, Outcome};

/// Tells the operator how to get a board into a flashable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryHandler {
    warning: String,
    steps: Vec<String>,
}

impl AdvisoryHandler {
    /// A warning followed by the steps to take
    pub fn new(warning: impl Into<String>, steps: &[&str]) -> Self {
        Self {
            warning: warning.into(),
            steps: steps.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Arduino MKR Zero running its application rather than the bootloader
    pub fn arduino_live() -> Self {
        Self::new(
            "Arduino detected but it needs to be put in program mode",
            &[
                "Press the SAM RST button twice quickly",
                "LED6 should glow blue once in programming mode",
            ],
        )
    }

    /// The advice, warning first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.warning.as_str()).chain(self.steps.iter().map(String::as_str))
    }
}

#[async_trait]
impl Handler for AdvisoryHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Informational
    }

    async fn handle(&self, event: DeviceEvent) -> Outcome {
        match event.device_path() {
            Some(path) => log::warn!("{} ({})", self.warning, path),
            None => log::warn!("{}", self.warning),
        }
        for step in &self.steps {
            log::info!("{}", step);
        }
        Outcome::Advised
    }
}
