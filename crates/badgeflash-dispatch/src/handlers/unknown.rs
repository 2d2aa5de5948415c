//! Devices nobody registered a handler for

use async_trait::async_trait;
use badgeflash_core::DeviceEvent;

use crate::handler::{Handler, HandlerKind, Outcome};

/// Logs the device and moves on
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownHandler;

#[async_trait]
impl Handler for UnknownHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Unknown
    }

    async fn handle(&self, event: DeviceEvent) -> Outcome {
        log::warn!("Ignoring unknown device: {}", event.model());
        Outcome::Ignored
    }
}
