//! Turning watcher property sets into running handler tasks

use std::sync::Arc;

use badgeflash_core::{DeviceEvent, DeviceProperties};
use tokio::task::JoinHandle;

use crate::handler::Outcome;
use crate::registry::HandlerRegistry;

/// Classifies events and starts one task per device
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Dispatch through `registry`
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Start handling a device and return without waiting for it
    ///
    /// Property sets without usable USB ids are logged and dropped. Must be
    /// called from within a tokio runtime.
    pub fn dispatch(&self, props: DeviceProperties) -> Option<JoinHandle<Outcome>> {
        let event = match DeviceEvent::parse(&props) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Failed to handle USB serial device: {}", e);
                log::info!("Device properties:\n{}", props);
                return None;
            }
        };

        let handler = self
            .registry
            .classify(event.vendor_id(), event.product_id());
        log::debug!(
            "{:04x}:{:04x} at {:?} -> {} handler",
            event.vendor_id(),
            event.product_id(),
            event.device_path(),
            handler.kind()
        );

        Some(tokio::spawn(async move { handler.handle(event).await }))
    }
}
