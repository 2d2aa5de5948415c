//! Static classification of devices by USB id

use std::collections::HashMap;
use std::sync::Arc;

use badgeflash_core::DaemonConfig;
use badgeflash_esp::FlashEngine;

use crate::handler::Handler;
use crate::handlers::{AdvisoryHandler, EspBridgeHandler, SamFlashHandler, UnknownHandler};

/// USB ids of the devices found on a badge
pub mod ids {
    /// Arduino SA
    pub const ARDUINO_VID: u16 = 0x2341;
    /// Arduino MKR Zero in its bootloader
    pub const MKR_ZERO_BOOTLOADER_PID: u16 = 0x004f;
    /// Arduino MKR Zero running its application
    pub const MKR_ZERO_PID: u16 = 0x804f;
    /// Silicon Labs
    pub const SILABS_VID: u16 = 0x10c4;
    /// CP2105 dual USB-UART bridge
    pub const CP2105_PID: u16 = 0xea70;
}

/// Maps `(vendor, product)` to the handler for that device
///
/// Lookups are exact; anything not registered gets the fallback handler.
pub struct HandlerRegistry {
    handlers: HashMap<(u16, u16), Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

impl HandlerRegistry {
    /// Start an empty registry
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
            fallback: Arc::new(UnknownHandler),
        }
    }

    /// The registry for a badge: SAMD21 coprocessor and ESP32
    pub fn badge<E: FlashEngine>(config: &DaemonConfig, engine: Arc<E>) -> Self {
        Self::builder()
            .register(
                ids::ARDUINO_VID,
                ids::MKR_ZERO_BOOTLOADER_PID,
                SamFlashHandler::new(&config.sam),
            )
            .register(
                ids::ARDUINO_VID,
                ids::MKR_ZERO_PID,
                AdvisoryHandler::arduino_live(),
            )
            .register(
                ids::SILABS_VID,
                ids::CP2105_PID,
                EspBridgeHandler::new(engine, config.esp_images.clone()),
            )
            .build()
    }

    /// Handler for a device
    pub fn classify(&self, vendor_id: u16, product_id: u16) -> Arc<dyn Handler> {
        let handler = self
            .handlers
            .get(&(vendor_id, product_id))
            .unwrap_or(&self.fallback);
        Arc::clone(handler)
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`HandlerRegistry`]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<(u16, u16), Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

impl HandlerRegistryBuilder {
    /// Handle `(vendor_id, product_id)` with `handler`
    pub fn register(
        mut self,
        vendor_id: u16,
        product_id: u16,
        handler: impl Handler + 'static,
    ) -> Self {
        self.handlers
            .insert((vendor_id, product_id), Arc::new(handler));
        self
    }

    /// Handle unregistered devices with `handler`
    pub fn fallback(mut self, handler: impl Handler + 'static) -> Self {
        self.fallback = Arc::new(handler);
        self
    }

    /// Finish building
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
            fallback: self.fallback,
        }
    }
}
