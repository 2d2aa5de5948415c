//! badgeflash-dispatch - Classification and per-device handling
//!
//! Every serial device the watcher reports goes through the same steps:
//!
//! 1. [`Dispatcher::dispatch`] parses the property set into a
//!    [`DeviceEvent`](badgeflash_core::DeviceEvent)
//! 2. [`HandlerRegistry::classify`] picks a [`Handler`] by exact
//!    `(vendor, product)` match
//! 3. the handler runs on its own task, so a slow board never holds up
//!    the next one
//!
//! Handlers report how the device ended up as an [`Outcome`]; failures are
//! contained to the device they happened on.

#![warn(missing_docs)]

#[cfg(test)]
mod capture;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod process;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use error::{FlashError, ProcessError};
pub use handler::{Handler, HandlerKind, Outcome};
pub use process::{CommandRunner, Invocation, Subprocess};
pub use registry::{ids, HandlerRegistry, HandlerRegistryBuilder};
