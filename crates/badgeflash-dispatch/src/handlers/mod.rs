//! Concrete handlers

mod advisory;
mod esp;
mod sam;
mod unknown;

pub use advisory::AdvisoryHandler;
pub use esp::{EspBridgeHandler, ACCEPTED_INTERFACES};
pub use sam::SamFlashHandler;
pub use unknown::UnknownHandler;
