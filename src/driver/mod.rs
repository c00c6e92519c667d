//! Host side driver for the co-processor and the local controls
//!
//! Three roles cooperate through two queues:
//!
//! 1. Interrupt handlers store button levels and enqueue [`HwEvent::Irq`]
//! 2. [`driver_loop`] owns every button, axis and the I2C link, and runs on its own thread
//! 3. [`main_loop`] hands [`Event`]s to the application on the main thread
//!
//! ```text
//! GPIO / ticker / DriverHandle ──► HwEvent queue ──► Driver ──► Event queue ──► MainLoop
//!                                                      │
//!                                                      └──► watch<Status>
//! ```
//!
//! [`driver_handle`] ties the pieces together and is what applications use.

pub mod axis;
pub mod button;
pub mod driver_handle;
pub mod driver_loop;
pub mod event_queue;
pub mod events;
pub mod hardware;
pub mod main_loop;
pub mod sink;
pub mod status;

pub use driver_handle::DriverHandle;
pub use event_queue::{EventQueue, EventSender};
pub use events::{Axis, Button, Event, HwEvent};
pub use hardware::Hardware;
pub use main_loop::{Application, MainLoop};
pub use status::Status;

use crate::hal::BusError;

/// Errors surfacing from the driver lifecycle
///
/// Anything that happens while running is absorbed by the driver thread and reported
/// as an [`Event`]; these only come out of spawning and shutting down.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to initialize driver: {0}")]
    Initialization(String),

    #[error("Hardware error: {0}")]
    Hardware(#[from] BusError),

    /// The driver thread is gone
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to join driver task: {0}")]
    Join(String),
}
