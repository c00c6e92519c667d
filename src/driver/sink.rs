//! Virtual input device boundary
//!
//! The driver mirrors reported button and axis changes onto a virtual gamepad and
//! synthesized key presses onto a virtual keyboard. How those devices reach the OS is
//! not the driver's concern; it only needs something that accepts discrete key and
//! absolute-axis writes keyed by Linux input-event codes.

use thiserror::Error;
use tracing::debug;

/// Linux input-event codes used by the built-in button and axis tables
pub mod codes {
    pub const KEY_RESERVED: u16 = 0;

    pub const BTN_SOUTH: u16 = 304;
    pub const BTN_EAST: u16 = 305;
    pub const BTN_NORTH: u16 = 307;
    pub const BTN_WEST: u16 = 308;
    pub const BTN_TL: u16 = 310;
    pub const BTN_TR: u16 = 311;
    pub const BTN_SELECT: u16 = 314;
    pub const BTN_START: u16 = 315;
    pub const BTN_MODE: u16 = 316;
    pub const BTN_THUMBL: u16 = 317;

    pub const ABS_X: u16 = 0;
    pub const ABS_Y: u16 = 1;
    pub const ABS_RX: u16 = 3;
    pub const ABS_RY: u16 = 4;
    pub const ABS_HAT0X: u16 = 16;
    pub const ABS_HAT0Y: u16 = 17;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Virtual device write failed: {0}")]
    Write(String),
}

pub trait InputSink: Send {
    fn key(&mut self, code: u16, pressed: bool) -> Result<(), SinkError>;

    fn abs(&mut self, code: u16, value: i32) -> Result<(), SinkError>;
}

/// Sink used when no virtual device is available, traces every write
#[derive(Debug, Default)]
pub struct LogSink {
    name: &'static str,
}

impl LogSink {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl InputSink for LogSink {
    fn key(&mut self, code: u16, pressed: bool) -> Result<(), SinkError> {
        debug!("[{}] key {} {}", self.name, code, if pressed { "down" } else { "up" });
        Ok(())
    }

    fn abs(&mut self, code: u16, value: i32) -> Result<(), SinkError> {
        debug!("[{}] abs {} = {}", self.name, code, value);
        Ok(())
    }
}
