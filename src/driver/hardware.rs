use super::sink::{InputSink, LogSink};
use crate::config::DriverConfig;
use crate::hal::mock::{MockCoprocessor, MockLines};
use crate::hal::rpi::{RpiI2c, RpiLines};
use crate::hal::{Accelerometer, BusError, I2cBus, InterruptLines, Mpu6050, Radio};
use tracing::info;

/// Everything the driver thread talks to, moved into it at spawn
pub struct Hardware {
    pub bus: Box<dyn I2cBus>,
    pub lines: Box<dyn InterruptLines>,
    pub accel: Option<Box<dyn Accelerometer>>,
    pub radio: Option<Box<dyn Radio>>,
    pub gamepad: Box<dyn InputSink>,
    pub keyboard: Box<dyn InputSink>,
}

impl Hardware {
    /// The board: I2C bus, GPIO interrupts and the MPU6050
    ///
    /// There is no nRF24 driver here; add one with [`Hardware::with_radio`], otherwise
    /// `nrf` stays false and its interrupt line is left unbound.
    pub fn raspberry_pi(config: &DriverConfig) -> Result<Self, BusError> {
        info!("Opening Raspberry Pi peripherals");
        Ok(Self {
            bus: Box::new(RpiI2c::open(config.i2c_bus, config.bus_timeout_ms)?),
            lines: Box::new(RpiLines::open()?),
            accel: Some(Box::new(Mpu6050::new(config.accel_address))),
            radio: None,
            gamepad: Box::new(LogSink::new("gamepad")),
            keyboard: Box::new(LogSink::new("keyboard")),
        })
    }

    /// Simulated co-processor and hand-driven interrupt lines
    pub fn simulated(avr: &MockCoprocessor, lines: MockLines) -> Self {
        info!("Using simulated co-processor");
        Self {
            bus: Box::new(avr.bus()),
            lines: Box::new(lines),
            accel: Some(Box::new(Mpu6050::new(Mpu6050::DEFAULT_ADDRESS))),
            radio: None,
            gamepad: Box::new(LogSink::new("gamepad")),
            keyboard: Box::new(LogSink::new("keyboard")),
        }
    }

    pub fn with_radio(mut self, radio: Box<dyn Radio>) -> Self {
        self.radio = Some(radio);
        self
    }

    pub fn with_gamepad(mut self, gamepad: Box<dyn InputSink>) -> Self {
        self.gamepad = gamepad;
        self
    }

    pub fn with_keyboard(mut self, keyboard: Box<dyn InputSink>) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn without_accelerometer(mut self) -> Self {
        self.accel = None;
        self
    }
}
