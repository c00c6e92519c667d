//! Hardware seams used by the driver thread
//!
//! The driver never talks to `rppal` directly. Everything it needs from the board
//! goes through the traits in this module:
//!
//! - [`I2cBus`] - master transactions on the bus shared by the co-processor and the
//!   accelerometer
//! - [`InterruptLines`] - GPIO lines that invoke a handler on every edge
//! - [`Accelerometer`] - MPU6050 sample reads
//! - [`Radio`] - NRF24L01 data-ready servicing
//!
//! [`rpi`] implements the bus and the lines on a Raspberry Pi, [`mock`] implements all
//! of them in software for running off-device and for tests.

pub mod mock;
pub mod rpi;

use thiserror::Error;

/// Errors reported by a bus transaction or by pin setup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Device 0x{address:02x} did not acknowledge")]
    Nack { address: u16 },

    #[error("Transaction with 0x{address:02x} timed out")]
    Timeout { address: u16 },

    #[error("Bus I/O error: {0}")]
    Io(String),

    #[error("GPIO error: {0}")]
    Gpio(String),
}

/// Interrupt callback, invoked with `true` when the line went high
pub type IrqHandler = Box<dyn FnMut(bool) + Send + 'static>;

/// Address based I2C master
pub trait I2cBus: Send {
    /// Writes `bytes` to the device, no read back
    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError>;

    /// Writes `request` and reads the reply into `response`
    ///
    /// Returns how many bytes the device actually delivered.
    fn write_read(
        &mut self,
        address: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, BusError>;
}

/// Edge triggered GPIO inputs
pub trait InterruptLines: Send {
    /// Binds `handler` to both edges of `pin`
    ///
    /// The handler runs in interrupt context: it must not block and must not touch
    /// anything but atomics and queue senders.
    fn bind(&mut self, pin: u8, handler: IrqHandler) -> Result<(), BusError>;

    /// Samples the current level of a bound pin
    fn level(&self, pin: u8) -> Result<bool, BusError>;
}

/// Raw accelerometer sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccelData {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccelData {
    /// Big-endian register layout as delivered by the MPU6050
    pub fn from_registers(buffer: &[u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([buffer[0], buffer[1]]),
            y: i16::from_be_bytes([buffer[2], buffer[3]]),
            z: i16::from_be_bytes([buffer[4], buffer[5]]),
        }
    }
}

pub trait Accelerometer: Send {
    fn reset(&mut self, bus: &mut dyn I2cBus) -> Result<(), BusError>;

    fn read_accel(&mut self, bus: &mut dyn I2cBus) -> Result<AccelData, BusError>;
}

/// MPU6050 on the shared bus
#[derive(Debug, Clone)]
pub struct Mpu6050 {
    address: u16,
}

impl Mpu6050 {
    pub const DEFAULT_ADDRESS: u16 = 0x68;

    const REG_ACCEL: u8 = 0x3b;
    const REG_POWER: u8 = 0x6b;

    pub fn new(address: u16) -> Self {
        Self { address }
    }
}

impl Accelerometer for Mpu6050 {
    fn reset(&mut self, bus: &mut dyn I2cBus) -> Result<(), BusError> {
        bus.write(self.address, &[Self::REG_POWER, 0x00])
    }

    fn read_accel(&mut self, bus: &mut dyn I2cBus) -> Result<AccelData, BusError> {
        let mut buffer = [0u8; 6];
        let read = bus.write_read(self.address, &[Self::REG_ACCEL], &mut buffer)?;
        if read < buffer.len() {
            return Err(BusError::Io(format!(
                "short accelerometer read: {} of {} bytes",
                read,
                buffer.len()
            )));
        }
        Ok(AccelData::from_registers(&buffer))
    }
}

/// NRF24L01 radio, serviced when its data-ready line fires
pub trait Radio: Send {
    fn handle_irq(&mut self) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accel_registers_are_big_endian() {
        let data = AccelData::from_registers(&[0x01, 0x02, 0xff, 0xfe, 0x80, 0x00]);
        assert_eq!(data.x, 0x0102);
        assert_eq!(data.y, -2);
        assert_eq!(data.z, i16::MIN);
    }
}
