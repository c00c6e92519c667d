//! Raspberry Pi implementation of the hardware seams, backed by `rppal`

use super::{BusError, I2cBus, InterruptLines, IrqHandler};
use rppal::gpio::{Event, Gpio, InputPin, Trigger};
use rppal::i2c::{self, I2c};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const EREMOTEIO: i32 = 121;
const ETIMEDOUT: i32 = 110;

/// The Pi's hardware I2C controller
pub struct RpiI2c {
    i2c: I2c,
    address: Option<u16>,
}

impl RpiI2c {
    /// Opens `/dev/i2c-<bus>` with a transaction timeout in milliseconds
    pub fn open(bus: u8, timeout_ms: u32) -> Result<Self, BusError> {
        info!("Opening I2C bus {} (timeout {}ms)", bus, timeout_ms);
        let i2c = I2c::with_bus(bus).map_err(|e| BusError::Io(e.to_string()))?;
        if let Err(e) = i2c.set_timeout(timeout_ms) {
            // not every controller supports it, the kernel default still applies
            warn!("Unable to set I2C timeout: {}", e);
        }
        Ok(Self { i2c, address: None })
    }

    fn select(&mut self, address: u16) -> Result<(), BusError> {
        if self.address != Some(address) {
            self.i2c
                .set_slave_address(address)
                .map_err(|e| map_error(address, e))?;
            self.address = Some(address);
        }
        Ok(())
    }
}

impl I2cBus for RpiI2c {
    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        self.select(address)?;
        let written = self.i2c.write(bytes).map_err(|e| map_error(address, e))?;
        if written != bytes.len() {
            return Err(BusError::Io(format!(
                "short write to 0x{:02x}: {} of {} bytes",
                address,
                written,
                bytes.len()
            )));
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, BusError> {
        self.select(address)?;
        self.i2c
            .write_read(request, response)
            .map_err(|e| map_error(address, e))?;
        Ok(response.len())
    }
}

fn map_error(address: u16, error: i2c::Error) -> BusError {
    match &error {
        i2c::Error::Io(io) => match io.raw_os_error() {
            Some(EREMOTEIO) => BusError::Nack { address },
            Some(ETIMEDOUT) => BusError::Timeout { address },
            _ => BusError::Io(error.to_string()),
        },
        _ => BusError::Io(error.to_string()),
    }
}

/// GPIO lines with asynchronous interrupts
///
/// Pins are kept alive here; dropping the struct disarms every handler.
pub struct RpiLines {
    gpio: Gpio,
    pins: HashMap<u8, InputPin>,
}

impl RpiLines {
    pub fn open() -> Result<Self, BusError> {
        let gpio = Gpio::new().map_err(|e| BusError::Gpio(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
        })
    }
}

impl InterruptLines for RpiLines {
    fn bind(&mut self, pin: u8, mut handler: IrqHandler) -> Result<(), BusError> {
        let mut input = self
            .gpio
            .get(pin)
            .map_err(|e| BusError::Gpio(format!("pin {}: {}", pin, e)))?
            .into_input_pullup();
        input
            .set_async_interrupt(Trigger::Both, None, move |event: Event| {
                handler(event.trigger == Trigger::RisingEdge)
            })
            .map_err(|e| BusError::Gpio(format!("pin {}: {}", pin, e)))?;
        debug!("Bound interrupt handler to GPIO {}", pin);
        self.pins.insert(pin, input);
        Ok(())
    }

    fn level(&self, pin: u8) -> Result<bool, BusError> {
        self.pins
            .get(&pin)
            .map(|input| input.is_high())
            .ok_or_else(|| BusError::Gpio(format!("pin {} is not bound", pin)))
    }
}
