//! Software stand-ins for the board
//!
//! [`MockCoprocessor`] behaves like the AVR firmware: it answers status, extended and
//! notice requests from its current state, applies commands and acknowledges them with
//! notices. Replies can be scripted to inject bus failures or corrupt frames.
//! [`MockLines`] lets a caller fire GPIO edges by hand, [`RecordingSink`] keeps every
//! virtual-device write.

use super::{AccelData, BusError, I2cBus, InterruptLines, IrqHandler, Mpu6050, Radio};
use crate::comms::{Command, CoprocessorLink, ExtendedFrame, Message, Mode, StatusFrame};
use crate::comms::{REQUEST_EXTENDED, REQUEST_NOTICE, REQUEST_STATUS};
use crate::driver::sink::{InputSink, SinkError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Scripted answer to the next request, overriding the simulated firmware
#[derive(Debug, Clone)]
pub enum Reply {
    Raw(Vec<u8>),
    Fail(BusError),
}

/// Firmware side state of the simulated co-processor
#[derive(Debug, Clone, Default)]
pub struct MockAvrState {
    pub status: StatusFrame,
    pub extended: ExtendedFrame,
    pub accel: AccelData,
    notices: VecDeque<Message>,
    replies: VecDeque<Reply>,
    requests: Vec<u8>,
    commands: Vec<Command>,
}

impl MockAvrState {
    fn apply(&mut self, command: Command) {
        let ack = match command {
            Command::SetBrightness { value } => Message::BrightnessSet { value },
            Command::SetTime { unix_seconds } => Message::TimeSet { unix_seconds },
            Command::SetAlarm {
                hour,
                minute,
                enabled,
            } => Message::AlarmSet {
                hour,
                minute,
                enabled,
            },
            Command::Rumble { .. } => Message::RumblerOk,
            Command::PowerDown => {
                self.status.mode = Mode::PowerDown;
                Message::PowerDown
            }
            Command::EnterRepairMode => {
                self.status.mode = Mode::Repair;
                Message::EnterRepairMode
            }
            Command::LeaveRepairMode => {
                self.status.mode = Mode::Normal;
                Message::LeaveRepairMode
            }
        };
        self.commands.push(command);
        self.notices.push_back(ack);
    }

    fn answer(&mut self, request: u8) -> Vec<u8> {
        match request {
            REQUEST_STATUS => {
                let mut status = self.status.clone();
                status.notice_pending = !self.notices.is_empty();
                status.encode().to_vec()
            }
            REQUEST_EXTENDED => self.extended.encode(),
            REQUEST_NOTICE => self
                .notices
                .pop_front()
                .map(|notice| notice.encode())
                .unwrap_or_default(),
            other => {
                warn!("Mock co-processor got unknown request 0x{:02x}", other);
                Vec::new()
            }
        }
    }
}

/// Shared handle to a simulated co-processor
#[derive(Debug, Clone)]
pub struct MockCoprocessor {
    state: Arc<Mutex<MockAvrState>>,
    avr_address: u16,
    accel_address: u16,
}

impl Default for MockCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCoprocessor {
    pub fn new() -> Self {
        let state = MockAvrState {
            status: StatusFrame {
                vbatt: 420,
                vcc: 430,
                avr_temp: 250,
                accel_temp: 250,
                ..Default::default()
            },
            extended: ExtendedFrame {
                wifi: true,
                hotspot: false,
                ssid: String::from("rckid"),
            },
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            avr_address: CoprocessorLink::DEFAULT_ADDRESS,
            accel_address: Mpu6050::DEFAULT_ADDRESS,
        }
    }

    /// Bus endpoint for the driver thread
    pub fn bus(&self) -> MockBus {
        MockBus {
            avr: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockAvrState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update(&self, f: impl FnOnce(&mut MockAvrState)) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> MockAvrState {
        self.lock().clone()
    }

    pub fn set_button_bits(&self, buttons: u16) {
        self.lock().status.controls.buttons = buttons;
    }

    pub fn notify(&self, message: Message) {
        self.lock().notices.push_back(message);
    }

    pub fn push_reply(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    pub fn requests(&self) -> Vec<u8> {
        self.lock().requests.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }
}

/// [`I2cBus`] endpoint of a [`MockCoprocessor`]
#[derive(Debug, Clone)]
pub struct MockBus {
    avr: MockCoprocessor,
}

impl I2cBus for MockBus {
    fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        if address == self.avr.accel_address {
            return Ok(());
        }
        if address != self.avr.avr_address {
            return Err(BusError::Nack { address });
        }
        match Command::decode(bytes) {
            Some(command) => {
                debug!("Mock co-processor received {:?}", command);
                self.avr.lock().apply(command);
            }
            None => warn!("Mock co-processor ignored malformed command {:02x?}", bytes),
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u16,
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, BusError> {
        let mut state = self.avr.lock();
        let reply = if address == self.avr.accel_address {
            let a = state.accel;
            [a.x.to_be_bytes(), a.y.to_be_bytes(), a.z.to_be_bytes()].concat()
        } else if address == self.avr.avr_address {
            let request = request.first().copied().unwrap_or_default();
            state.requests.push(request);
            match state.replies.pop_front() {
                Some(Reply::Fail(error)) => return Err(error),
                Some(Reply::Raw(bytes)) => bytes,
                None => state.answer(request),
            }
        } else {
            return Err(BusError::Nack { address });
        };
        let len = reply.len().min(response.len());
        response[..len].copy_from_slice(&reply[..len]);
        Ok(len)
    }
}

/// Interrupt lines driven by hand
#[derive(Clone, Default)]
pub struct MockLines {
    handlers: Arc<Mutex<HashMap<u8, IrqHandler>>>,
    levels: Arc<Mutex<HashMap<u8, bool>>>,
}

impl MockLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives `pin` to `high` and runs its handler like the GPIO interrupt thread would
    pub fn fire(&self, pin: u8, high: bool) {
        self.levels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(pin, high);
        let mut handlers = self.handlers.lock().unwrap_or_else(|p| p.into_inner());
        match handlers.get_mut(&pin) {
            Some(handler) => handler(high),
            None => warn!("No handler bound to mock pin {}", pin),
        }
    }

    pub fn set_level(&self, pin: u8, high: bool) {
        self.levels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(pin, high);
    }

    pub fn is_bound(&self, pin: u8) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&pin)
    }
}

impl InterruptLines for MockLines {
    fn bind(&mut self, pin: u8, handler: IrqHandler) -> Result<(), BusError> {
        self.handlers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(pin, handler);
        Ok(())
    }

    fn level(&self, pin: u8) -> Result<bool, BusError> {
        // pull-ups: unbound or untouched lines read high
        Ok(self
            .levels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&pin)
            .copied()
            .unwrap_or(true))
    }
}

/// A write made to a virtual input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkWrite {
    Key { code: u16, pressed: bool },
    Abs { code: u16, value: i32 },
}

/// Input sink that records instead of emitting
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<SinkWrite>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<SinkWrite> {
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn record(&self, write: SinkWrite) {
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(write);
    }
}

impl InputSink for RecordingSink {
    fn key(&mut self, code: u16, pressed: bool) -> Result<(), SinkError> {
        self.record(SinkWrite::Key { code, pressed });
        Ok(())
    }

    fn abs(&mut self, code: u16, value: i32) -> Result<(), SinkError> {
        self.record(SinkWrite::Abs { code, value });
        Ok(())
    }
}

/// Radio that only counts how often it was serviced
#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    serviced: Arc<AtomicUsize>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serviced(&self) -> usize {
        self.serviced.load(Ordering::Acquire)
    }
}

impl Radio for MockRadio {
    fn handle_irq(&mut self) -> Result<(), BusError> {
        self.serviced.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
