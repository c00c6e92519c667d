//! Messages crossing thread boundaries
//!
//! [`HwEvent`] flows into the driver thread (interrupts, timers, main-thread requests,
//! co-processor notices). [`Event`] flows out of it to the main thread. Both are closed
//! sets matched exhaustively by their consumers.

use super::sink::codes;
use crate::comms::{Command, Message, Mode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    L,
    R,
    Select,
    Start,
    Home,
    Up,
    Down,
    Left,
    Right,
    Joy,
    VolumeUp,
    VolumeDown,
}

impl Button {
    pub const ALL: [Button; 16] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::L,
        Button::R,
        Button::Select,
        Button::Start,
        Button::Home,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Joy,
        Button::VolumeUp,
        Button::VolumeDown,
    ];

    /// Input-event code on the virtual gamepad, an `ABS_HAT0*` axis for the d-pad
    pub fn code(self) -> u16 {
        match self {
            Button::A => codes::BTN_EAST,
            Button::B => codes::BTN_SOUTH,
            Button::X => codes::BTN_NORTH,
            Button::Y => codes::BTN_WEST,
            Button::L => codes::BTN_TL,
            Button::R => codes::BTN_TR,
            Button::Select => codes::BTN_SELECT,
            Button::Start => codes::BTN_START,
            Button::Home => codes::BTN_MODE,
            Button::Up | Button::Down => codes::ABS_HAT0Y,
            Button::Left | Button::Right => codes::ABS_HAT0X,
            Button::Joy => codes::BTN_THUMBL,
            Button::VolumeUp | Button::VolumeDown => codes::KEY_RESERVED,
        }
    }

    /// Value reported on [`Button::code`] while pressed, 0 for plain buttons
    pub fn axis_value(self) -> i32 {
        match self {
            Button::Up | Button::Left => -1,
            Button::Down | Button::Right => 1,
            _ => 0,
        }
    }

    /// Bit in the co-processor's button word, `None` for local GPIO buttons
    pub fn avr_bit(self) -> Option<u8> {
        match self {
            Button::A | Button::B | Button::X | Button::Y | Button::L | Button::R => None,
            Button::Select => Some(0),
            Button::Start => Some(1),
            Button::Home => Some(2),
            Button::Up => Some(3),
            Button::Down => Some(4),
            Button::Left => Some(5),
            Button::Right => Some(6),
            Button::Joy => Some(7),
            Button::VolumeUp => Some(8),
            Button::VolumeDown => Some(9),
        }
    }

    /// Already debounced by the co-processor firmware
    pub fn predebounced(self) -> bool {
        matches!(self, Button::Joy | Button::VolumeUp | Button::VolumeDown)
    }
}

/// Analog channels mirrored on the virtual gamepad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    ThumbX,
    ThumbY,
    AccelX,
    AccelY,
}

impl Axis {
    pub fn code(self) -> u16 {
        match self {
            Axis::ThumbX => codes::ABS_X,
            Axis::ThumbY => codes::ABS_Y,
            Axis::AccelX => codes::ABS_RX,
            Axis::AccelY => codes::ABS_RY,
        }
    }
}

/// Work items for the driver thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    Tick,
    SecondTick,
    /// An interrupt line fired; button lines have already stored their new level
    Irq { pin: u8 },
    KeyPress { key: u16, state: bool },
    EnableGamepad { enable: bool },
    Command(Command),
    SetVolume { volume: u8 },
    /// Notice received from the co-processor
    Message(Message),
    Shutdown,
}

/// Changes delivered to the main thread, in publication order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Mode(Mode),
    Charging { usb: bool, charging: bool },
    Voltage { vbatt: u16, vcc: u16 },
    Temperature { avr: i16, accel: i16 },
    Headphones(bool),
    Volume(u8),
    Button { button: Button, pressed: bool, repeat: bool },
    Thumbstick { x: u8, y: u8 },
    Accel { x: u8, y: u8 },
    Message(Message),
    /// The co-processor stopped answering; the application decides what to do
    LinkLost,
    LinkRestored,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn avr_bits_are_unique() {
        let bits: Vec<u8> = Button::ALL.iter().filter_map(|b| b.avr_bit()).collect();
        let unique: HashSet<u8> = bits.iter().copied().collect();
        assert_eq!(bits.len(), unique.len());
        assert_eq!(bits.len(), 10);
    }

    #[test]
    fn dpad_reports_on_hat_axes() {
        assert_eq!(Button::Up.code(), codes::ABS_HAT0Y);
        assert_eq!(Button::Up.axis_value(), -1);
        assert_eq!(Button::Right.code(), codes::ABS_HAT0X);
        assert_eq!(Button::Right.axis_value(), 1);
        assert_eq!(Button::A.axis_value(), 0);
    }
}
