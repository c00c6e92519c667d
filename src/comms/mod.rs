//! Co-processor protocol
//!
//! Frames exchanged with the AVR over I2C. Requests and commands are written by the
//! host; the AVR answers a request with exactly one frame of the requested kind.
//!
//! ```text
//! status    [0xA1, 16, mode, flags, vbatt:u16, vcc:u16, avrTemp:i16, accelTemp:i16,
//!            buttons:u16, thumbX, thumbY]
//! extended  [0xA2, len, flags, ssidLen, ssid..]
//! notice    [0xA3, len, id, payload..]
//! command   [id, payload..]                    (fixed length per id, no reply)
//! ```
//!
//! Integers are little-endian. A frame whose kind, declared length or received length
//! disagree is rejected as a whole; callers keep their previous state.

pub mod link;

pub use link::CoprocessorLink;

use crate::hal::BusError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const REQUEST_STATUS: u8 = 0x01;
pub const REQUEST_EXTENDED: u8 = 0x02;
pub const REQUEST_NOTICE: u8 = 0x03;

pub const KIND_STATUS: u8 = 0xa1;
pub const KIND_EXTENDED: u8 = 0xa2;
pub const KIND_NOTICE: u8 = 0xa3;

pub const STATUS_FRAME_LEN: usize = 16;
pub const EXTENDED_HEADER_LEN: usize = 4;
pub const MAX_SSID_LEN: usize = 32;
pub const EXTENDED_FRAME_MAX_LEN: usize = EXTENDED_HEADER_LEN + MAX_SSID_LEN;
pub const NOTICE_FRAME_MAX_LEN: usize = 8;

const FLAG_USB: u8 = 1 << 0;
const FLAG_CHARGING: u8 = 1 << 1;
const FLAG_HEADPHONES: u8 = 1 << 2;
const FLAG_NOTICE: u8 = 1 << 3;

const FLAG_WIFI: u8 = 1 << 0;
const FLAG_HOTSPOT: u8 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Unexpected frame kind 0x{actual:02x}, expected 0x{expected:02x}")]
    WrongKind { expected: u8, actual: u8 },

    #[error("Frame 0x{kind:02x} declares {declared} bytes, layout requires {required}")]
    BadLength {
        kind: u8,
        declared: usize,
        required: usize,
    },

    #[error("Frame truncated: received {received} of {declared} bytes")]
    Truncated { received: usize, declared: usize },

    #[error("Unknown mode {0}")]
    UnknownMode(u8),

    #[error("Unknown message id 0x{0:02x}")]
    UnknownMessage(u8),
}

/// Operating mode reported by the co-processor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Normal,
    Standby,
    PowerUp,
    PowerDown,
    Charging,
    Repair,
}

impl TryFrom<u8> for Mode {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Normal),
            1 => Ok(Mode::Standby),
            2 => Ok(Mode::PowerUp),
            3 => Ok(Mode::PowerDown),
            4 => Ok(Mode::Charging),
            5 => Ok(Mode::Repair),
            other => Err(LinkError::UnknownMode(other)),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => 0,
            Mode::Standby => 1,
            Mode::PowerUp => 2,
            Mode::PowerDown => 3,
            Mode::Charging => 4,
            Mode::Repair => 5,
        }
    }
}

/// Digital buttons and thumbstick as sampled by the co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub buttons: u16,
    pub thumb_x: u8,
    pub thumb_y: u8,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            buttons: 0,
            thumb_x: 128,
            thumb_y: 128,
        }
    }
}

impl Controls {
    pub fn is_pressed(&self, bit: u8) -> bool {
        self.buttons & (1 << bit) != 0
    }
}

/// Fast status frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusFrame {
    pub mode: Mode,
    pub usb: bool,
    pub charging: bool,
    pub headphones: bool,
    pub notice_pending: bool,
    pub vbatt: u16,
    pub vcc: u16,
    pub avr_temp: i16,
    pub accel_temp: i16,
    pub controls: Controls,
}

impl StatusFrame {
    pub fn decode(frame: &[u8]) -> Result<Self, LinkError> {
        let body = check_header(frame, KIND_STATUS, |declared| {
            (declared == STATUS_FRAME_LEN).then_some(()).ok_or(STATUS_FRAME_LEN)
        })?;
        let flags = body[3];
        Ok(Self {
            mode: Mode::try_from(body[2])?,
            usb: flags & FLAG_USB != 0,
            charging: flags & FLAG_CHARGING != 0,
            headphones: flags & FLAG_HEADPHONES != 0,
            notice_pending: flags & FLAG_NOTICE != 0,
            vbatt: u16::from_le_bytes([body[4], body[5]]),
            vcc: u16::from_le_bytes([body[6], body[7]]),
            avr_temp: i16::from_le_bytes([body[8], body[9]]),
            accel_temp: i16::from_le_bytes([body[10], body[11]]),
            controls: Controls {
                buttons: u16::from_le_bytes([body[12], body[13]]),
                thumb_x: body[14],
                thumb_y: body[15],
            },
        })
    }

    pub fn encode(&self) -> [u8; STATUS_FRAME_LEN] {
        let mut flags = 0;
        if self.usb {
            flags |= FLAG_USB;
        }
        if self.charging {
            flags |= FLAG_CHARGING;
        }
        if self.headphones {
            flags |= FLAG_HEADPHONES;
        }
        if self.notice_pending {
            flags |= FLAG_NOTICE;
        }
        let vbatt = self.vbatt.to_le_bytes();
        let vcc = self.vcc.to_le_bytes();
        let avr_temp = self.avr_temp.to_le_bytes();
        let accel_temp = self.accel_temp.to_le_bytes();
        let buttons = self.controls.buttons.to_le_bytes();
        [
            KIND_STATUS,
            STATUS_FRAME_LEN as u8,
            self.mode.into(),
            flags,
            vbatt[0],
            vbatt[1],
            vcc[0],
            vcc[1],
            avr_temp[0],
            avr_temp[1],
            accel_temp[0],
            accel_temp[1],
            buttons[0],
            buttons[1],
            self.controls.thumb_x,
            self.controls.thumb_y,
        ]
    }
}

/// Extended status frame, polled once per second
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedFrame {
    pub wifi: bool,
    pub hotspot: bool,
    pub ssid: String,
}

impl ExtendedFrame {
    pub fn decode(frame: &[u8]) -> Result<Self, LinkError> {
        let body = check_header(frame, KIND_EXTENDED, |declared| {
            if (EXTENDED_HEADER_LEN..=EXTENDED_FRAME_MAX_LEN).contains(&declared) {
                Ok(())
            } else {
                Err(EXTENDED_HEADER_LEN)
            }
        })?;
        let ssid_len = body[3] as usize;
        if EXTENDED_HEADER_LEN + ssid_len != body.len() {
            return Err(LinkError::BadLength {
                kind: KIND_EXTENDED,
                declared: body.len(),
                required: EXTENDED_HEADER_LEN + ssid_len,
            });
        }
        Ok(Self {
            wifi: body[2] & FLAG_WIFI != 0,
            hotspot: body[2] & FLAG_HOTSPOT != 0,
            ssid: String::from_utf8_lossy(&body[EXTENDED_HEADER_LEN..]).into_owned(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let ssid = &self.ssid.as_bytes()[..self.ssid.len().min(MAX_SSID_LEN)];
        let mut flags = 0;
        if self.wifi {
            flags |= FLAG_WIFI;
        }
        if self.hotspot {
            flags |= FLAG_HOTSPOT;
        }
        let mut frame = vec![
            KIND_EXTENDED,
            (EXTENDED_HEADER_LEN + ssid.len()) as u8,
            flags,
            ssid.len() as u8,
        ];
        frame.extend_from_slice(ssid);
        frame
    }
}

/// Notices sent by the co-processor, forwarded to the application unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    AvrReset,
    Info { code: u8 },
    StartAudioRecording,
    StopAudioRecording,
    BrightnessSet { value: u8 },
    TimeSet { unix_seconds: u32 },
    AlarmSet { hour: u8, minute: u8, enabled: bool },
    RumblerOk,
    RumblerFail,
    Rumbler { strength: u8, duration_ms: u16 },
    PowerOn,
    PowerDown,
    EnterRepairMode,
    LeaveRepairMode,
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::AvrReset => 0x20,
            Message::Info { .. } => 0x21,
            Message::StartAudioRecording => 0x22,
            Message::StopAudioRecording => 0x23,
            Message::BrightnessSet { .. } => 0x24,
            Message::TimeSet { .. } => 0x25,
            Message::AlarmSet { .. } => 0x26,
            Message::RumblerOk => 0x27,
            Message::RumblerFail => 0x28,
            Message::Rumbler { .. } => 0x29,
            Message::PowerOn => 0x2a,
            Message::PowerDown => 0x2b,
            Message::EnterRepairMode => 0x2c,
            Message::LeaveRepairMode => 0x2d,
        }
    }

    fn payload_len(id: u8) -> Option<usize> {
        match id {
            0x20 | 0x22 | 0x23 | 0x27 | 0x28 | 0x2a..=0x2d => Some(0),
            0x21 | 0x24 => Some(1),
            0x25 => Some(4),
            0x26 | 0x29 => Some(3),
            _ => None,
        }
    }

    /// Decodes a notice frame
    pub fn decode(frame: &[u8]) -> Result<Self, LinkError> {
        // the id must be known before the length can be checked
        if frame.len() >= 3 && frame[0] == KIND_NOTICE && Self::payload_len(frame[2]).is_none() {
            return Err(LinkError::UnknownMessage(frame[2]));
        }
        let body = check_header(frame, KIND_NOTICE, |declared| {
            let required = frame
                .get(2)
                .and_then(|id| Self::payload_len(*id))
                .map_or(3, |payload| 3 + payload);
            (declared == required).then_some(()).ok_or(required)
        })?;
        let p = &body[3..];
        let message = match body[2] {
            0x20 => Message::AvrReset,
            0x21 => Message::Info { code: p[0] },
            0x22 => Message::StartAudioRecording,
            0x23 => Message::StopAudioRecording,
            0x24 => Message::BrightnessSet { value: p[0] },
            0x25 => Message::TimeSet {
                unix_seconds: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            },
            0x26 => Message::AlarmSet {
                hour: p[0],
                minute: p[1],
                enabled: p[2] != 0,
            },
            0x27 => Message::RumblerOk,
            0x28 => Message::RumblerFail,
            0x29 => Message::Rumbler {
                strength: p[0],
                duration_ms: u16::from_le_bytes([p[1], p[2]]),
            },
            0x2a => Message::PowerOn,
            0x2b => Message::PowerDown,
            0x2c => Message::EnterRepairMode,
            0x2d => Message::LeaveRepairMode,
            other => return Err(LinkError::UnknownMessage(other)),
        };
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload: Vec<u8> = match *self {
            Message::Info { code } => vec![code],
            Message::BrightnessSet { value } => vec![value],
            Message::TimeSet { unix_seconds } => unix_seconds.to_le_bytes().to_vec(),
            Message::AlarmSet {
                hour,
                minute,
                enabled,
            } => vec![hour, minute, enabled as u8],
            Message::Rumbler {
                strength,
                duration_ms,
            } => {
                let d = duration_ms.to_le_bytes();
                vec![strength, d[0], d[1]]
            }
            _ => Vec::new(),
        };
        let mut frame = vec![KIND_NOTICE, (3 + payload.len()) as u8, self.id()];
        frame.extend(payload);
        frame
    }
}

/// Commands written to the co-processor, fire-and-forget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetBrightness { value: u8 },
    SetTime { unix_seconds: u32 },
    SetAlarm { hour: u8, minute: u8, enabled: bool },
    Rumble { strength: u8, duration_ms: u16 },
    PowerDown,
    EnterRepairMode,
    LeaveRepairMode,
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::SetBrightness { value } => vec![0x10, value],
            Command::SetTime { unix_seconds } => {
                let mut frame = vec![0x11];
                frame.extend_from_slice(&unix_seconds.to_le_bytes());
                frame
            }
            Command::SetAlarm {
                hour,
                minute,
                enabled,
            } => vec![0x12, hour, minute, enabled as u8],
            Command::Rumble {
                strength,
                duration_ms,
            } => {
                let d = duration_ms.to_le_bytes();
                vec![0x13, strength, d[0], d[1]]
            }
            Command::PowerDown => vec![0x14],
            Command::EnterRepairMode => vec![0x15],
            Command::LeaveRepairMode => vec![0x16],
        }
    }

    /// Parses a command frame the way the co-processor does, `None` if malformed
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let command = match frame {
            [0x10, value] => Command::SetBrightness { value: *value },
            [0x11, a, b, c, d] => Command::SetTime {
                unix_seconds: u32::from_le_bytes([*a, *b, *c, *d]),
            },
            [0x12, hour, minute, enabled] => Command::SetAlarm {
                hour: *hour,
                minute: *minute,
                enabled: *enabled != 0,
            },
            [0x13, strength, lo, hi] => Command::Rumble {
                strength: *strength,
                duration_ms: u16::from_le_bytes([*lo, *hi]),
            },
            [0x14] => Command::PowerDown,
            [0x15] => Command::EnterRepairMode,
            [0x16] => Command::LeaveRepairMode,
            _ => return None,
        };
        Some(command)
    }
}

/// Validates kind and lengths, returns the frame trimmed to its declared length
///
/// `layout` gets the declared length and answers with the required length on mismatch.
fn check_header(
    frame: &[u8],
    kind: u8,
    layout: impl Fn(usize) -> Result<(), usize>,
) -> Result<&[u8], LinkError> {
    if frame.len() < 2 {
        return Err(LinkError::Truncated {
            received: frame.len(),
            declared: 2,
        });
    }
    if frame[0] != kind {
        return Err(LinkError::WrongKind {
            expected: kind,
            actual: frame[0],
        });
    }
    let declared = frame[1] as usize;
    if let Err(required) = layout(declared) {
        return Err(LinkError::BadLength {
            kind,
            declared,
            required,
        });
    }
    if frame.len() < declared {
        return Err(LinkError::Truncated {
            received: frame.len(),
            declared,
        });
    }
    Ok(&frame[..declared])
}
