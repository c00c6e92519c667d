use super::events::Event;
use crate::comms::{ExtendedFrame, Mode, StatusFrame};

pub const MAX_VOLUME: u8 = 100;

/// Device status as last published by the driver thread
///
/// The driver keeps a working copy and publishes it through a `watch` channel after
/// every processed hardware event; the main thread only ever reads snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub mode: Mode,
    pub usb: bool,
    pub charging: bool,
    /// Hundredths of a volt
    pub vbatt: u16,
    pub vcc: u16,
    /// Tenths of a degree Celsius
    pub avr_temp: i16,
    pub accel_temp: i16,
    pub headphones: bool,
    pub volume: u8,
    pub wifi: bool,
    pub wifi_hotspot: bool,
    pub ssid: String,
    pub nrf: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            usb: false,
            charging: false,
            vbatt: 420,
            vcc: 430,
            avr_temp: 0,
            accel_temp: 0,
            headphones: false,
            volume: 0,
            wifi: false,
            wifi_hotspot: false,
            ssid: String::new(),
            nrf: false,
        }
    }
}

impl Status {
    pub fn apply_status(&mut self, frame: &StatusFrame) {
        self.mode = frame.mode;
        self.usb = frame.usb;
        self.charging = frame.charging;
        self.vbatt = frame.vbatt;
        self.vcc = frame.vcc;
        self.avr_temp = frame.avr_temp;
        self.accel_temp = frame.accel_temp;
        self.headphones = frame.headphones;
    }

    pub fn apply_extended(&mut self, frame: &ExtendedFrame) {
        self.wifi = frame.wifi;
        self.wifi_hotspot = frame.hotspot;
        self.ssid.clone_from(&frame.ssid);
    }

    /// Events for every application-visible group that differs from `previous`
    pub fn changes(&self, previous: &Status) -> Vec<Event> {
        let mut events = Vec::new();
        if self.mode != previous.mode {
            events.push(Event::Mode(self.mode));
        }
        if (self.usb, self.charging) != (previous.usb, previous.charging) {
            events.push(Event::Charging {
                usb: self.usb,
                charging: self.charging,
            });
        }
        if (self.vbatt, self.vcc) != (previous.vbatt, previous.vcc) {
            events.push(Event::Voltage {
                vbatt: self.vbatt,
                vcc: self.vcc,
            });
        }
        if (self.avr_temp, self.accel_temp) != (previous.avr_temp, previous.accel_temp) {
            events.push(Event::Temperature {
                avr: self.avr_temp,
                accel: self.accel_temp,
            });
        }
        if self.headphones != previous.headphones {
            events.push(Event::Headphones(self.headphones));
        }
        if self.volume != previous.volume {
            events.push(Event::Volume(self.volume));
        }
        events
    }
}
