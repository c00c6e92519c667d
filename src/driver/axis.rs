use super::events::Axis;

/// Last value written downstream for one analog channel
///
/// No filtering: thumbstick values arrive debounced from the co-processor and the
/// accelerometer is already reduced to a byte.
#[derive(Debug, Clone)]
pub struct AxisState {
    axis: Axis,
    current: u8,
}

impl AxisState {
    pub fn new(axis: Axis, initial: u8) -> Self {
        Self {
            axis,
            current: initial,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Returns `true` when `value` differs from the last one and must be written out
    pub fn update(&mut self, value: u8) -> bool {
        if value == self.current {
            return false;
        }
        self.current = value;
        true
    }
}

/// Reduces a signed 16 bit accelerometer sample to the byte range of the axes
pub fn accel_to_axis(raw: i16) -> u8 {
    ((raw >> 8) + 128) as u8
}
