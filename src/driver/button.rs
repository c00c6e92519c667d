//! Debounce and autorepeat for one digital button
//!
//! The first edge is reported right away and opens a debounce window; edges inside the
//! window only update the raw level. When the window closes the latest raw level is
//! compared with what was reported and a single transition catches up if they differ,
//! so bounce is swallowed without ever losing the final state.
//!
//! ```text
//! raw      ─┐ ┌┐ ┌───────────            (pressed is low)
//!           └─┘└─┘
//! reported  ▼ pressed          ▲ nothing else: raw settled on pressed
//! window    |<── debounce ──>|
//! ```
//!
//! The raw level lives in a [`ButtonLine`] shared with the interrupt handler, the only
//! field that is written outside the driver thread. Everything in [`ButtonState`] is
//! owned by the driver thread, and its methods only compute transitions; applying them
//! to the virtual device and the event queue is the caller's job.

use super::events::Button;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raw level of a button, written by its interrupt handler
#[derive(Debug, Default)]
pub struct ButtonLine {
    current: AtomicBool,
}

impl ButtonLine {
    /// Interrupt side; pairs with the acquire in [`ButtonLine::load`]
    pub fn store(&self, pressed: bool) {
        self.current.store(pressed, Ordering::Release);
    }

    pub fn load(&self) -> bool {
        self.current.load(Ordering::Acquire)
    }
}

/// A change to report downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub pressed: bool,
    /// Autorepeat of a held button, `reported` did not change
    pub repeat: bool,
}

#[derive(Debug)]
pub struct ButtonState {
    button: Button,
    line: Arc<ButtonLine>,
    reported: bool,
    debounce: u8,
    autorepeat: u8,
    debounce_ticks: u8,
    autorepeat_ticks: u8,
}

impl ButtonState {
    /// `autorepeat_ticks == 0` disables autorepeat, `debounce_ticks == 0` debouncing
    pub fn new(button: Button, debounce_ticks: u8, autorepeat_ticks: u8) -> Self {
        Self {
            button,
            line: Arc::new(ButtonLine::default()),
            reported: false,
            debounce: 0,
            autorepeat: 0,
            debounce_ticks,
            autorepeat_ticks,
        }
    }

    pub fn button(&self) -> Button {
        self.button
    }

    pub fn line(&self) -> Arc<ButtonLine> {
        Arc::clone(&self.line)
    }

    pub fn reported(&self) -> bool {
        self.reported
    }

    pub fn current(&self) -> bool {
        self.line.load()
    }

    pub fn is_debouncing(&self) -> bool {
        self.debounce > 0
    }

    /// A new raw level from a polled source
    pub fn raw_change(&mut self, pressed: bool) -> Option<Transition> {
        self.line.store(pressed);
        self.on_edge()
    }

    /// The interrupt handler already stored the level, react to it
    pub fn on_edge(&mut self) -> Option<Transition> {
        let current = self.line.load();
        if self.debounce > 0 || current == self.reported {
            return None;
        }
        self.debounce = self.debounce_ticks;
        Some(self.fire(current))
    }

    /// One driver tick: closes debounce windows and drives autorepeat
    pub fn tick(&mut self) -> Option<Transition> {
        if self.debounce > 0 {
            self.debounce -= 1;
            if self.debounce == 0 {
                let current = self.line.load();
                if current != self.reported {
                    self.debounce = self.debounce_ticks;
                    return Some(self.fire(current));
                }
            }
        }
        if self.reported && self.autorepeat > 0 {
            self.autorepeat -= 1;
            if self.autorepeat == 0 {
                self.autorepeat = self.autorepeat_ticks;
                return Some(Transition {
                    pressed: true,
                    repeat: true,
                });
            }
        }
        None
    }

    fn fire(&mut self, current: bool) -> Transition {
        self.reported = current;
        self.autorepeat = if current { self.autorepeat_ticks } else { 0 };
        Transition {
            pressed: current,
            repeat: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESS: Option<Transition> = Some(Transition {
        pressed: true,
        repeat: false,
    });
    const RELEASE: Option<Transition> = Some(Transition {
        pressed: false,
        repeat: false,
    });
    const REPEAT: Option<Transition> = Some(Transition {
        pressed: true,
        repeat: true,
    });

    #[test]
    fn first_edge_fires_immediately_then_settles() {
        let mut btn = ButtonState::new(Button::A, 2, 0);
        assert_eq!(btn.raw_change(true), PRESS);
        assert!(btn.is_debouncing());
        assert_eq!(btn.tick(), None);
        assert_eq!(btn.tick(), None);
        assert!(!btn.is_debouncing());
        assert_eq!(btn.tick(), None);
        assert!(btn.reported());
    }

    #[test]
    fn bounce_inside_window_reports_final_level_only() {
        let mut btn = ButtonState::new(Button::A, 3, 0);
        assert_eq!(btn.raw_change(true), PRESS);
        assert_eq!(btn.tick(), None);
        assert_eq!(btn.raw_change(false), None);
        assert_eq!(btn.tick(), None);
        assert_eq!(btn.tick(), RELEASE);
        assert!(!btn.reported());
        // catching up re-arms the window
        assert!(btn.is_debouncing());
    }

    #[test]
    fn toggle_back_inside_window_is_swallowed() {
        let mut btn = ButtonState::new(Button::B, 2, 0);
        assert_eq!(btn.raw_change(true), PRESS);
        assert_eq!(btn.raw_change(false), None);
        assert_eq!(btn.raw_change(true), None);
        assert_eq!(btn.tick(), None);
        assert_eq!(btn.tick(), None);
        assert!(btn.reported());
    }

    #[test]
    fn reported_equals_last_raw_level_for_any_edge_sequence() {
        for pattern in 0u32..256 {
            let mut btn = ButtonState::new(Button::X, 3, 0);
            let mut last = false;
            // eight edges spread over the first window
            for i in 0..8 {
                last = pattern & (1 << i) != 0;
                btn.raw_change(last);
                if i % 3 == 2 {
                    btn.tick();
                }
            }
            for _ in 0..6 {
                btn.tick();
            }
            assert_eq!(btn.reported(), last, "pattern {:08b}", pattern);
        }
    }

    #[test]
    fn held_button_repeats_every_period() {
        let autorepeat = 5;
        for held in 0..40u32 {
            let mut btn = ButtonState::new(Button::Up, 2, autorepeat);
            assert_eq!(btn.raw_change(true), PRESS);
            let repeats = (0..held).filter(|_| btn.tick() == REPEAT).count() as u32;
            assert_eq!(repeats, held / autorepeat as u32, "held {} ticks", held);
        }
    }

    #[test]
    fn released_button_never_repeats() {
        let mut btn = ButtonState::new(Button::Up, 1, 3);
        btn.raw_change(true);
        btn.tick();
        btn.raw_change(false);
        btn.tick();
        for _ in 0..20 {
            assert_eq!(btn.tick(), None);
        }
    }

    #[test]
    fn predebounced_button_follows_every_edge() {
        let mut btn = ButtonState::new(Button::Joy, 0, 0);
        assert_eq!(btn.raw_change(true), PRESS);
        assert_eq!(btn.raw_change(false), RELEASE);
        assert_eq!(btn.raw_change(true), PRESS);
        assert!(!btn.is_debouncing());
    }

    #[test]
    fn interrupt_stored_level_is_picked_up() {
        let mut btn = ButtonState::new(Button::L, 2, 0);
        let line = btn.line();
        line.store(true);
        assert_eq!(btn.on_edge(), PRESS);
        line.store(false);
        assert_eq!(btn.on_edge(), None);
        btn.tick();
        assert_eq!(btn.tick(), RELEASE);
    }
}
