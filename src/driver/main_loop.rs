use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::event_queue::EventQueue;
use super::events::{Button, Event};
use super::status::Status;
use crate::comms::{Message, Mode};

/// Callbacks invoked on the main thread, one per [`Event`] kind
///
/// Everything defaults to doing nothing so an application only implements what it
/// shows.
#[allow(unused_variables)]
pub trait Application {
    fn button(&mut self, button: Button, pressed: bool) {}

    /// A held button fired again; forwards to [`Application::button`] unless overridden
    fn button_repeat(&mut self, button: Button) {
        self.button(button, true);
    }

    fn thumbstick(&mut self, x: u8, y: u8) {}
    fn accel(&mut self, x: u8, y: u8) {}
    fn mode_changed(&mut self, mode: Mode) {}
    fn charging_changed(&mut self, usb: bool, charging: bool) {}
    fn voltage_changed(&mut self, vbatt: u16, vcc: u16) {}
    fn temperature_changed(&mut self, avr: i16, accel: i16) {}
    fn headphones_changed(&mut self, connected: bool) {}
    fn volume_changed(&mut self, volume: u8) {}
    fn message(&mut self, message: Message) {}
    fn link_lost(&mut self) {}
    fn link_restored(&mut self) {}
    fn shutdown(&mut self) {}
}

/// Main-thread end of the event queue
pub struct MainLoop {
    events: EventQueue<Event>,
    status: watch::Receiver<Status>,
    finished: bool,
}

impl MainLoop {
    pub fn new(events: EventQueue<Event>, status: watch::Receiver<Status>) -> Self {
        Self {
            events,
            status,
            finished: false,
        }
    }

    /// Latest published status
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// `true` once [`Event::Shutdown`] was dispatched
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Dispatches everything already queued, in order, without waiting
    ///
    /// Meant to be called once per UI frame. Returns the number of events dispatched.
    pub fn poll(&mut self, app: &mut dyn Application) -> usize {
        let mut dispatched = 0;
        while !self.finished {
            let Some(event) = self.events.try_receive() else {
                break;
            };
            self.dispatch(app, event);
            dispatched += 1;
        }
        dispatched
    }

    /// Waits for and dispatches events until the driver shuts down
    pub async fn run(&mut self, app: &mut dyn Application, frame: Duration) {
        info!("Main loop running");
        while !self.finished {
            if let Some(event) = self.events.receive(frame).await {
                self.dispatch(app, event);
            }
        }
        info!("Main loop finished");
    }

    fn dispatch(&mut self, app: &mut dyn Application, event: Event) {
        debug!("Dispatching {:?}", event);
        match event {
            Event::Button {
                button,
                pressed: true,
                repeat: true,
            } => app.button_repeat(button),
            Event::Button {
                button, pressed, ..
            } => app.button(button, pressed),
            Event::Thumbstick { x, y } => app.thumbstick(x, y),
            Event::Accel { x, y } => app.accel(x, y),
            Event::Mode(mode) => app.mode_changed(mode),
            Event::Charging { usb, charging } => app.charging_changed(usb, charging),
            Event::Voltage { vbatt, vcc } => app.voltage_changed(vbatt, vcc),
            Event::Temperature { avr, accel } => app.temperature_changed(avr, accel),
            Event::Headphones(connected) => app.headphones_changed(connected),
            Event::Volume(volume) => app.volume_changed(volume),
            Event::Message(message) => app.message(message),
            Event::LinkLost => app.link_lost(),
            Event::LinkRestored => app.link_restored(),
            Event::Shutdown => {
                self.finished = true;
                app.shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::EventSender;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Application for Recorder {
        fn button(&mut self, button: Button, pressed: bool) {
            self.calls.push(format!("{:?} {}", button, pressed));
        }

        fn volume_changed(&mut self, volume: u8) {
            self.calls.push(format!("volume {}", volume));
        }

        fn shutdown(&mut self) {
            self.calls.push(String::from("shutdown"));
        }
    }

    fn main_loop() -> (MainLoop, EventSender<Event>) {
        let events = EventQueue::new();
        let sender = events.sender();
        let (_, status) = watch::channel(Status::default());
        (MainLoop::new(events, status), sender)
    }

    #[test]
    fn events_are_dispatched_in_order() {
        let (mut main_loop, sender) = main_loop();
        sender.send(Event::Button {
            button: Button::A,
            pressed: true,
            repeat: false,
        });
        sender.send(Event::Volume(40));
        sender.send(Event::Button {
            button: Button::A,
            pressed: true,
            repeat: true,
        });
        sender.send(Event::Button {
            button: Button::A,
            pressed: false,
            repeat: false,
        });

        let mut app = Recorder::default();
        assert_eq!(main_loop.poll(&mut app), 4);
        assert_eq!(
            app.calls,
            vec!["A true", "volume 40", "A true", "A false"]
        );
        assert_eq!(main_loop.poll(&mut app), 0);
    }

    #[test]
    fn nothing_is_dispatched_after_shutdown() {
        let (mut main_loop, sender) = main_loop();
        sender.send(Event::Shutdown);
        sender.send(Event::Volume(1));

        let mut app = Recorder::default();
        assert_eq!(main_loop.poll(&mut app), 1);
        assert!(main_loop.is_finished());
        assert_eq!(app.calls, vec!["shutdown"]);
    }

    #[tokio::test]
    async fn run_returns_on_shutdown() {
        let (mut main_loop, sender) = main_loop();
        sender.send(Event::Volume(7));
        sender.send(Event::Shutdown);

        let mut app = Recorder::default();
        main_loop.run(&mut app, Duration::from_millis(5)).await;
        assert_eq!(app.calls, vec!["volume 7", "shutdown"]);
    }
}
