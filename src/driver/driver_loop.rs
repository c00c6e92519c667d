use chrono::{DateTime, Duration, Local};
use statum::{machine, state};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::axis::{accel_to_axis, AxisState};
use super::button::{ButtonState, Transition};
use super::event_queue::{EventQueue, EventSender};
use super::events::{Axis, Button, Event, HwEvent};
use super::hardware::Hardware;
use super::sink::codes;
use super::status::{Status, MAX_VOLUME};
use super::DriverError;
use crate::comms::{Command, Controls, CoprocessorLink, LinkError, Message};
use crate::config::DriverConfig;

const SUMMARY_INTERVAL_SECS: i64 = 30;

// Digital and analog inputs, owned by the driver thread
struct InputState {
    buttons: Vec<ButtonState>,
    // GPIO pin to index in `buttons`
    pins: HashMap<u8, usize>,
    // Last button word and sticks read from the co-processor
    controls: Controls,
    thumb_x: AxisState,
    thumb_y: AxisState,
    accel_x: AxisState,
    accel_y: AxisState,
    gamepad_enabled: bool,
}

impl InputState {
    fn new(config: &DriverConfig) -> Self {
        let buttons: Vec<ButtonState> = Button::ALL
            .iter()
            .map(|&button| {
                let debounce = if button.predebounced() {
                    0
                } else {
                    config.debounce_ticks
                };
                ButtonState::new(button, debounce, config.autorepeat_ticks)
            })
            .collect();

        let local = [
            (Button::A, config.pins.btn_a),
            (Button::B, config.pins.btn_b),
            (Button::X, config.pins.btn_x),
            (Button::Y, config.pins.btn_y),
            (Button::L, config.pins.btn_l),
            (Button::R, config.pins.btn_r),
        ];
        let pins = local
            .iter()
            .filter_map(|(button, pin)| {
                buttons
                    .iter()
                    .position(|state| state.button() == *button)
                    .map(|index| (*pin, index))
            })
            .collect();

        let controls = Controls::default();
        Self {
            buttons,
            pins,
            thumb_x: AxisState::new(Axis::ThumbX, controls.thumb_x),
            thumb_y: AxisState::new(Axis::ThumbY, controls.thumb_y),
            accel_x: AxisState::new(Axis::AccelX, 128),
            accel_y: AxisState::new(Axis::AccelY, 128),
            controls,
            gamepad_enabled: config.gamepad_enabled,
        }
    }
}

// Co-processor link bookkeeping
#[derive(Debug, Default)]
struct LinkHealth {
    consecutive_failures: u32,
    lost: bool,
    ticks_since_poll: u32,
}

// Counters for the periodic rate logging
#[derive(Debug)]
struct LoopStats {
    events: u64,
    polls: u64,
    errors: u64,
    buttons: u64,
    total_events: u64,
    started: DateTime<Local>,
    last_summary: DateTime<Local>,
}

impl LoopStats {
    fn new() -> Self {
        let now = Local::now();
        Self {
            events: 0,
            polls: 0,
            errors: 0,
            buttons: 0,
            total_events: 0,
            started: now,
            last_summary: now,
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Initializing,
    Running,
}

/// The driver thread's state: hardware, debouncers and the working status copy
///
/// Every field is written from the driver thread only. Interrupt handlers reach it
/// through the hardware queue and the atomic button lines.
#[machine]
pub struct Driver<S: DriverState> {
    config: DriverConfig,
    hardware: Hardware,
    link: CoprocessorLink,

    // Queue A, consumed here
    hw_events: EventQueue<HwEvent>,

    // Queue B, consumed by the main thread
    events: EventSender<Event>,

    status_sender: watch::Sender<Status>,
    status: Status,
    published: Status,
    // Failed co-processor transactions since start, kept out of the snapshot
    link_errors: Arc<AtomicU32>,

    input: InputState,
    health: LinkHealth,
    stats: LoopStats,
}

impl<S: DriverState> Driver<S> {
    /// Producer side of the hardware queue, for the ticker and the main thread
    pub fn hw_sender(&self) -> EventSender<HwEvent> {
        self.hw_events.sender()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_sender.subscribe()
    }

    pub fn link_errors(&self) -> u32 {
        self.link_errors.load(Ordering::Relaxed)
    }

    /// Shared failure counter, readable from any thread
    pub fn link_error_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.link_errors)
    }
}

impl Driver<Initializing> {
    pub fn create(
        config: DriverConfig,
        hardware: Hardware,
        events: EventSender<Event>,
        status_sender: watch::Sender<Status>,
    ) -> Self {
        info!("Creating driver with config: {:?}", config);
        let link = CoprocessorLink::new(config.avr_address);
        let input = InputState::new(&config);
        let mut status = Status::default();
        status.nrf = hardware.radio.is_some();
        let published = status.clone();

        Self::new(
            config,
            hardware,
            link,
            EventQueue::new(),
            events,
            status_sender,
            status,
            published,
            Arc::new(AtomicU32::new(0)),
            input,
            LinkHealth::default(),
            LoopStats::new(),
        )
    }

    /// Binds the interrupt lines and reads the first status
    ///
    /// Line binding failures are fatal. A silent co-processor is not: it is counted like
    /// any later failure and reported through the link-loss events.
    pub fn initialize(mut self) -> Result<Driver<Running>, DriverError> {
        info!("Initializing driver");

        let local: Vec<(u8, usize)> = self.input.pins.iter().map(|(&p, &i)| (p, i)).collect();
        for (pin, index) in local {
            let line = self.input.buttons[index].line();
            let irq_line = line.clone();
            let sender = self.hw_events.sender();
            // pulled up, pressed reads low
            self.hardware.lines.bind(
                pin,
                Box::new(move |high| {
                    irq_line.store(!high);
                    sender.send(HwEvent::Irq { pin });
                }),
            )?;
            line.store(!self.hardware.lines.level(pin)?);
            debug!(
                "Bound {:?} to GPIO {}",
                self.input.buttons[index].button(),
                pin
            );
        }

        let mut notify_only = vec![self.config.pins.avr_irq, self.config.pins.headphones];
        if self.hardware.radio.is_some() {
            notify_only.push(self.config.pins.nrf_irq);
        }
        for pin in notify_only {
            let sender = self.hw_events.sender();
            self.hardware.lines.bind(
                pin,
                Box::new(move |_| {
                    sender.send(HwEvent::Irq { pin });
                }),
            )?;
            debug!("Bound interrupt line GPIO {}", pin);
        }

        if let Some(accel) = self.hardware.accel.as_mut() {
            if let Err(e) = accel.reset(self.hardware.bus.as_mut()) {
                warn!("Accelerometer did not respond, disabling it: {}", e);
                self.hardware.accel = None;
            }
        }

        // buttons held during start-up
        let pressed: Vec<usize> = self.input.pins.values().copied().collect();
        for index in pressed {
            if let Some(transition) = self.input.buttons[index].on_edge() {
                self.apply_transition(index, transition);
            }
        }

        self.poll_status();
        self.poll_extended();
        self.publish_status();

        info!(
            "Driver initialized, co-processor at 0x{:02x}, {} local buttons",
            self.link.address(),
            self.input.pins.len()
        );
        Ok(self.transition())
    }
}

impl Driver<Running> {
    /// Drives the loop until [`HwEvent::Shutdown`]
    pub async fn run(mut self) {
        info!("Driver loop running");
        let timeout = self.config.queue_timeout();
        loop {
            match self.hw_events.receive(timeout).await {
                Some(event) => {
                    if !self.step(event) {
                        break;
                    }
                }
                None => trace!("Hardware queue idle"),
            }
        }
        info!(
            "Driver loop finished after {} events",
            self.stats.total_events
        );
    }

    /// Handles everything already queued without waiting
    ///
    /// Returns `false` once a shutdown request was processed.
    pub fn drain(&mut self) -> bool {
        while let Some(event) = self.hw_events.try_receive() {
            if !self.step(event) {
                return false;
            }
        }
        true
    }

    /// Processes one hardware event and publishes the resulting status
    ///
    /// Returns `false` for [`HwEvent::Shutdown`].
    pub fn step(&mut self, event: HwEvent) -> bool {
        trace!("Processing {:?}", event);
        self.stats.events += 1;
        self.stats.total_events += 1;

        match event {
            HwEvent::Tick => self.on_tick(),
            HwEvent::SecondTick => self.on_second_tick(),
            HwEvent::Irq { pin } => self.on_irq(pin),
            HwEvent::KeyPress { key, state } => {
                if let Err(e) = self.hardware.keyboard.key(key, state) {
                    warn!("Keyboard write failed for key {}: {}", key, e);
                }
            }
            HwEvent::EnableGamepad { enable } => self.enable_gamepad(enable),
            HwEvent::Command(command) => self.send_command(command),
            HwEvent::SetVolume { volume } => {
                self.status.volume = volume.min(MAX_VOLUME);
            }
            HwEvent::Message(message) => self.on_message(message),
            HwEvent::Shutdown => {
                info!("Shutdown requested");
                self.publish_status();
                self.events.send(Event::Shutdown);
                return false;
            }
        }

        self.publish_status();
        true
    }

    fn on_tick(&mut self) {
        for index in 0..self.input.buttons.len() {
            if let Some(transition) = self.input.buttons[index].tick() {
                self.apply_transition(index, transition);
            }
        }
        self.sample_accel();

        self.health.ticks_since_poll += 1;
        if self.health.ticks_since_poll >= self.config.status_poll_ticks {
            self.poll_status();
        }
    }

    fn on_second_tick(&mut self) {
        self.poll_extended();

        debug!(
            "Driver rates: {} events/s, {} polls/s, {} errors/s, {} button events/s",
            self.stats.events, self.stats.polls, self.stats.errors, self.stats.buttons
        );
        self.stats.events = 0;
        self.stats.polls = 0;
        self.stats.errors = 0;
        self.stats.buttons = 0;

        let now = Local::now();
        if now - self.stats.last_summary >= Duration::seconds(SUMMARY_INTERVAL_SECS) {
            let (transactions, failures) = self.link.counters();
            info!(
                "Driver stats: up {}s, {} events, {} link transactions, {} failed, mode {:?}",
                (now - self.stats.started).num_seconds(),
                self.stats.total_events,
                transactions,
                failures,
                self.status.mode
            );
            self.stats.last_summary = now;
        }
    }

    fn on_irq(&mut self, pin: u8) {
        if let Some(&index) = self.input.pins.get(&pin) {
            if let Some(transition) = self.input.buttons[index].on_edge() {
                self.apply_transition(index, transition);
            }
        } else if pin == self.config.pins.avr_irq || pin == self.config.pins.headphones {
            // out of cadence, the next regular poll restarts its count
            self.poll_status();
        } else if pin == self.config.pins.nrf_irq {
            if let Some(radio) = self.hardware.radio.as_mut() {
                if let Err(e) = radio.handle_irq() {
                    warn!("Radio interrupt handling failed: {}", e);
                }
            }
        } else {
            debug!("Interrupt on unexpected GPIO {}", pin);
        }
    }

    fn on_message(&mut self, message: Message) {
        match &message {
            Message::AvrReset => warn!("Co-processor reports a reset"),
            Message::RumblerFail => warn!("Co-processor reports a rumbler failure"),
            other => debug!("Co-processor notice: {:?}", other),
        }
        self.events.send(Event::Message(message));
    }

    fn enable_gamepad(&mut self, enable: bool) {
        if self.input.gamepad_enabled == enable {
            return;
        }
        info!("Gamepad {}", if enable { "enabled" } else { "disabled" });
        self.input.gamepad_enabled = enable;
        if !enable {
            return;
        }

        // bring the fresh device up to the current state
        for index in 0..self.input.buttons.len() {
            let button = self.input.buttons[index].button();
            let pressed = self.input.buttons[index].reported();
            if pressed || button.axis_value() == 0 {
                self.write_button(button, pressed);
            }
        }
        for axis in [
            self.input.thumb_x.clone(),
            self.input.thumb_y.clone(),
            self.input.accel_x.clone(),
            self.input.accel_y.clone(),
        ] {
            self.write_axis(axis.axis(), axis.current());
        }
    }
}

// Shared by initialization and the running loop
impl<S: DriverState> Driver<S> {
    fn apply_transition(&mut self, index: usize, transition: Transition) {
        let button = self.input.buttons[index].button();
        debug!(
            "Button {:?} {}{}",
            button,
            if transition.pressed {
                "pressed"
            } else {
                "released"
            },
            if transition.repeat { " (repeat)" } else { "" }
        );
        self.stats.buttons += 1;
        self.write_button(button, transition.pressed);
        self.events.send(Event::Button {
            button,
            pressed: transition.pressed,
            repeat: transition.repeat,
        });
    }

    fn write_button(&mut self, button: Button, pressed: bool) {
        let code = button.code();
        if !self.input.gamepad_enabled || code == codes::KEY_RESERVED {
            return;
        }
        let result = match button.axis_value() {
            0 => self.hardware.gamepad.key(code, pressed),
            value => self
                .hardware
                .gamepad
                .abs(code, if pressed { value } else { 0 }),
        };
        if let Err(e) = result {
            warn!("Gamepad write failed for {:?}: {}", button, e);
        }
    }

    fn write_axis(&mut self, axis: Axis, value: u8) {
        if !self.input.gamepad_enabled {
            return;
        }
        if let Err(e) = self.hardware.gamepad.abs(axis.code(), value as i32) {
            warn!("Gamepad write failed for {:?}: {}", axis, e);
        }
    }

    /// Fast poll: status frame, co-processor buttons and the thumbstick
    fn poll_status(&mut self) {
        self.health.ticks_since_poll = 0;
        self.stats.polls += 1;

        let frame = match self.link.query_status(self.hardware.bus.as_mut()) {
            Ok(frame) => frame,
            Err(e) => {
                self.link_failed("status", e);
                return;
            }
        };
        self.link_ok();

        self.status.apply_status(&frame);
        self.apply_controls(frame.controls);

        if frame.notice_pending {
            match self.link.query_notice(self.hardware.bus.as_mut()) {
                Ok(message) => {
                    // handled in queue order like any other producer
                    self.hw_events.sender().send(HwEvent::Message(message));
                }
                Err(e) => self.link_failed("notice", e),
            }
        }
    }

    fn poll_extended(&mut self) {
        match self.link.query_extended(self.hardware.bus.as_mut()) {
            Ok(frame) => {
                self.link_ok();
                self.status.apply_extended(&frame);
            }
            Err(e) => self.link_failed("extended status", e),
        }
    }

    fn apply_controls(&mut self, controls: Controls) {
        for index in 0..self.input.buttons.len() {
            let Some(bit) = self.input.buttons[index].button().avr_bit() else {
                continue;
            };
            let pressed = controls.is_pressed(bit);
            if pressed == self.input.controls.is_pressed(bit) {
                continue;
            }
            if let Some(transition) = self.input.buttons[index].raw_change(pressed) {
                self.apply_transition(index, transition);
            }
        }

        let x_changed = self.input.thumb_x.update(controls.thumb_x);
        let y_changed = self.input.thumb_y.update(controls.thumb_y);
        if x_changed {
            self.write_axis(Axis::ThumbX, controls.thumb_x);
        }
        if y_changed {
            self.write_axis(Axis::ThumbY, controls.thumb_y);
        }
        if x_changed || y_changed {
            self.events.send(Event::Thumbstick {
                x: controls.thumb_x,
                y: controls.thumb_y,
            });
        }

        self.input.controls = controls;
    }

    fn sample_accel(&mut self) {
        let Some(accel) = self.hardware.accel.as_mut() else {
            return;
        };
        let data = match accel.read_accel(self.hardware.bus.as_mut()) {
            Ok(data) => data,
            Err(e) => {
                debug!("Accelerometer read failed: {}", e);
                return;
            }
        };

        let x = accel_to_axis(data.x);
        let y = accel_to_axis(data.y);
        let x_changed = self.input.accel_x.update(x);
        let y_changed = self.input.accel_y.update(y);
        if x_changed {
            self.write_axis(Axis::AccelX, x);
        }
        if y_changed {
            self.write_axis(Axis::AccelY, y);
        }
        if x_changed || y_changed {
            self.events.send(Event::Accel { x, y });
        }
    }

    fn send_command(&mut self, command: Command) {
        debug!("Sending {:?}", command);
        match self.link.send(self.hardware.bus.as_mut(), &command) {
            Ok(()) => self.link_ok(),
            Err(e) => self.link_failed("command", e),
        }
    }

    fn link_ok(&mut self) {
        self.health.consecutive_failures = 0;
        if self.health.lost {
            self.health.lost = false;
            info!("Co-processor link restored");
            self.events.send(Event::LinkRestored);
        }
    }

    fn link_failed(&mut self, what: &str, e: LinkError) {
        self.link_errors.fetch_add(1, Ordering::Relaxed);
        self.stats.errors += 1;
        self.health.consecutive_failures += 1;

        if self.health.consecutive_failures == 1 {
            warn!("Co-processor {} transaction failed: {}", what, e);
        } else {
            debug!(
                "Co-processor {} transaction failed ({} in a row): {}",
                what, self.health.consecutive_failures, e
            );
        }

        if !self.health.lost
            && self.health.consecutive_failures >= self.config.max_consecutive_errors
        {
            self.health.lost = true;
            error!(
                "Co-processor link lost after {} failed transactions",
                self.health.consecutive_failures
            );
            self.events.send(Event::LinkLost);
        }
    }

    /// Edge-triggered: one event per changed group, then a new snapshot
    fn publish_status(&mut self) {
        if self.status == self.published {
            return;
        }
        for event in self.status.changes(&self.published) {
            debug!("Status change: {:?}", event);
            self.events.send(event);
        }
        self.published = self.status.clone();
        self.status_sender.send_replace(self.status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::{Mode, REQUEST_EXTENDED, REQUEST_STATUS};
    use crate::hal::mock::{MockCoprocessor, MockLines, MockRadio, RecordingSink, Reply, SinkWrite};
    use crate::hal::{AccelData, BusError};

    struct Rig {
        avr: MockCoprocessor,
        lines: MockLines,
        gamepad: RecordingSink,
        keyboard: RecordingSink,
        events: EventQueue<Event>,
        driver: Driver<Running>,
    }

    fn rig_with(config: DriverConfig) -> Rig {
        let avr = MockCoprocessor::new();
        let lines = MockLines::new();
        let gamepad = RecordingSink::new();
        let keyboard = RecordingSink::new();
        let hardware = Hardware::simulated(&avr, lines.clone())
            .with_gamepad(Box::new(gamepad.clone()))
            .with_keyboard(Box::new(keyboard.clone()));
        let events = EventQueue::new();
        let (status_sender, _) = watch::channel(Status::default());
        let driver = Driver::create(config, hardware, events.sender(), status_sender)
            .initialize()
            .unwrap();
        let mut rig = Rig {
            avr,
            lines,
            gamepad,
            keyboard,
            events,
            driver,
        };
        rig.take_events();
        rig
    }

    fn rig() -> Rig {
        rig_with(DriverConfig {
            gamepad_enabled: true,
            ..Default::default()
        })
    }

    impl Rig {
        fn take_events(&mut self) -> Vec<Event> {
            let mut events = Vec::new();
            while let Some(event) = self.events.try_receive() {
                events.push(event);
            }
            events
        }

        fn tick(&mut self, n: usize) {
            for _ in 0..n {
                self.driver.step(HwEvent::Tick);
                assert!(self.driver.drain());
            }
        }

        fn requests(&self, request: u8) -> usize {
            self.avr
                .requests()
                .iter()
                .filter(|&&sent| sent == request)
                .count()
        }

        fn button_events(&mut self) -> Vec<(Button, bool, bool)> {
            self.take_events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Button {
                        button,
                        pressed,
                        repeat,
                    } => Some((button, pressed, repeat)),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn initialization_publishes_first_status() {
        let avr = MockCoprocessor::new();
        let hardware = Hardware::simulated(&avr, MockLines::new());
        let mut events = EventQueue::new();
        let (status_sender, status_receiver) = watch::channel(Status::default());
        let _driver = Driver::create(
            DriverConfig::default(),
            hardware,
            events.sender(),
            status_sender,
        )
        .initialize()
        .unwrap();

        let status = status_receiver.borrow().clone();
        assert_eq!(status.ssid, "rckid");
        assert!(status.wifi);
        assert_eq!(status.avr_temp, 250);
        assert_eq!(
            events.try_receive(),
            Some(Event::Temperature {
                avr: 250,
                accel: 250
            })
        );
    }

    #[test]
    fn gpio_bounce_is_debounced() {
        let mut rig = rig();
        let pin = rig.driver.config.pins.btn_a;

        rig.lines.fire(pin, false);
        rig.lines.fire(pin, true);
        rig.lines.fire(pin, false);
        assert!(rig.driver.drain());
        assert_eq!(rig.button_events(), vec![(Button::A, true, false)]);

        rig.tick(4);
        assert_eq!(rig.button_events(), vec![]);

        rig.lines.fire(pin, true);
        assert!(rig.driver.drain());
        assert_eq!(rig.button_events(), vec![(Button::A, false, false)]);
        assert_eq!(
            rig.gamepad.writes(),
            vec![
                SinkWrite::Key {
                    code: codes::BTN_EAST,
                    pressed: true
                },
                SinkWrite::Key {
                    code: codes::BTN_EAST,
                    pressed: false
                },
            ]
        );
    }

    #[test]
    fn coprocessor_buttons_arrive_with_the_fast_poll() {
        let mut rig = rig();
        rig.avr.set_button_bits(1 << 3 | 1 << 7);
        rig.tick(2);
        assert_eq!(
            rig.button_events(),
            vec![(Button::Up, true, false), (Button::Joy, true, false)]
        );
        assert!(rig.gamepad.writes().contains(&SinkWrite::Abs {
            code: codes::ABS_HAT0Y,
            value: -1
        }));

        rig.avr.set_button_bits(0);
        rig.tick(2);
        assert_eq!(
            rig.button_events(),
            vec![(Button::Up, false, false), (Button::Joy, false, false)]
        );
    }

    #[test]
    fn held_button_autorepeats() {
        let mut rig = rig_with(DriverConfig {
            autorepeat_ticks: 5,
            ..Default::default()
        });
        rig.lines.fire(rig.driver.config.pins.btn_l, false);
        rig.tick(12);
        assert_eq!(
            rig.button_events(),
            vec![
                (Button::L, true, false),
                (Button::L, true, true),
                (Button::L, true, true)
            ]
        );
    }

    #[test]
    fn truncated_frame_leaves_status_and_counts_error() {
        let mut rig = rig();
        let before = rig.driver.status().clone();
        rig.avr.update(|avr| avr.status.vbatt = 300);
        rig.avr.push_reply(Reply::Raw(vec![0xa1, 16, 0, 0]));
        rig.tick(2);

        assert_eq!(rig.driver.status(), &before);
        assert_eq!(rig.driver.link_errors(), 1);
        assert!(rig.take_events().is_empty());
    }

    #[test]
    fn link_loss_and_recovery_are_reported_once() {
        let mut rig = rig_with(DriverConfig {
            max_consecutive_errors: 3,
            ..Default::default()
        });
        for _ in 0..5 {
            rig.avr.push_reply(Reply::Fail(BusError::Timeout { address: 0x43 }));
        }
        rig.tick(10);
        rig.tick(2);

        let events = rig.take_events();
        assert_eq!(
            events,
            vec![Event::LinkLost, Event::LinkRestored],
            "got {:?}",
            events
        );
        assert_eq!(rig.driver.link_errors(), 5);
    }

    #[test]
    fn notices_and_command_acks_reach_the_main_thread() {
        let mut rig = rig();
        rig.driver
            .step(HwEvent::Command(Command::EnterRepairMode));
        rig.tick(2);

        assert_eq!(rig.avr.commands(), vec![Command::EnterRepairMode]);
        let events = rig.take_events();
        assert_eq!(
            events,
            vec![
                Event::Mode(Mode::Repair),
                Event::Message(Message::EnterRepairMode)
            ]
        );
    }

    #[test]
    fn volume_is_clamped_and_published_once() {
        let mut rig = rig();
        rig.driver.step(HwEvent::SetVolume { volume: 250 });
        rig.driver.step(HwEvent::SetVolume { volume: 250 });
        assert_eq!(rig.take_events(), vec![Event::Volume(MAX_VOLUME)]);
    }

    #[test]
    fn thumbstick_changes_are_published() {
        let mut rig = rig();
        rig.avr.update(|avr| avr.status.controls.thumb_x = 200);
        rig.tick(2);
        rig.tick(2);
        assert_eq!(rig.take_events(), vec![Event::Thumbstick { x: 200, y: 128 }]);
    }

    #[test]
    fn disabled_gamepad_sees_no_writes_until_enabled() {
        let mut rig = rig_with(DriverConfig::default());
        rig.lines.fire(rig.driver.config.pins.btn_b, false);
        assert!(rig.driver.drain());
        assert!(rig.gamepad.writes().is_empty());

        rig.driver.step(HwEvent::EnableGamepad { enable: true });
        assert!(rig.gamepad.writes().contains(&SinkWrite::Key {
            code: codes::BTN_SOUTH,
            pressed: true
        }));
    }

    #[test]
    fn radio_interrupt_is_serviced() {
        let avr = MockCoprocessor::new();
        let lines = MockLines::new();
        let radio = MockRadio::new();
        let hardware =
            Hardware::simulated(&avr, lines.clone()).with_radio(Box::new(radio.clone()));
        let events = EventQueue::new();
        let (status_sender, _) = watch::channel(Status::default());
        let config = DriverConfig::default();
        let nrf = config.pins.nrf_irq;
        let mut driver = Driver::create(config, hardware, events.sender(), status_sender)
            .initialize()
            .unwrap();

        assert!(driver.status().nrf);
        lines.fire(nrf, false);
        assert!(driver.drain());
        assert_eq!(radio.serviced(), 1);
    }

    #[test]
    fn without_radio_nrf_line_stays_unbound() {
        let rig = rig();
        assert!(!rig.driver.status().nrf);
        assert!(!rig.lines.is_bound(rig.driver.config.pins.nrf_irq));
        assert!(rig.lines.is_bound(rig.driver.config.pins.avr_irq));
    }

    #[test]
    fn shutdown_is_the_last_event() {
        let mut rig = rig();
        rig.driver.hw_sender().send(HwEvent::SetVolume { volume: 10 });
        rig.driver.hw_sender().send(HwEvent::Shutdown);
        assert!(!rig.driver.drain());
        assert_eq!(
            rig.take_events(),
            vec![Event::Volume(10), Event::Shutdown]
        );
    }

    #[test]
    fn interrupt_lines_poll_out_of_cadence() {
        let mut rig = rig();
        let avr_irq = rig.driver.config.pins.avr_irq;
        let headphones = rig.driver.config.pins.headphones;
        let polls = rig.requests(REQUEST_STATUS);

        rig.tick(1);
        assert_eq!(rig.requests(REQUEST_STATUS), polls);

        rig.lines.fire(avr_irq, false);
        assert!(rig.driver.drain());
        assert_eq!(rig.requests(REQUEST_STATUS), polls + 1);

        // the extra poll restarts the count
        rig.tick(1);
        assert_eq!(rig.requests(REQUEST_STATUS), polls + 1);
        rig.tick(1);
        assert_eq!(rig.requests(REQUEST_STATUS), polls + 2);

        rig.lines.fire(headphones, true);
        assert!(rig.driver.drain());
        assert_eq!(rig.requests(REQUEST_STATUS), polls + 3);
    }

    #[test]
    fn headphones_follow_the_status_frame() {
        let mut rig = rig();
        let pin = rig.driver.config.pins.headphones;

        rig.avr.update(|avr| avr.status.headphones = true);
        rig.lines.fire(pin, false);
        assert!(rig.driver.drain());
        assert!(rig.driver.status().headphones);
        assert_eq!(rig.take_events(), vec![Event::Headphones(true)]);

        rig.avr.update(|avr| avr.status.headphones = false);
        rig.tick(2);
        assert!(!rig.driver.status().headphones);
        assert_eq!(rig.take_events(), vec![Event::Headphones(false)]);
    }

    #[test]
    fn second_tick_refreshes_extended_status() {
        let mut rig = rig();
        let status = rig.driver.subscribe();
        let extended = rig.requests(REQUEST_EXTENDED);

        rig.avr.update(|avr| {
            avr.extended.ssid = String::from("garage");
            avr.extended.hotspot = true;
        });
        rig.driver.step(HwEvent::SecondTick);

        assert_eq!(rig.requests(REQUEST_EXTENDED), extended + 1);
        assert_eq!(status.borrow().ssid, "garage");
        assert!(status.borrow().wifi_hotspot);
        // network state has no callback of its own
        assert!(rig.take_events().is_empty());
    }

    #[test]
    fn key_presses_go_to_the_keyboard_only() {
        let mut rig = rig();
        rig.driver.step(HwEvent::KeyPress {
            key: 30,
            state: true,
        });
        rig.driver.step(HwEvent::KeyPress {
            key: 30,
            state: false,
        });

        assert_eq!(
            rig.keyboard.writes(),
            vec![
                SinkWrite::Key {
                    code: 30,
                    pressed: true
                },
                SinkWrite::Key {
                    code: 30,
                    pressed: false
                },
            ]
        );
        assert!(rig.gamepad.writes().is_empty());
        assert!(rig.take_events().is_empty());
    }

    #[test]
    fn accelerometer_changes_are_written_once() {
        let mut rig = rig();
        rig.avr.update(|avr| {
            avr.accel = AccelData {
                x: 0x1000,
                y: -0x2000,
                z: 0,
            }
        });
        rig.tick(1);
        assert_eq!(rig.take_events(), vec![Event::Accel { x: 144, y: 96 }]);
        assert_eq!(
            rig.gamepad.writes(),
            vec![
                SinkWrite::Abs {
                    code: codes::ABS_RX,
                    value: 144
                },
                SinkWrite::Abs {
                    code: codes::ABS_RY,
                    value: 96
                },
            ]
        );

        // same sample, nothing new
        rig.tick(1);
        assert!(rig.take_events().is_empty());
        assert_eq!(rig.gamepad.writes().len(), 2);

        rig.avr.update(|avr| avr.accel.y = 0);
        rig.tick(1);
        assert_eq!(rig.take_events(), vec![Event::Accel { x: 144, y: 128 }]);
        assert_eq!(
            rig.gamepad.writes().last(),
            Some(&SinkWrite::Abs {
                code: codes::ABS_RY,
                value: 128
            })
        );
        assert_eq!(rig.gamepad.writes().len(), 3);
    }
}
