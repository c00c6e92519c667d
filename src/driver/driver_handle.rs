//! Driver Handle - main-thread API for the driver thread
//!
//! Spawns the driver on a blocking thread together with the ticker task, turns method
//! calls into [`HwEvent`]s and reads status from the published snapshot. Nothing in here
//! touches the bus.

use chrono::{DateTime, TimeZone};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::driver_loop::Driver;
use super::event_queue::{EventQueue, EventSender};
use super::events::HwEvent;
use super::hardware::Hardware;
use super::main_loop::MainLoop;
use super::status::{Status, MAX_VOLUME};
use super::DriverError;
use crate::comms::{Command, Mode};
use crate::config::DriverConfig;

const SECOND: Duration = Duration::from_secs(1);

/// Dropping the handle stops the driver as well, without waiting for it
pub struct DriverHandle {
    hw_sender: EventSender<HwEvent>,
    status: watch::Receiver<Status>,
    link_errors: Arc<AtomicU32>,
    cancel: CancellationToken,
    // taken by `shutdown`
    ticker: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Initializes the driver and starts it
    ///
    /// Returns the handle and the [`MainLoop`] the application pulls events from.
    /// Initialization runs on the blocking pool as it talks to the bus.
    pub async fn spawn(
        config: DriverConfig,
        hardware: Hardware,
    ) -> Result<(Self, MainLoop), DriverError> {
        info!("Spawning driver");
        config
            .validate()
            .map_err(|e| DriverError::Initialization(e.to_string()))?;

        let events = EventQueue::new();
        let (status_sender, status) = watch::channel(Status::default());
        let tick_period = config.tick_period();
        let driver = Driver::create(config, hardware, events.sender(), status_sender);

        let driver = tokio::task::spawn_blocking(move || driver.initialize())
            .await
            .map_err(|e| DriverError::Join(e.to_string()))??;

        let hw_sender = driver.hw_sender();
        let link_errors = driver.link_error_counter();
        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(hw_sender.clone(), tick_period, cancel.clone()));

        // a dedicated thread: bus transactions block
        let runtime = Handle::current();
        let driver = tokio::task::spawn_blocking(move || runtime.block_on(driver.run()));
        debug!("Driver task spawned with handle: {:?}", driver);

        info!("Driver successfully started");
        Ok((
            Self {
                hw_sender,
                status: status.clone(),
                link_errors,
                cancel,
                ticker: Some(ticker),
                driver: Some(driver),
            },
            MainLoop::new(events, status),
        ))
    }

    fn send(&self, event: HwEvent) -> Result<(), DriverError> {
        if self.hw_sender.send(event) {
            Ok(())
        } else {
            Err(DriverError::Channel(String::from("driver thread stopped")))
        }
    }

    fn command(&self, command: Command) -> Result<(), DriverError> {
        self.send(HwEvent::Command(command))
    }

    pub fn enable_gamepad(&self, enable: bool) -> Result<(), DriverError> {
        self.send(HwEvent::EnableGamepad { enable })
    }

    /// Keyboard event on the virtual keyboard, independent of the gamepad
    pub fn key_press(&self, key: u16, state: bool) -> Result<(), DriverError> {
        self.send(HwEvent::KeyPress { key, state })
    }

    pub fn set_brightness(&self, value: u8) -> Result<(), DriverError> {
        self.command(Command::SetBrightness { value })
    }

    /// Sets the co-processor's real time clock
    pub fn set_time<Tz: TimeZone>(&self, time: &DateTime<Tz>) -> Result<(), DriverError> {
        let timestamp = time.timestamp();
        let unix_seconds = u32::try_from(timestamp).map_err(|_| {
            DriverError::InvalidArgument(format!("timestamp {} out of range", timestamp))
        })?;
        self.command(Command::SetTime { unix_seconds })
    }

    pub fn set_alarm(&self, hour: u8, minute: u8, enabled: bool) -> Result<(), DriverError> {
        self.command(Command::SetAlarm {
            hour,
            minute,
            enabled,
        })
    }

    pub fn rumble(&self, strength: u8, duration_ms: u16) -> Result<(), DriverError> {
        self.command(Command::Rumble {
            strength,
            duration_ms,
        })
    }

    pub fn power_down(&self) -> Result<(), DriverError> {
        self.command(Command::PowerDown)
    }

    pub fn enter_repair_mode(&self) -> Result<(), DriverError> {
        self.command(Command::EnterRepairMode)
    }

    pub fn leave_repair_mode(&self) -> Result<(), DriverError> {
        self.command(Command::LeaveRepairMode)
    }

    /// Clamped to 0..=100
    pub fn set_volume(&self, volume: u8) -> Result<(), DriverError> {
        self.send(HwEvent::SetVolume {
            volume: volume.min(MAX_VOLUME),
        })
    }

    /// Snapshot of everything below
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Resolves once the driver published a status different from the last one seen
    pub async fn status_changed(&mut self) -> Result<Status, DriverError> {
        self.status
            .changed()
            .await
            .map_err(|e| DriverError::Channel(e.to_string()))?;
        Ok(self.status.borrow_and_update().clone())
    }

    pub fn mode(&self) -> Mode {
        self.status.borrow().mode
    }

    pub fn usb(&self) -> bool {
        self.status.borrow().usb
    }

    pub fn charging(&self) -> bool {
        self.status.borrow().charging
    }

    pub fn vbatt(&self) -> u16 {
        self.status.borrow().vbatt
    }

    pub fn vcc(&self) -> u16 {
        self.status.borrow().vcc
    }

    pub fn avr_temp(&self) -> i16 {
        self.status.borrow().avr_temp
    }

    pub fn accel_temp(&self) -> i16 {
        self.status.borrow().accel_temp
    }

    pub fn headphones(&self) -> bool {
        self.status.borrow().headphones
    }

    pub fn volume(&self) -> u8 {
        self.status.borrow().volume
    }

    pub fn wifi(&self) -> bool {
        self.status.borrow().wifi
    }

    pub fn wifi_hotspot(&self) -> bool {
        self.status.borrow().wifi_hotspot
    }

    pub fn ssid(&self) -> String {
        self.status.borrow().ssid.clone()
    }

    pub fn nrf(&self) -> bool {
        self.status.borrow().nrf
    }

    /// Failed co-processor transactions since start
    pub fn link_errors(&self) -> u32 {
        self.link_errors.load(Ordering::Relaxed)
    }

    /// Stops the driver and waits for both tasks
    ///
    /// The driver publishes [`super::Event::Shutdown`] as its last event, so a
    /// [`MainLoop`] still running drains everything before it and then returns.
    pub async fn shutdown(mut self) -> Result<(), DriverError> {
        info!("Shutting down driver");
        // a driver that already stopped is fine, joining reports how it ended
        let _ = self.send(HwEvent::Shutdown);

        if let Some(driver) = self.driver.take() {
            driver.await.map_err(|e| {
                error!("Driver task failed: {}", e);
                DriverError::Join(e.to_string())
            })?;
        }
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            ticker
                .await
                .map_err(|e| DriverError::Join(e.to_string()))?;
        }
        info!("Driver stopped");
        Ok(())
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if self.driver.is_some() {
            warn!("Driver handle dropped without shutdown, stopping driver");
            let _ = self.send(HwEvent::Shutdown);
        }
        self.cancel.cancel();
    }
}

async fn run_ticker(sender: EventSender<HwEvent>, period: Duration, cancel: CancellationToken) {
    debug!("Ticker running every {:?}", period);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut second = interval(SECOND);
    second.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick of an interval completes immediately
    second.tick().await;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => HwEvent::Tick,
            _ = second.tick() => HwEvent::SecondTick,
        };
        if !sender.send(event) {
            break;
        }
    }
    debug!("Ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Application;
    use crate::hal::mock::{MockCoprocessor, MockLines};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commands_reach_the_coprocessor() {
        let avr = MockCoprocessor::new();
        let hardware = Hardware::simulated(&avr, MockLines::new());
        let (handle, _main_loop) = DriverHandle::spawn(DriverConfig::default(), hardware)
            .await
            .unwrap();

        handle.set_brightness(80).unwrap();
        handle.rumble(200, 150).unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(
            avr.commands(),
            vec![
                Command::SetBrightness { value: 80 },
                Command::Rumble {
                    strength: 200,
                    duration_ms: 150
                }
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_config_is_rejected_before_spawning() {
        let avr = MockCoprocessor::new();
        let hardware = Hardware::simulated(&avr, MockLines::new());
        let config = DriverConfig {
            tick_ms: 0,
            ..Default::default()
        };
        let result = DriverHandle::spawn(config, hardware).await;
        assert!(matches!(result, Err(DriverError::Initialization(_))));
        assert!(avr.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_sends_ticks_and_second_ticks() {
        let mut queue = EventQueue::new();
        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            queue.sender(),
            Duration::from_millis(250),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        cancel.cancel();
        ticker.await.unwrap();

        let mut ticks = 0;
        let mut seconds = 0;
        while let Some(event) = queue.try_receive() {
            match event {
                HwEvent::Tick => ticks += 1,
                HwEvent::SecondTick => seconds += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(ticks, 5);
        assert_eq!(seconds, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_handle_stops_the_driver() {
        #[derive(Default)]
        struct Stopped(bool);

        impl Application for Stopped {
            fn shutdown(&mut self) {
                self.0 = true;
            }
        }

        let avr = MockCoprocessor::new();
        let hardware = Hardware::simulated(&avr, MockLines::new());
        let (handle, mut main_loop) = DriverHandle::spawn(DriverConfig::default(), hardware)
            .await
            .unwrap();
        drop(handle);

        let mut app = Stopped::default();
        tokio::time::timeout(
            Duration::from_secs(2),
            main_loop.run(&mut app, Duration::from_millis(5)),
        )
        .await
        .expect("main loop ends once the handle is gone");
        assert!(app.0);
        assert!(main_loop.is_finished());
    }
}
