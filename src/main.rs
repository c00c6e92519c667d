use color_eyre::{eyre::eyre, Result};
use rckid::comms::{Message, Mode};
use rckid::config::DriverConfig;
use rckid::driver::{Application, Button, DriverHandle, Hardware};
use rckid::hal::mock::{MockCoprocessor, MockLines};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// One UI frame at 60 Hz
const FRAME: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;

    // The simulated co-processor must outlive the driver
    let mut simulation = None;
    let hardware = if config.mock {
        let avr = MockCoprocessor::new();
        let hardware = Hardware::simulated(&avr, MockLines::new());
        simulation = Some(tokio::spawn(simulate_presses(avr)));
        hardware
    } else {
        Hardware::raspberry_pi(&config).map_err(|e| eyre!("Failed to open hardware: {}", e))?
    };

    let (handle, mut main_loop) = DriverHandle::spawn(config, hardware)
        .await
        .map_err(|e| eyre!("Failed to spawn driver: {}", e))?;

    handle
        .set_time(&chrono::Local::now())
        .map_err(|e| eyre!("Failed to set co-processor time: {}", e))?;
    info!(
        "Driver up: mode {:?}, battery {}.{:02} V, wifi {} ({})",
        handle.mode(),
        handle.vbatt() / 100,
        handle.vbatt() % 100,
        handle.wifi(),
        handle.ssid()
    );

    let mut app = LoggingApp;
    tokio::select! {
        _ = main_loop.run(&mut app, FRAME) => warn!("Driver stopped on its own"),
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| eyre!("Failed to wait for Ctrl-C: {}", e))?;
            info!("Ctrl-C received");
        }
    }

    if let Some(simulation) = simulation {
        simulation.abort();
    }
    handle
        .shutdown()
        .await
        .map_err(|e| eyre!("Driver shutdown failed: {}", e))?;
    // everything published up to the final shutdown event
    main_loop.poll(&mut app);

    info!("rckid stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn load_config() -> Result<DriverConfig> {
    let path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => DriverConfig::default_path()?,
    };
    info!("Loading driver config from {}", path.display());
    DriverConfig::load_or_create(&path).await
}

// Presses Start every few seconds so a mock run shows the whole pipeline
async fn simulate_presses(avr: MockCoprocessor) {
    let mut interval = tokio::time::interval(Duration::from_secs(3));
    let mut pressed = false;
    loop {
        interval.tick().await;
        pressed = !pressed;
        avr.set_button_bits(if pressed { 1 << 1 } else { 0 });
    }
}

struct LoggingApp;

impl Application for LoggingApp {
    fn button(&mut self, button: Button, pressed: bool) {
        info!("{:?} {}", button, if pressed { "down" } else { "up" });
    }

    fn button_repeat(&mut self, button: Button) {
        info!("{:?} repeat", button);
    }

    fn thumbstick(&mut self, x: u8, y: u8) {
        info!("Thumbstick {} {}", x, y);
    }

    fn accel(&mut self, x: u8, y: u8) {
        info!("Accelerometer {} {}", x, y);
    }

    fn mode_changed(&mut self, mode: Mode) {
        info!("Mode {:?}", mode);
    }

    fn charging_changed(&mut self, usb: bool, charging: bool) {
        info!("USB {}, charging {}", usb, charging);
    }

    fn voltage_changed(&mut self, vbatt: u16, vcc: u16) {
        info!("Battery {} cV, VCC {} cV", vbatt, vcc);
    }

    fn temperature_changed(&mut self, avr: i16, accel: i16) {
        info!("Temperature AVR {} dC, accelerometer {} dC", avr, accel);
    }

    fn headphones_changed(&mut self, connected: bool) {
        info!("Headphones {}", if connected { "in" } else { "out" });
    }

    fn volume_changed(&mut self, volume: u8) {
        info!("Volume {}", volume);
    }

    fn message(&mut self, message: Message) {
        info!("Co-processor: {:?}", message);
    }

    fn link_lost(&mut self) {
        warn!("Co-processor link lost");
    }

    fn link_restored(&mut self) {
        info!("Co-processor link restored");
    }

    fn shutdown(&mut self) {
        info!("Driver shut down");
    }
}
