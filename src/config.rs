//! Driver configuration, stored as TOML next to the other user configuration
//!
//! Missing files are created with defaults so the driver always starts; a file that
//! exists but does not parse or validate is an error, silently replacing a user's
//! settings would be worse.

use crate::comms::CoprocessorLink;
use crate::hal::Mpu6050;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "rckid";
const CONFIG_FILE: &str = "driver.toml";

/// BCM numbers of the interrupt capable lines
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub btn_a: u8,
    pub btn_b: u8,
    pub btn_x: u8,
    pub btn_y: u8,
    pub btn_l: u8,
    pub btn_r: u8,
    pub avr_irq: u8,
    pub nrf_irq: u8,
    pub headphones: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            btn_a: 18,
            btn_b: 17,
            btn_x: 15,
            btn_y: 23,
            btn_l: 7,
            btn_r: 0,
            avr_irq: 25,
            nrf_irq: 4,
            headphones: 6,
        }
    }
}

impl PinConfig {
    fn all(&self) -> [u8; 9] {
        [
            self.btn_a,
            self.btn_b,
            self.btn_x,
            self.btn_y,
            self.btn_l,
            self.btn_r,
            self.avr_irq,
            self.nrf_irq,
            self.headphones,
        ]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    pub i2c_bus: u8,
    pub avr_address: u16,
    pub accel_address: u16,
    pub bus_timeout_ms: u32,
    /// Driver tick period
    pub tick_ms: u64,
    /// Fast status poll every this many ticks
    pub status_poll_ticks: u32,
    /// Longest wait on the hardware queue before the loop checks in again
    pub queue_timeout_ms: u64,
    pub debounce_ticks: u8,
    pub autorepeat_ticks: u8,
    /// Failed polls in a row before the link is reported lost
    pub max_consecutive_errors: u32,
    pub gamepad_enabled: bool,
    /// Run against the simulated co-processor instead of the board
    pub mock: bool,
    pub pins: PinConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            avr_address: CoprocessorLink::DEFAULT_ADDRESS,
            accel_address: Mpu6050::DEFAULT_ADDRESS,
            bus_timeout_ms: 50,
            tick_ms: 5,
            status_poll_ticks: 2,
            queue_timeout_ms: 10,
            debounce_ticks: 2,
            autorepeat_ticks: 20,
            max_consecutive_errors: 20,
            gamepad_enabled: false,
            mock: false,
            pins: PinConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(eyre!("tick_ms must be greater than zero"));
        }
        if self.status_poll_ticks == 0 {
            return Err(eyre!("status_poll_ticks must be greater than zero"));
        }
        if self.queue_timeout_ms == 0 {
            return Err(eyre!("queue_timeout_ms must be greater than zero"));
        }
        if self.avr_address == self.accel_address {
            return Err(eyre!(
                "co-processor and accelerometer share address 0x{:02x}",
                self.avr_address
            ));
        }
        let mut seen = HashSet::new();
        for pin in self.pins.all() {
            if !seen.insert(pin) {
                return Err(eyre!("GPIO {} is assigned twice", pin));
            }
        }
        Ok(())
    }

    /// `$CONFIG_DIR/rckid/driver.toml`
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory found"))?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        debug!("Loaded driver config: {:?}", config);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize driver config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }
}
