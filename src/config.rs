//! Interface configuration.
//!
//! Three sources, later ones winning:
//! 1. built-in defaults,
//! 2. the `[sensor]` table of the interface's TOML sub-configuration,
//! 3. interface-local options passed by the host (`-s`, `-r`, ...).
//!
//! Timing limits can additionally be overridden from the environment.

use crate::device::ATTACH_TIMEOUT;
use crate::diagnostics::{RECOVERY_RETRY_INTERVAL, RX_TIMEOUT, VALIDATION_TIMEOUT};
use crate::params::{ConfigVariables, MAX_SENSOR_ID};
use crate::support;
use crate::{PalError, Result};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;

/// Default bound on a single live read.
pub const READ_TIMEOUT: Duration = Duration::from_millis(2);

/// Interface-local options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "spatial", no_binary_name = true, disable_help_flag = true)]
pub struct InterfaceOptions {
    /// Serial number of the sensor to open
    #[arg(short = 's', long = "serial", value_name = "SERIAL")]
    pub serial: Option<String>,

    /// Sensor id stamped on samples
    #[arg(
        short = 'i',
        long = "sensor-id",
        value_name = "ID",
        value_parser = clap::value_parser!(u32).range(0..=MAX_SENSOR_ID as i64)
    )]
    pub sensor_id: Option<u32>,

    /// Frame id of published messages
    #[arg(short = 'f', long = "frame", value_name = "FRAME")]
    pub frame: Option<String>,

    /// Sample interval in milliseconds
    #[arg(short = 'r', long = "rate", value_name = "MS")]
    pub rate_ms: Option<u32>,

    /// Do not publish samples
    #[arg(short = 'n', long = "no-publish")]
    pub no_publish: bool,

    /// Zero the gyroscope after the device is opened
    #[arg(short = 'z', long = "zero")]
    pub zero: bool,
}

impl InterfaceOptions {
    pub fn parse_args(args: &[String]) -> Result<Self> {
        Ok(Self::try_parse_from(args)?)
    }
}

/// The `[sensor]` table of the sub-configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub id: u32,
    pub serial: String,
    pub frame: String,
    pub update_rate_ms: u32,
    pub publish: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let vars = ConfigVariables::default();
        Self {
            id: vars.sensor_id,
            serial: vars.serial_name,
            frame: vars.coordinate_frame,
            update_rate_ms: vars.update_rate_ms,
            publish: vars.publish_enabled,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubConfig {
    #[serde(default)]
    sensor: SensorConfig,
}

/// Parse the interface's sub-configuration. `None` means "use defaults".
///
/// Missing entries are filled from the minimal configuration before
/// deserializing; anything malformed is a [`PalError::Config`].
pub fn load_sub_config(text: Option<&str>) -> Result<SensorConfig> {
    let Some(text) = text else {
        return Ok(SensorConfig::default());
    };

    let mut table: toml::Table = toml::from_str(text)?;
    let minimal = support::minimal_config();
    minimal.populate(&mut table);
    minimal.validate(&table)?;

    let sub: SubConfig = toml::Value::Table(table).try_into()?;
    if sub.sensor.id > MAX_SENSOR_ID {
        return Err(PalError::Config(format!(
            "sensor.id {} exceeds {}",
            sub.sensor.id, MAX_SENSOR_ID
        )));
    }
    if sub.sensor.frame.is_empty() {
        return Err(PalError::Config("sensor.frame must not be empty".into()));
    }
    Ok(sub.sensor)
}

/// Merge the sub-configuration with option overrides.
pub fn resolve(sensor: &SensorConfig, options: &InterfaceOptions) -> ConfigVariables {
    ConfigVariables {
        serial_name: options.serial.clone().unwrap_or_else(|| sensor.serial.clone()),
        sensor_id: options.sensor_id.unwrap_or(sensor.id),
        coordinate_frame: options.frame.clone().unwrap_or_else(|| sensor.frame.clone()),
        update_rate_ms: crate::device::clamp_rate_ms(options.rate_ms.unwrap_or(sensor.update_rate_ms)),
        publish_enabled: sensor.publish && !options.no_publish,
    }
}

/// Bounded waits used by the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long `open` waits for the device to attach.
    pub attach: Duration,
    /// How long a single live read may wait.
    pub read: Duration,
    /// Silence after which the device is considered lost.
    pub rx: Duration,
    /// Minimum spacing of reconnection attempts.
    pub retry: Duration,
    /// How long a fresh connection has to deliver its first sample.
    pub validation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            attach: ATTACH_TIMEOUT,
            read: READ_TIMEOUT,
            rx: RX_TIMEOUT,
            retry: RECOVERY_RETRY_INTERVAL,
            validation: VALIDATION_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Defaults with `SPATIAL_PAL_ATTACH_TIMEOUT_MS` / `SPATIAL_PAL_READ_TIMEOUT_MS`
    /// applied when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeouts = Self {
            attach: read_env_millis("SPATIAL_PAL_ATTACH_TIMEOUT_MS", defaults.attach),
            read: read_env_millis("SPATIAL_PAL_READ_TIMEOUT_MS", defaults.read),
            ..defaults
        };
        if timeouts != defaults {
            log::info!(
                "Timeouts from environment: attach={:?} read={:?}",
                timeouts.attach,
                timeouts.read
            );
        }
        timeouts
    }
}

fn read_env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
