use std::time::Duration;

/// Standard gravity, m/s² per g.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Sign applied per axis when moving from the device frame to the body frame.
///
/// The sensor is mounted Z-up, Y-left; the body frame is forward-right-down,
/// so Y and Z flip for both accelerometer and gyroscope.
pub const AXIS_SIGN: [f64; 3] = [1.0, -1.0, -1.0];

/// One raw reading as delivered by a backend, in device units and device frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Device-side timestamp in microseconds.
    pub device_timestamp_us: u64,
    /// Acceleration [x, y, z] in g.
    pub accel_g: [f64; 3],
    /// Angular rate [x, y, z] in deg/s.
    pub gyro_dps: [f64; 3],
}

impl RawSample {
    /// A reading is well-formed when every channel is a finite number.
    pub fn is_well_formed(&self) -> bool {
        self.accel_g.iter().chain(self.gyro_dps.iter()).all(|v| v.is_finite())
    }
}

/// A converted sample in SI units and body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Host monotonic time at which the sample was taken.
    pub timestamp: Duration,
    pub sensor_id: u32,
    /// Acceleration [x, y, z] in m/s².
    pub accel: [f64; 3],
    /// Angular rate [x, y, z] in rad/s.
    pub gyro: [f64; 3],
    pub valid: bool,
}

impl SampleRecord {
    /// Convert a raw reading taken at `timestamp`.
    pub fn from_raw(raw: &RawSample, sensor_id: u32, timestamp: Duration) -> Self {
        let mut accel = [0.0; 3];
        let mut gyro = [0.0; 3];
        for axis in 0..3 {
            accel[axis] = raw.accel_g[axis] * STANDARD_GRAVITY * AXIS_SIGN[axis];
            gyro[axis] = raw.gyro_dps[axis].to_radians() * AXIS_SIGN[axis];
        }
        Self {
            timestamp,
            sensor_id,
            accel,
            gyro,
            valid: raw.is_well_formed(),
        }
    }
}

/// Whether samples come from hardware or from a recorded log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceMode {
    #[default]
    Live,
    Replay,
}

/// Identity reported by an opened device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub product: String,
}

bitflags::bitflags! {
    /// Measurement channels provided by a sensor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Channels: u32 {
        const ACCELEROMETER = 1 << 0;
        const GYROSCOPE     = 1 << 1;
    }
}
