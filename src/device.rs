//! Device Handle Manager.
//!
//! [`DeviceManager`] owns the one physical connection and is the only place a
//! sample interval reaches the hardware. Backends implement the raw
//! open/read primitives; [`HidBackend`] is the hidapi implementation.

use crate::hid::HidTransport;
use crate::protocol::{PID, VID};
use crate::types::{DeviceInfo, RawSample};
use crate::{PalError, Result};
use hidapi::HidApi;
use std::time::{Duration, Instant};

/// Fastest sample interval the sensor supports.
pub const MIN_UPDATE_RATE_MS: u32 = 4;
/// Slowest sample interval the sensor supports.
pub const MAX_UPDATE_RATE_MS: u32 = 1000;
/// Sample interval used until configuration says otherwise.
pub const DEFAULT_UPDATE_RATE_MS: u32 = 8;

/// Default upper bound on how long `open` waits for the device to attach.
pub const ATTACH_TIMEOUT: Duration = Duration::from_millis(1000);

const ATTACH_POLL: Duration = Duration::from_millis(50);

/// Clamp a requested interval into the device's documented range.
pub fn clamp_rate_ms(rate_ms: u32) -> u32 {
    rate_ms.clamp(MIN_UPDATE_RATE_MS, MAX_UPDATE_RATE_MS)
}

/// An opened sensor connection, as provided by a backend.
pub trait SensorConnection: Send {
    fn info(&self) -> &DeviceInfo;

    /// Apply a sample interval. Only ever called with an in-range value.
    fn set_interval(&mut self, interval_ms: u32) -> Result<()>;

    fn zero_gyro(&mut self) -> Result<()>;

    /// Read the newest sample, waiting at most `timeout`.
    ///
    /// Returns `Unavailable` when nothing arrived in time.
    fn read(&mut self, timeout: Duration) -> Result<RawSample>;
}

/// Low-level open primitive of a sensor SDK.
pub trait SensorBackend: Send {
    /// Open the sensor with the given serial, or any sensor if `serial` is empty.
    ///
    /// May block for up to `attach_timeout`; returns `Unavailable` if no
    /// matching device attached in that time.
    fn open(&mut self, serial: &str, attach_timeout: Duration) -> Result<Box<dyn SensorConnection>>;
}

enum DeviceHandle {
    Unopened,
    Open {
        conn: Box<dyn SensorConnection>,
        applied_rate_ms: Option<u32>,
    },
}

/// Owns the device handle and its open/configure/calibrate/close lifecycle.
pub struct DeviceManager {
    backend: Box<dyn SensorBackend>,
    handle: DeviceHandle,
    attach_timeout: Duration,
}

impl DeviceManager {
    pub fn new(backend: Box<dyn SensorBackend>, attach_timeout: Duration) -> Self {
        Self {
            backend,
            handle: DeviceHandle::Unopened,
            attach_timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.handle, DeviceHandle::Open { .. })
    }

    /// Identity of the opened device.
    pub fn info(&self) -> Option<&DeviceInfo> {
        match &self.handle {
            DeviceHandle::Open { conn, .. } => Some(conn.info()),
            DeviceHandle::Unopened => None,
        }
    }

    /// Interval currently applied on the device, if configured.
    pub fn applied_rate_ms(&self) -> Option<u32> {
        match &self.handle {
            DeviceHandle::Open {
                applied_rate_ms, ..
            } => *applied_rate_ms,
            DeviceHandle::Unopened => None,
        }
    }

    /// Open the device. An empty `serial` matches any attached sensor.
    pub fn open(&mut self, serial: &str) -> Result<()> {
        if self.is_open() {
            return Err(PalError::Usage("device already open".into()));
        }

        let conn = self.backend.open(serial, self.attach_timeout)?;
        log::info!(
            "Opened spatial sensor: serial={} product={}",
            conn.info().serial,
            conn.info().product
        );
        self.handle = DeviceHandle::Open {
            conn,
            applied_rate_ms: None,
        };
        Ok(())
    }

    /// Apply a sample interval, clamped into range. Returns the applied value.
    pub fn configure(&mut self, rate_ms: u32) -> Result<u32> {
        let DeviceHandle::Open {
            conn,
            applied_rate_ms,
        } = &mut self.handle
        else {
            return Err(PalError::Unavailable("device not open"));
        };

        let clamped = clamp_rate_ms(rate_ms);
        if clamped != rate_ms {
            log::warn!(
                "Update rate {} ms outside [{}, {}], using {} ms",
                rate_ms,
                MIN_UPDATE_RATE_MS,
                MAX_UPDATE_RATE_MS,
                clamped
            );
        }

        conn.set_interval(clamped)?;
        *applied_rate_ms = Some(clamped);
        log::info!("Sample interval set to {} ms", clamped);
        Ok(clamped)
    }

    pub fn zero_calibrate(&mut self) -> Result<()> {
        match &mut self.handle {
            DeviceHandle::Open { conn, .. } => {
                conn.zero_gyro()?;
                log::info!("Gyroscope zeroed");
                Ok(())
            }
            DeviceHandle::Unopened => Err(PalError::Unavailable("device not open")),
        }
    }

    /// Read one sample. The handle must be open and configured.
    pub fn read(&mut self, timeout: Duration) -> Result<RawSample> {
        match &mut self.handle {
            DeviceHandle::Open {
                applied_rate_ms: None,
                ..
            } => Err(PalError::Usage("read before configure".into())),
            DeviceHandle::Open { conn, .. } => conn.read(timeout),
            DeviceHandle::Unopened => Err(PalError::Unavailable("device not open")),
        }
    }

    /// Close the device. Closing an unopened handle is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let DeviceHandle::Open { conn, .. } =
            std::mem::replace(&mut self.handle, DeviceHandle::Unopened)
        {
            log::info!("Closed spatial sensor {}", conn.info().serial);
        }
        Ok(())
    }
}

/// Check if a hidapi DeviceInfo matches the spatial sensor HID interface.
fn is_spatial_hid(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == VID && d.product_id() == PID
}

fn serial_matches(d: &hidapi::DeviceInfo, serial: &str) -> bool {
    serial.is_empty() || d.serial_number() == Some(serial)
}

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // Keep HID opens shared on macOS to avoid seizing the interface.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

/// List attached spatial sensors without opening them.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let api = create_hid_api()?;
    Ok(api
        .device_list()
        .filter(|d| is_spatial_hid(d))
        .map(|d| DeviceInfo {
            serial: d.serial_number().unwrap_or("").to_string(),
            product: d.product_string().unwrap_or("").to_string(),
        })
        .collect())
}

/// hidapi-backed sensor SDK.
#[derive(Default)]
pub struct HidBackend {
    api: Option<HidApi>,
}

impl HidBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn api(&mut self) -> Result<&mut HidApi> {
        let api = match self.api.take() {
            Some(mut api) => {
                api.refresh_devices()?;
                api
            }
            None => create_hid_api()?,
        };
        Ok(self.api.insert(api))
    }
}

impl SensorBackend for HidBackend {
    fn open(&mut self, serial: &str, attach_timeout: Duration) -> Result<Box<dyn SensorConnection>> {
        let deadline = Instant::now() + attach_timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let api = self.api()?;
            let path = api
                .device_list()
                .find(|d| is_spatial_hid(d) && serial_matches(d, serial))
                .map(|d| d.path().to_owned());

            if let Some(path) = path {
                match api.open_path(&path) {
                    Ok(device) => {
                        let conn = HidConnection::attach(HidTransport::new(device))?;
                        return Ok(Box::new(conn));
                    }
                    Err(e) => {
                        if attempt <= 5 || attempt % 10 == 0 {
                            log::debug!("Failed to open spatial HID (attempt {}): {}", attempt, e);
                        }
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PalError::Unavailable("sensor not attached"));
            }
            std::thread::sleep(ATTACH_POLL.min(deadline - now));
        }
    }
}

/// An opened hidapi sensor.
pub struct HidConnection {
    transport: HidTransport,
    info: DeviceInfo,
}

impl HidConnection {
    fn attach(transport: HidTransport) -> Result<Self> {
        let serial = transport.read_serial()?;
        let product = transport.read_product()?;
        Ok(Self {
            transport,
            info: DeviceInfo { serial, product },
        })
    }
}

impl SensorConnection for HidConnection {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_interval(&mut self, interval_ms: u32) -> Result<()> {
        let interval = u16::try_from(interval_ms)
            .map_err(|_| PalError::Usage(format!("interval {} ms does not fit", interval_ms)))?;
        self.transport.set_interval(interval)
    }

    fn zero_gyro(&mut self) -> Result<()> {
        self.transport.zero_gyro()
    }

    fn read(&mut self, timeout: Duration) -> Result<RawSample> {
        self.transport.read_sample(timeout)
    }
}
