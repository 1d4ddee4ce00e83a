use crate::protocol::{self, PREFIX_DEVICE_TO_HOST, REPORT_SIZE};
use crate::types::RawSample;
use crate::{PalError, Result};
use hidapi::HidDevice;
use std::time::Duration;

/// Upper bound on queued reports discarded while looking for the newest sample.
const MAX_DRAIN: usize = 64;

/// Command and sample I/O on one opened sensor.
///
/// Output report ID 0x02 is also the host-to-device prefix, so command
/// buffers go to `write()` unchanged.
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self { device }
    }

    /// Write `cmd` and fetch the matching input report.
    ///
    /// The response must carry the device-to-host prefix and echo `cmd`; the
    /// payload after the echo is returned.
    pub fn transaction(&self, cmd: &[u8]) -> Result<Vec<u8>> {
        let send_buf = protocol::build_command(cmd);
        self.device
            .write(&send_buf)
            .map_err(|e| PalError::Io(format!("write failed: {}", e)))?;

        // Let the device process the command
        std::thread::sleep(Duration::from_millis(5));

        let mut recv_buf = [0u8; REPORT_SIZE + 1];
        recv_buf[0] = PREFIX_DEVICE_TO_HOST;
        let len = self
            .device
            .get_input_report(&mut recv_buf)
            .map_err(|e| PalError::Io(format!("get_input_report failed: {}", e)))?;

        let payload = protocol::response_payload(&recv_buf[..len.min(recv_buf.len())], cmd)?;
        Ok(payload.to_vec())
    }

    /// Serial number as reported by the firmware.
    pub fn read_serial(&self) -> Result<String> {
        let payload = self.transaction(protocol::CMD_SERIAL)?;
        Ok(protocol::extract_string(&payload))
    }

    pub fn read_product(&self) -> Result<String> {
        let payload = self.transaction(protocol::CMD_PRODUCT)?;
        Ok(protocol::extract_string(&payload))
    }

    /// Set the device's sample interval. The caller has already range-checked it.
    pub fn set_interval(&self, interval_ms: u16) -> Result<()> {
        let cmd_buf = protocol::build_set_interval_cmd(interval_ms);
        self.device
            .write(&cmd_buf)
            .map_err(|e| PalError::Io(format!("set interval failed: {}", e)))?;
        Ok(())
    }

    /// Zero the gyroscope bias. The sensor must be stationary.
    pub fn zero_gyro(&self) -> Result<()> {
        self.transaction(protocol::CMD_ZERO_GYRO)?;
        Ok(())
    }

    /// Read the newest sample report, waiting at most `timeout` for the first one.
    ///
    /// Reports already queued by the OS are drained so a slow reader does not
    /// fall behind the device.
    pub fn read_sample(&self, timeout: Duration) -> Result<RawSample> {
        let mut buf = [0u8; REPORT_SIZE + 1];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        let mut newest = match self.device.read_timeout(&mut buf, timeout_ms)? {
            0 => return Err(PalError::Unavailable("no report before timeout")),
            n => protocol::parse_sample_report(&buf[..n]),
        };

        for _ in 0..MAX_DRAIN {
            match self.device.read_timeout(&mut buf, 0)? {
                0 => break,
                n => {
                    if let Some(sample) = protocol::parse_sample_report(&buf[..n]) {
                        newest = Some(sample);
                    }
                }
            }
        }

        newest.ok_or(PalError::Unavailable("no sample report"))
    }
}
