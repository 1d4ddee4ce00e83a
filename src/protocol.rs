use crate::types::RawSample;

// USB ids
pub const VID: u16 = 0x06C2;
pub const PID: u16 = 0x0033;

pub const REPORT_SIZE: usize = 63;

/// Accelerometer fixed-point scale: 2^(-16) g per LSB.
pub const ACCEL_SCALE: f64 = 1.52587890625e-05;
/// Gyroscope fixed-point scale: 2^(-12) deg/s per LSB.
pub const GYRO_SCALE: f64 = 2.44140625e-04;

// Report prefixes
pub const PREFIX_HOST_TO_DEVICE: u8 = 0x02;
pub const PREFIX_DEVICE_TO_HOST: u8 = 0x01;

// Commands, sent after PREFIX_HOST_TO_DEVICE
pub const CMD_SERIAL: &[u8] = &[0x20, 0x01];
pub const CMD_PRODUCT: &[u8] = &[0x20, 0x02];
pub const CMD_SET_INTERVAL: &[u8] = &[0x30, 0x10];
pub const CMD_ZERO_GYRO: &[u8] = &[0x30, 0x11];

pub const SAMPLE_HEADER: [u8; 2] = [0x01, 0xA5];

/// Zero-padded output report carrying `cmd`.
pub fn build_command(cmd: &[u8]) -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = PREFIX_HOST_TO_DEVICE;
    let len = cmd.len().min(REPORT_SIZE - 1);
    buf[1..1 + len].copy_from_slice(&cmd[..len]);
    buf
}

/// Build the data-interval command: [0x30, 0x10, interval_ms (u16 LE)].
pub fn build_set_interval_cmd(interval_ms: u16) -> [u8; REPORT_SIZE] {
    let mut cmd_bytes = [0u8; 4];
    cmd_bytes[0..2].copy_from_slice(CMD_SET_INTERVAL);
    cmd_bytes[2..4].copy_from_slice(&interval_ms.to_le_bytes());
    build_command(&cmd_bytes)
}

/// Check prefix and command echo; returns where the payload starts.
pub fn validate_response(response: &[u8], expected_cmd: &[u8]) -> crate::Result<usize> {
    if response.first() != Some(&PREFIX_DEVICE_TO_HOST) {
        return Err(crate::PalError::Io(format!(
            "invalid response prefix 0x{:02x}",
            response.first().copied().unwrap_or(0)
        )));
    }
    let cmd_len = expected_cmd.len();
    if response.len() < 1 + cmd_len || &response[1..1 + cmd_len] != expected_cmd {
        return Err(crate::PalError::Io("command echo mismatch".into()));
    }
    Ok(1 + cmd_len)
}

/// Payload of a validated response, after the prefix and command echo.
pub fn response_payload<'a>(response: &'a [u8], expected_cmd: &[u8]) -> crate::Result<&'a [u8]> {
    let offset = validate_response(response, expected_cmd)?;
    Ok(&response[offset..])
}

/// String up to the first NUL.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Parse a 63-byte sample report into a [`RawSample`].
///
/// Packet layout:
/// - `[0..1]`: 0x01, 0xA5 (sample header)
/// - `[2..5]`: uint32 LE device timestamp (microseconds)
/// - `[6..17]`: 3x int32 LE acceleration (scaled by 2^-16 g)
/// - `[18..29]`: 3x int32 LE angular rate (scaled by 2^-12 deg/s)
/// - `[30..62]`: reserved
pub fn parse_sample_report(data: &[u8]) -> Option<RawSample> {
    if data.len() < REPORT_SIZE || data[0..2] != SAMPLE_HEADER {
        return None;
    }

    let device_timestamp_us = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as u64;

    let mut accel_g = [0.0; 3];
    let mut gyro_dps = [0.0; 3];
    for axis in 0..3 {
        accel_g[axis] = read_i32(data, 6 + axis * 4) as f64 * ACCEL_SCALE;
        gyro_dps[axis] = read_i32(data, 18 + axis * 4) as f64 * GYRO_SCALE;
    }

    Some(RawSample {
        device_timestamp_us,
        accel_g,
        gyro_dps,
    })
}
