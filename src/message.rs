use crate::types::SampleRecord;
use std::time::Duration;

/// Common header of published messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub seq: u64,
    /// Outbound time, stamped when the message is built.
    pub stamp: Duration,
    pub frame_id: String,
}

/// Published IMU sample, SI units, body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuMessage {
    pub header: Header,
    pub sensor_id: u32,
    /// Host time at which the sample was read.
    pub sample_time: Duration,
    pub linear_acceleration: [f64; 3],
    pub angular_velocity: [f64; 3],
}

/// Builds outbound messages; exists between `init` and `release`.
#[derive(Debug, Default)]
pub struct MessageTemplate {
    seq: u64,
}

impl MessageTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages built so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn fill(&mut self, record: &SampleRecord, frame_id: &str, stamp: Duration) -> ImuMessage {
        self.seq += 1;
        ImuMessage {
            header: Header {
                seq: self.seq,
                stamp,
                frame_id: frame_id.to_string(),
            },
            sensor_id: record.sensor_id,
            sample_time: record.timestamp,
            linear_acceleration: record.accel,
            angular_velocity: record.gyro,
        }
    }
}
