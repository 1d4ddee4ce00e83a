//! Sample Reader.
//!
//! Produces at most one [`SampleRecord`] per poll, either from the device
//! (rate-gated) or from the replay queue. "Nothing this tick" is always
//! reported as [`PalError::Unavailable`].

use crate::clock::elapsed_since;
use crate::device::{clamp_rate_ms, DeviceManager};
use crate::params::ConfigVariables;
use crate::types::{InterfaceMode, SampleRecord};
use crate::{PalError, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::time::Duration;

/// Producer side of the replay queue, handed to the host's replay thread.
///
/// Records whose sensor id does not match are left to the host.
#[derive(Debug, Clone)]
pub struct ReplayFilter {
    sensor_id: u32,
    sender: Sender<SampleRecord>,
}

impl ReplayFilter {
    pub fn sensor_id(&self) -> u32 {
        self.sensor_id
    }

    /// Offer a replayed record. Returns true if it was diverted to the interface.
    pub fn offer(&self, record: SampleRecord) -> bool {
        if record.sensor_id != self.sensor_id {
            return false;
        }
        self.sender.send(record).is_ok()
    }
}

/// Consumer side of the replay queue.
#[derive(Debug)]
pub struct ReplayQueue {
    receiver: Receiver<SampleRecord>,
}

impl ReplayQueue {
    /// Pop the oldest queued record without blocking.
    pub fn pop(&self) -> Option<SampleRecord> {
        match self.receiver.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::trace!("Replay queue has no producers left");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Create a replay filter/queue pair for `sensor_id`.
pub fn replay_channel(sensor_id: u32) -> (ReplayFilter, ReplayQueue) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (ReplayFilter { sensor_id, sender }, ReplayQueue { receiver })
}

enum Source {
    Live {
        read_timeout: Duration,
        last_sample_time: Option<Duration>,
    },
    Replay(ReplayQueue),
}

pub struct SampleReader {
    source: Source,
}

impl SampleReader {
    /// Reader for hardware samples; each read waits at most `read_timeout`.
    pub fn live(read_timeout: Duration) -> Self {
        Self {
            source: Source::Live {
                read_timeout,
                last_sample_time: None,
            },
        }
    }

    pub fn replay(queue: ReplayQueue) -> Self {
        Self {
            source: Source::Replay(queue),
        }
    }

    pub fn mode(&self) -> InterfaceMode {
        match self.source {
            Source::Live { .. } => InterfaceMode::Live,
            Source::Replay(_) => InterfaceMode::Replay,
        }
    }

    /// Produce the sample for this tick, if any.
    ///
    /// `vars` is read on every call so parameter changes apply on the next poll.
    pub fn poll(
        &mut self,
        now: Duration,
        device: &mut DeviceManager,
        vars: &ConfigVariables,
    ) -> Result<SampleRecord> {
        match &mut self.source {
            Source::Live {
                read_timeout,
                last_sample_time,
            } => {
                let record = poll_live(now, *last_sample_time, *read_timeout, device, vars)?;
                *last_sample_time = Some(now);
                Ok(record)
            }
            Source::Replay(queue) => queue
                .pop()
                .ok_or(PalError::Unavailable("replay queue empty")),
        }
    }
}

fn poll_live(
    now: Duration,
    last_sample_time: Option<Duration>,
    read_timeout: Duration,
    device: &mut DeviceManager,
    vars: &ConfigVariables,
) -> Result<SampleRecord> {
    let rate_ms = clamp_rate_ms(vars.update_rate_ms);
    let interval = Duration::from_millis(rate_ms as u64);

    if let Some(last) = last_sample_time {
        if elapsed_since(now, last) < interval {
            return Err(PalError::Unavailable("next sample not due"));
        }
    }

    if !device.is_open() {
        return Err(PalError::Unavailable("device not open"));
    }

    if device.applied_rate_ms() != Some(rate_ms) {
        device.configure(rate_ms).map_err(|e| {
            log::debug!("Rate change to {} ms failed: {}", rate_ms, e);
            PalError::Unavailable("rate change failed")
        })?;
    }

    let raw = device.read(read_timeout).map_err(|e| match e {
        PalError::Usage(_) => e,
        other => {
            log::trace!("Sample read failed: {}", other);
            PalError::Unavailable("sample read failed")
        }
    })?;

    if !raw.is_well_formed() {
        log::debug!("Discarding malformed sample {:?}", raw);
        return Err(PalError::Unavailable("malformed sample"));
    }

    Ok(SampleRecord::from_raw(&raw, vars.sensor_id, now))
}
