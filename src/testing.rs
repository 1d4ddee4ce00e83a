//! Test doubles: a manual clock, a scripted sensor backend and a recording host.

use crate::clock::Clock;
use crate::device::{SensorBackend, SensorConnection};
use crate::host::{Dtc, Host, InterfaceSetup, ParameterStore};
use crate::message::ImuMessage;
use crate::params::{ParamDescriptor, ParamValue};
use crate::reader::ReplayFilter;
use crate::types::{DeviceInfo, InterfaceMode, RawSample, SampleRecord};
use crate::{PalError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration> {
        Ok(*self.now.lock().unwrap())
    }
}

/// Manual clock whose reads can be made to fail.
#[derive(Debug, Clone)]
pub struct FlakyClock {
    inner: ManualClock,
    failing: Arc<AtomicBool>,
}

impl FlakyClock {
    pub fn new(inner: ManualClock) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl Clock for FlakyClock {
    fn now(&self) -> Result<Duration> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PalError::Io("clock read failed".into()));
        }
        self.inner.now()
    }
}

#[derive(Debug)]
struct MockState {
    attached: bool,
    responsive: bool,
    open_failures: u32,
    open_calls: u32,
    read_calls: u32,
    zero_calls: u32,
    intervals_sent: Vec<u32>,
    last_serial: Option<String>,
    accel: [f64; 3],
}

/// Scripted backend. Unresponsive reads advance the shared clock by their timeout.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    clock: ManualClock,
}

impl MockBackend {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                attached: true,
                responsive: true,
                open_failures: 0,
                open_calls: 0,
                read_calls: 0,
                zero_calls: 0,
                intervals_sent: Vec::new(),
                last_serial: None,
                accel: [0.0, 0.0, 1.0],
            })),
            clock,
        }
    }

    pub fn set_attached(&self, attached: bool) {
        self.state.lock().unwrap().attached = attached;
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.state.lock().unwrap().responsive = responsive;
    }

    /// Make the next `count` opens fail as if the device were absent.
    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().unwrap().open_failures = count;
    }

    pub fn set_accel(&self, accel: [f64; 3]) {
        self.state.lock().unwrap().accel = accel;
    }

    pub fn open_calls(&self) -> u32 {
        self.state.lock().unwrap().open_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.state.lock().unwrap().read_calls
    }

    pub fn zero_calls(&self) -> u32 {
        self.state.lock().unwrap().zero_calls
    }

    pub fn intervals_sent(&self) -> Vec<u32> {
        self.state.lock().unwrap().intervals_sent.clone()
    }

    pub fn last_serial(&self) -> Option<String> {
        self.state.lock().unwrap().last_serial.clone()
    }
}

impl SensorBackend for MockBackend {
    fn open(&mut self, serial: &str, _attach_timeout: Duration) -> Result<Box<dyn SensorConnection>> {
        let mut state = self.state.lock().unwrap();
        state.open_calls += 1;
        state.last_serial = Some(serial.to_string());
        if !state.attached {
            return Err(PalError::Unavailable("sensor not attached"));
        }
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(PalError::Unavailable("sensor not attached"));
        }
        let serial = if serial.is_empty() { "MOCK-0001" } else { serial };
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            clock: self.clock.clone(),
            info: DeviceInfo {
                serial: serial.to_string(),
                product: "Mock Spatial".to_string(),
            },
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    clock: ManualClock,
    info: DeviceInfo,
}

impl SensorConnection for MockConnection {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_interval(&mut self, interval_ms: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.attached {
            return Err(PalError::Io("device gone".into()));
        }
        state.intervals_sent.push(interval_ms);
        Ok(())
    }

    fn zero_gyro(&mut self) -> Result<()> {
        self.state.lock().unwrap().zero_calls += 1;
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<RawSample> {
        let (ok, accel) = {
            let mut state = self.state.lock().unwrap();
            state.read_calls += 1;
            (state.attached && state.responsive, state.accel)
        };
        if !ok {
            self.clock.advance(timeout);
            return Err(PalError::Unavailable("no report before timeout"));
        }
        Ok(RawSample {
            device_timestamp_us: self.clock.now()?.as_micros() as u64,
            accel_g: accel,
            gyro_dps: [0.5, 0.0, 0.0],
        })
    }
}

/// In-memory parameter store. `persist` seeds values as if loaded from disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, ParamValue>,
    registered: Vec<String>,
}

impl MemoryStore {
    pub fn persist(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn registered(&self) -> &[String] {
        &self.registered
    }
}

impl ParameterStore for MemoryStore {
    fn register(&mut self, descriptor: &ParamDescriptor) -> Result<()> {
        self.registered.push(descriptor.name.to_string());
        self.values
            .entry(descriptor.name.to_string())
            .or_insert_with(|| descriptor.default.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}

/// Host that records everything the interface asks of it.
pub struct RecordingHost {
    pub setup: InterfaceSetup,
    pub sub_config: Option<String>,
    pub raised: Vec<Dtc>,
    pub cleared: Vec<Dtc>,
    pub active: Option<Dtc>,
    pub recording: bool,
    pub logged: Vec<SampleRecord>,
    pub published: Vec<ImuMessage>,
    pub filters: Vec<ReplayFilter>,
    pub store: MemoryStore,
}

impl RecordingHost {
    pub fn new(mode: InterfaceMode, args: &[&str]) -> Self {
        Self {
            setup: InterfaceSetup {
                name: "spatial0".to_string(),
                mode,
                args: args.iter().map(|a| a.to_string()).collect(),
            },
            sub_config: None,
            raised: Vec::new(),
            cleared: Vec::new(),
            active: None,
            recording: false,
            logged: Vec::new(),
            published: Vec::new(),
            filters: Vec::new(),
            store: MemoryStore::default(),
        }
    }

    /// The host runs `handle_state` instead of the data path while faulted.
    pub fn is_nominal(&self) -> bool {
        self.active.is_none()
    }
}

impl Host for RecordingHost {
    fn setup(&self) -> InterfaceSetup {
        self.setup.clone()
    }

    fn sub_config(&self) -> Option<String> {
        self.sub_config.clone()
    }

    fn raise_fault(&mut self, dtc: Dtc) {
        self.raised.push(dtc);
        self.active = Some(dtc);
    }

    fn clear_fault(&mut self, dtc: Dtc) {
        self.cleared.push(dtc);
        if self.active == Some(dtc) {
            self.active = None;
        }
    }

    fn active_fault(&self) -> Option<Dtc> {
        self.active
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn log_record(&mut self, record: &SampleRecord) -> Result<()> {
        self.logged.push(*record);
        Ok(())
    }

    fn publish(&mut self, message: &ImuMessage) -> Result<()> {
        self.published.push(message.clone());
        Ok(())
    }

    fn register_replay_filter(&mut self, filter: ReplayFilter) -> Result<()> {
        self.filters.push(filter);
        Ok(())
    }

    fn parameters(&mut self) -> &mut dyn ParameterStore {
        &mut self.store
    }
}
