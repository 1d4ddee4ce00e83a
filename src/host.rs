//! The contract between a PAL interface and the host framework that drives it.
//!
//! The host calls [`PalInterface`] hooks from one thread, one hook at a time,
//! and hands every hook a [`Host`] for the services it provides back.

use crate::message::ImuMessage;
use crate::params::{ParamDescriptor, ParamValue};
use crate::reader::ReplayFilter;
use crate::support::{ConfigNode, OptionDescriptor, SensorSupport};
use crate::types::{InterfaceMode, SampleRecord};
use crate::Result;

/// Diagnostic trouble code reported with a failed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtc {
    NoData,
    Usage,
    Config,
    /// The device cannot be reached. Owned by the recovery loop once raised.
    NoInterface,
    Io,
    Mem,
}

impl Dtc {
    /// Numeric code used on the host's fault channel.
    pub fn code(self) -> i32 {
        match self {
            Dtc::NoData => 1,
            Dtc::Usage => 2,
            Dtc::Config => 3,
            Dtc::NoInterface => 4,
            Dtc::Io => 5,
            Dtc::Mem => 6,
        }
    }
}

/// Result of one lifecycle hook.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Ok,
    NoData,
    Fault(Dtc),
}

impl HookStatus {
    pub fn is_ok(self) -> bool {
        self == HookStatus::Ok
    }
}

impl From<Result<()>> for HookStatus {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => HookStatus::Ok,
            Err(e) if e.is_unavailable() => HookStatus::NoData,
            Err(e) => HookStatus::Fault(e.dtc()),
        }
    }
}

/// Host-side settings captured when the interface is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSetup {
    pub name: String,
    pub mode: InterfaceMode,
    /// Interface-local option arguments, without a program name.
    pub args: Vec<String>,
}

/// The host's persisted get/set configuration store.
pub trait ParameterStore {
    /// Make a parameter known. The store may keep a persisted value instead
    /// of the descriptor's default.
    fn register(&mut self, descriptor: &ParamDescriptor) -> Result<()>;

    fn get(&self, name: &str) -> Option<ParamValue>;

    fn set(&mut self, name: &str, value: ParamValue) -> Result<()>;
}

/// Services the host provides to an interface.
pub trait Host {
    fn setup(&self) -> InterfaceSetup;

    /// Declarative sub-configuration for this interface, as TOML text.
    fn sub_config(&self) -> Option<String>;

    fn raise_fault(&mut self, dtc: Dtc);

    fn clear_fault(&mut self, dtc: Dtc);

    fn active_fault(&self) -> Option<Dtc>;

    fn is_recording(&self) -> bool;

    fn log_record(&mut self, record: &SampleRecord) -> Result<()>;

    fn publish(&mut self, message: &ImuMessage) -> Result<()>;

    /// Divert matching replayed records into the interface instead of
    /// auto-publishing them.
    fn register_replay_filter(&mut self, filter: ReplayFilter) -> Result<()>;

    fn parameters(&mut self) -> &mut dyn ParameterStore;
}

/// Commands addressed to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceCommand {
    /// Zero the gyroscope bias. The sensor must be at rest.
    ZeroCalibrate,
    /// Drop the connection and let the recovery loop bring it back.
    Reconnect,
    /// Log the identity of the opened device.
    Identify,
}

/// Parameter traffic addressed to the interface.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterCommand {
    Set { name: String, value: ParamValue },
    Get { name: String },
}

/// The lifecycle hooks a host drives.
///
/// `configure` and `init` run once, then the data-path hooks run once per tick
/// in order (`poll_for_data`, `log_data`, `process_data`, `send_data`) while the
/// interface is nominal, and `handle_state` runs every tick it is not. A fault
/// from `configure`, `init` or `release` is fatal to the host process.
pub trait PalInterface {
    fn configure(&mut self, host: &mut dyn Host) -> HookStatus;

    fn init(&mut self, host: &mut dyn Host) -> HookStatus;

    fn poll_for_data(&mut self, host: &mut dyn Host) -> HookStatus;

    fn log_data(&mut self, host: &mut dyn Host) -> HookStatus;

    fn process_data(&mut self, host: &mut dyn Host) -> HookStatus;

    fn send_data(&mut self, host: &mut dyn Host) -> HookStatus;

    fn handle_state(&mut self, host: &mut dyn Host) -> HookStatus;

    fn handle_command(&mut self, host: &mut dyn Host, command: &InterfaceCommand) -> HookStatus;

    fn handle_parameter_command(
        &mut self,
        host: &mut dyn Host,
        command: &ParameterCommand,
    ) -> HookStatus;

    fn release(&mut self, host: &mut dyn Host) -> HookStatus;
}

/// Static descriptions an interface exposes to the host.
pub trait InterfaceDescriptor {
    fn options(&self) -> Vec<OptionDescriptor>;

    fn parameters(&self) -> Vec<ParamDescriptor>;

    fn type_support(&self) -> &'static [&'static str];

    fn sensor_support(&self) -> Vec<SensorSupport>;

    fn minimal_config(&self) -> ConfigNode;
}
