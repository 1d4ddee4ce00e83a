//! Interface Lifecycle Controller.
//!
//! [`SpatialInterface`] is the one context value the host drives. It owns the
//! device manager, sample reader, diagnostics monitor and parameter cache and
//! lends them to each other per hook; nothing is process-global.

use crate::clock::{Clock, SystemClock};
use crate::config::{self, InterfaceOptions, Timeouts};
use crate::device::{DeviceManager, HidBackend, SensorBackend};
use crate::diagnostics::{DiagnosticsMonitor, Health, RecoveryStep};
use crate::host::{
    Dtc, HookStatus, Host, InterfaceCommand, InterfaceDescriptor, PalInterface, ParameterCommand,
};
use crate::message::MessageTemplate;
use crate::params::{self, ConfigVariables, ParamDescriptor, ParameterSync};
use crate::reader::{self, SampleReader};
use crate::support::{self, ConfigNode, OptionDescriptor, SensorSupport};
use crate::types::{InterfaceMode, SampleRecord};
use crate::{PalError, Result};

pub struct SpatialInterface {
    name: String,
    mode: Option<InterfaceMode>,
    args: Vec<String>,
    timeouts: Timeouts,
    clock: Box<dyn Clock>,
    device: DeviceManager,
    reader: Option<SampleReader>,
    monitor: DiagnosticsMonitor,
    params: ParameterSync,
    template: Option<MessageTemplate>,
    pending: Option<SampleRecord>,
}

impl SpatialInterface {
    pub fn new(backend: Box<dyn SensorBackend>, clock: Box<dyn Clock>, timeouts: Timeouts) -> Self {
        Self {
            name: String::new(),
            mode: None,
            args: Vec::new(),
            timeouts,
            clock,
            device: DeviceManager::new(backend, timeouts.attach),
            reader: None,
            monitor: DiagnosticsMonitor::new(&timeouts),
            params: ParameterSync::default(),
            template: None,
            pending: None,
        }
    }

    /// Interface backed by hidapi and the system clock, timeouts from the environment.
    pub fn with_hid() -> Self {
        Self::new(
            Box::new(HidBackend::new()),
            Box::new(SystemClock::new()),
            Timeouts::from_env(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Option<InterfaceMode> {
        self.mode
    }

    pub fn vars(&self) -> &ConfigVariables {
        self.params.vars()
    }

    pub fn health(&self) -> Health {
        self.monitor.health()
    }

    pub fn is_device_open(&self) -> bool {
        self.device.is_open()
    }

    fn is_live(&self) -> bool {
        self.mode == Some(InterfaceMode::Live)
    }

    fn try_init(&mut self, host: &mut dyn Host) -> Result<()> {
        let mode = self
            .mode
            .ok_or_else(|| PalError::Usage("init called before configure".into()))?;
        if self.reader.is_some() {
            return Err(PalError::Usage("init called twice".into()));
        }

        let options = InterfaceOptions::parse_args(&self.args)?;
        let sensor = config::load_sub_config(host.sub_config().as_deref())?;
        self.params = ParameterSync::new(config::resolve(&sensor, &options));
        self.template = Some(MessageTemplate::new());

        // Registration may replace values with persisted ones, so the replay
        // filter is built from the pulled sensor id.
        self.params.register(host.parameters())?;

        match mode {
            InterfaceMode::Replay => {
                let (filter, queue) = reader::replay_channel(self.params.vars().sensor_id);
                host.register_replay_filter(filter)?;
                self.reader = Some(SampleReader::replay(queue));
            }
            InterfaceMode::Live => {
                self.reader = Some(SampleReader::live(self.timeouts.read));
                if let Err(e) = self.bring_up(options.zero) {
                    log::warn!("{}: device not ready ({}), continuing with recovery", self.name, e);
                    if self.monitor.declare_lost("initial bring-up failed") {
                        host.raise_fault(Dtc::NoInterface);
                    }
                }
            }
        }

        log::info!(
            "{}: initialized in {:?} mode (sensor {}, {} ms)",
            self.name,
            mode,
            self.params.vars().sensor_id,
            self.params.vars().update_rate_ms
        );
        Ok(())
    }

    /// Open, configure and validate the device. Leaves it closed on failure.
    fn bring_up(&mut self, zero: bool) -> Result<()> {
        let result = self.try_bring_up(zero);
        if result.is_err() {
            self.device.close()?;
        }
        result
    }

    fn try_bring_up(&mut self, zero: bool) -> Result<()> {
        let vars = self.params.vars();
        self.device.open(&vars.serial_name)?;
        self.device.configure(vars.update_rate_ms)?;
        if zero {
            self.device.zero_calibrate()?;
        }
        self.monitor.validate(self.clock.as_ref(), &mut self.device)?;
        self.monitor.record_rx(self.clock.now()?);
        Ok(())
    }

    fn publish_pending(&mut self, host: &mut dyn Host) -> Result<()> {
        let Some(record) = self.pending.take() else {
            return Err(PalError::Unavailable("no sample this tick"));
        };
        if !self.params.vars().publish_enabled {
            return Ok(());
        }
        let template = self
            .template
            .as_mut()
            .ok_or_else(|| PalError::Usage("process_data called before init".into()))?;
        let message = template.fill(&record, &self.params.vars().coordinate_frame, self.clock.now()?);
        host.publish(&message)
    }

    fn run_command(&mut self, host: &mut dyn Host, command: &InterfaceCommand) -> Result<()> {
        if !self.is_live() {
            log::debug!("{}: ignoring {:?} in replay mode", self.name, command);
            return Ok(());
        }
        match command {
            InterfaceCommand::ZeroCalibrate => self.device.zero_calibrate(),
            InterfaceCommand::Reconnect => {
                self.device.close()?;
                if self.monitor.declare_lost("reconnect requested") {
                    host.raise_fault(Dtc::NoInterface);
                }
                Ok(())
            }
            InterfaceCommand::Identify => {
                match self.device.info() {
                    Some(info) => log::info!(
                        "{}: {} serial={} rate={:?} ms",
                        self.name,
                        info.product,
                        info.serial,
                        self.device.applied_rate_ms()
                    ),
                    None => log::info!("{}: no device open", self.name),
                }
                Ok(())
            }
        }
    }
}

impl PalInterface for SpatialInterface {
    fn configure(&mut self, host: &mut dyn Host) -> HookStatus {
        if self.mode.is_some() {
            log::error!("{}: configure called twice", self.name);
            return HookStatus::Fault(Dtc::Usage);
        }
        let setup = host.setup();
        log::info!("{}: configured for {:?} mode", setup.name, setup.mode);
        self.name = setup.name;
        self.mode = Some(setup.mode);
        self.args = setup.args;
        HookStatus::Ok
    }

    fn init(&mut self, host: &mut dyn Host) -> HookStatus {
        match self.try_init(host) {
            Ok(()) => HookStatus::Ok,
            Err(e) => {
                log::error!("{}: init failed: {}", self.name, e);
                HookStatus::Fault(e.dtc())
            }
        }
    }

    fn poll_for_data(&mut self, host: &mut dyn Host) -> HookStatus {
        self.pending = None;
        let Some(reader) = self.reader.as_mut() else {
            return HookStatus::Fault(Dtc::Usage);
        };
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                log::debug!("{}: clock read failed: {}", self.name, e);
                return HookStatus::NoData;
            }
        };

        let live = reader.mode() == InterfaceMode::Live;
        match reader.poll(now, &mut self.device, self.params.vars()) {
            Ok(record) => {
                if live {
                    self.monitor.record_rx(now);
                }
                self.pending = Some(record);
                HookStatus::Ok
            }
            Err(e) if e.is_unavailable() => {
                if live && self.monitor.check_rx(now) {
                    if let Err(e) = self.device.close() {
                        log::debug!("{}: close after loss failed: {}", self.name, e);
                    }
                    host.raise_fault(Dtc::NoInterface);
                }
                HookStatus::NoData
            }
            Err(e) => {
                log::error!("{}: poll failed: {}", self.name, e);
                HookStatus::Fault(e.dtc())
            }
        }
    }

    fn log_data(&mut self, host: &mut dyn Host) -> HookStatus {
        let Some(record) = self.pending.as_ref() else {
            return HookStatus::NoData;
        };
        if !host.is_recording() {
            return HookStatus::Ok;
        }
        host.log_record(record).into()
    }

    fn process_data(&mut self, host: &mut dyn Host) -> HookStatus {
        self.publish_pending(host).into()
    }

    fn send_data(&mut self, _host: &mut dyn Host) -> HookStatus {
        // Sensor only, nothing to drive.
        HookStatus::NoData
    }

    fn handle_state(&mut self, host: &mut dyn Host) -> HookStatus {
        if !self.is_live() || host.active_fault() != Some(Dtc::NoInterface) {
            return HookStatus::Ok;
        }
        let step =
            self.monitor
                .step_recovery(self.clock.as_ref(), &mut self.device, self.params.vars());
        if step == RecoveryStep::Recovered {
            log::info!("{}: interface recovered", self.name);
            host.clear_fault(Dtc::NoInterface);
        }
        HookStatus::Ok
    }

    fn handle_command(&mut self, host: &mut dyn Host, command: &InterfaceCommand) -> HookStatus {
        match self.run_command(host, command) {
            Ok(()) => HookStatus::Ok,
            Err(e) if e.is_unavailable() => HookStatus::NoData,
            Err(e) => {
                log::warn!("{}: command {:?} failed: {}", self.name, command, e);
                HookStatus::Fault(e.dtc())
            }
        }
    }

    fn handle_parameter_command(
        &mut self,
        host: &mut dyn Host,
        command: &ParameterCommand,
    ) -> HookStatus {
        let result = match command {
            ParameterCommand::Set { name, value } => {
                self.params.set(host.parameters(), name, value.clone())
            }
            ParameterCommand::Get { name } => self.params.get(name).map(|value| {
                log::info!("{}: {} = {:?}", self.name, name, value);
            }),
        };
        if let Err(e) = &result {
            log::warn!("{}: parameter command failed: {}", self.name, e);
        }
        result.into()
    }

    fn release(&mut self, _host: &mut dyn Host) -> HookStatus {
        self.pending = None;
        self.reader = None;
        self.template = None;
        match self.device.close() {
            Ok(()) => HookStatus::Ok,
            Err(e) => HookStatus::Fault(e.dtc()),
        }
    }
}

impl InterfaceDescriptor for SpatialInterface {
    fn options(&self) -> Vec<OptionDescriptor> {
        support::options()
    }

    fn parameters(&self) -> Vec<ParamDescriptor> {
        params::descriptors(&ConfigVariables::default())
    }

    fn type_support(&self) -> &'static [&'static str] {
        support::TYPE_SUPPORT
    }

    fn sensor_support(&self) -> Vec<SensorSupport> {
        support::sensor_support()
    }

    fn minimal_config(&self) -> ConfigNode {
        support::minimal_config()
    }
}
