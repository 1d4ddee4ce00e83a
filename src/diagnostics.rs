//! Diagnostics Monitor.
//!
//! Watches the time since the last good sample and, once the device is
//! considered lost, drives reconnection at a bounded rate:
//!
//! ```text
//!   Healthy ──(no sample for > RX_TIMEOUT)──▶ Degraded
//!   Degraded ──(retry interval elapsed)──▶ Recovering
//!   Recovering ──(close, open, configure, validate ok)──▶ Healthy
//!   Recovering ──(any step failed)──▶ Degraded
//! ```

use crate::clock::{elapsed_since, Clock};
use crate::config::Timeouts;
use crate::device::DeviceManager;
use crate::params::ConfigVariables;
use crate::types::RawSample;
use crate::{PalError, Result};
use std::time::Duration;

/// Silence after which the device is declared lost.
pub const RX_TIMEOUT: Duration = Duration::from_secs(2);
/// Minimum spacing between reconnection attempts.
pub const RECOVERY_RETRY_INTERVAL: Duration = Duration::from_millis(200);
/// How long a fresh connection has to produce a well-formed sample.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest single read while validating.
const VALIDATION_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Recovering,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsState {
    pub last_rx_timestamp: Option<Duration>,
    /// Never decreases once set.
    pub last_recovery_attempt: Option<Duration>,
}

/// Outcome of one [`DiagnosticsMonitor::step_recovery`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Nothing to recover.
    Idle,
    /// Degraded, but the retry interval has not elapsed.
    Waiting,
    Failed,
    Recovered,
}

pub struct DiagnosticsMonitor {
    state: DiagnosticsState,
    health: Health,
    rx_timeout: Duration,
    retry_interval: Duration,
    validation_timeout: Duration,
    failed_attempts: u32,
}

impl DiagnosticsMonitor {
    pub fn new(timeouts: &Timeouts) -> Self {
        Self {
            state: DiagnosticsState::default(),
            health: Health::Healthy,
            rx_timeout: timeouts.rx,
            retry_interval: timeouts.retry,
            validation_timeout: timeouts.validation,
            failed_attempts: 0,
        }
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn state(&self) -> &DiagnosticsState {
        &self.state
    }

    /// A good sample arrived at `now`.
    pub fn record_rx(&mut self, now: Duration) {
        self.state.last_rx_timestamp = Some(now);
    }

    /// Check for staleness after a tick without a sample.
    ///
    /// Returns true exactly once per loss, on the Healthy → Degraded edge.
    /// The staleness window starts at the first check if nothing was ever received.
    pub fn check_rx(&mut self, now: Duration) -> bool {
        if self.health != Health::Healthy {
            return false;
        }
        let last = *self.state.last_rx_timestamp.get_or_insert(now);
        let silent = elapsed_since(now, last);
        if silent > self.rx_timeout {
            log::warn!("No sample for {:?}, device considered lost", silent);
            self.health = Health::Degraded;
            return true;
        }
        false
    }

    /// Declare the device lost without waiting for the staleness window.
    ///
    /// Returns true if this changed the state.
    pub fn declare_lost(&mut self, reason: &str) -> bool {
        if self.health != Health::Healthy {
            return false;
        }
        log::warn!("Device lost: {}", reason);
        self.health = Health::Degraded;
        true
    }

    /// Run one reconnection step if one is due.
    ///
    /// A failed clock read skips the step and leaves the state untouched.
    pub fn step_recovery(
        &mut self,
        clock: &dyn Clock,
        device: &mut DeviceManager,
        vars: &ConfigVariables,
    ) -> RecoveryStep {
        if self.health == Health::Healthy {
            return RecoveryStep::Idle;
        }

        let now = match clock.now() {
            Ok(now) => now,
            Err(e) => {
                log::warn!("Clock read failed, skipping recovery attempt: {}", e);
                return RecoveryStep::Waiting;
            }
        };

        if let Some(last) = self.state.last_recovery_attempt {
            if elapsed_since(now, last) < self.retry_interval {
                return RecoveryStep::Waiting;
            }
        }
        self.state.last_recovery_attempt = Some(
            self.state
                .last_recovery_attempt
                .map_or(now, |last| last.max(now)),
        );

        self.health = Health::Recovering;
        match self.reconnect(clock, device, vars) {
            Ok(()) => {
                let rx_time = clock.now().unwrap_or(now);
                self.record_rx(rx_time);
                self.health = Health::Healthy;
                log::info!(
                    "Device recovered after {} failed attempt(s)",
                    self.failed_attempts
                );
                self.failed_attempts = 0;
                RecoveryStep::Recovered
            }
            Err(e) => {
                self.health = Health::Degraded;
                self.failed_attempts += 1;
                if self.failed_attempts == 1 || self.failed_attempts % 50 == 0 {
                    log::warn!(
                        "Reconnection attempt {} failed: {}",
                        self.failed_attempts,
                        e
                    );
                } else {
                    log::debug!("Reconnection attempt {} failed: {}", self.failed_attempts, e);
                }
                RecoveryStep::Failed
            }
        }
    }

    /// Full cycle: close, reopen, reconfigure, validate.
    fn reconnect(
        &self,
        clock: &dyn Clock,
        device: &mut DeviceManager,
        vars: &ConfigVariables,
    ) -> Result<()> {
        device.close()?;
        device.open(&vars.serial_name)?;
        let result = device
            .configure(vars.update_rate_ms)
            .and_then(|_| self.validate(clock, device).map(|_| ()));
        if result.is_err() {
            device.close()?;
        }
        result
    }

    /// Wait for the first well-formed sample, for at most the validation timeout.
    pub fn validate(&self, clock: &dyn Clock, device: &mut DeviceManager) -> Result<RawSample> {
        let start = clock.now()?;
        loop {
            let waited = elapsed_since(clock.now()?, start);
            if waited >= self.validation_timeout {
                return Err(PalError::Unavailable("no sample during validation"));
            }
            let remaining = self.validation_timeout - waited;

            match device.read(remaining.min(VALIDATION_POLL)) {
                Ok(raw) if raw.is_well_formed() => return Ok(raw),
                Ok(_) => continue,
                Err(e) if e.is_unavailable() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ATTACH_TIMEOUT;
    use crate::testing::{FlakyClock, ManualClock, MockBackend};

    fn setup() -> (ManualClock, MockBackend, DeviceManager, DiagnosticsMonitor) {
        let clock = ManualClock::new();
        let backend = MockBackend::new(clock.clone());
        let dev = DeviceManager::new(Box::new(backend.clone()), ATTACH_TIMEOUT);
        let monitor = DiagnosticsMonitor::new(&Timeouts::default());
        (clock, backend, dev, monitor)
    }

    #[test]
    fn test_staleness_raises_once() {
        let (_, _, _, mut monitor) = setup();
        monitor.record_rx(Duration::from_secs(10));

        assert!(!monitor.check_rx(Duration::from_secs(12)));
        assert_eq!(monitor.health(), Health::Healthy);

        let late = Duration::from_secs(12) + Duration::from_micros(1);
        assert!(monitor.check_rx(late));
        assert_eq!(monitor.health(), Health::Degraded);

        for ms in 1..100 {
            assert!(!monitor.check_rx(late + Duration::from_millis(ms)));
        }
    }

    #[test]
    fn test_staleness_window_starts_at_first_check() {
        let (_, _, _, mut monitor) = setup();
        assert!(!monitor.check_rx(Duration::from_secs(5)));
        assert!(!monitor.check_rx(Duration::from_secs(7)));
        assert!(monitor.check_rx(Duration::from_secs(8)));
    }

    #[test]
    fn test_validate_responsive_device() {
        let (clock, backend, mut dev, monitor) = setup();
        dev.open("").unwrap();
        dev.configure(10).unwrap();

        let before = clock.now().unwrap();
        monitor.validate(&clock, &mut dev).unwrap();
        assert_eq!(backend.read_calls(), 1);
        assert_eq!(clock.now().unwrap(), before);
    }

    #[test]
    fn test_validate_silent_device_times_out_exactly() {
        let (clock, backend, mut dev, monitor) = setup();
        dev.open("").unwrap();
        dev.configure(10).unwrap();
        backend.set_responsive(false);

        let before = clock.now().unwrap();
        let err = monitor.validate(&clock, &mut dev).unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(clock.now().unwrap() - before, VALIDATION_TIMEOUT);
    }

    #[test]
    fn test_healthy_monitor_is_idle() {
        let (clock, backend, mut dev, mut monitor) = setup();
        let vars = ConfigVariables::default();
        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Idle
        );
        assert_eq!(backend.open_calls(), 0);
    }

    #[test]
    fn test_recovery_cadence_with_failing_opens() {
        for failures in [0u32, 1, 3, 7] {
            let (clock, backend, mut dev, mut monitor) = setup();
            let vars = ConfigVariables::default();
            backend.fail_next_opens(failures);
            assert!(monitor.declare_lost("test"));

            let start = clock.now().unwrap();
            let mut recovered_at = None;
            for _ in 0..5000 {
                if monitor.step_recovery(&clock, &mut dev, &vars) == RecoveryStep::Recovered {
                    recovered_at = Some(clock.now().unwrap());
                    break;
                }
                clock.advance(Duration::from_millis(1));
            }

            let took = recovered_at.unwrap() - start;
            assert!(took >= RECOVERY_RETRY_INTERVAL * failures);
            assert!(took <= RECOVERY_RETRY_INTERVAL * (failures + 1));
            assert_eq!(backend.open_calls(), failures + 1);
            assert_eq!(monitor.health(), Health::Healthy);
            assert!(dev.is_open());
        }
    }

    #[test]
    fn test_failed_attempt_still_advances_cadence() {
        let (clock, backend, mut dev, mut monitor) = setup();
        let vars = ConfigVariables::default();
        backend.set_attached(false);
        monitor.declare_lost("test");

        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Failed
        );
        let first = monitor.state().last_recovery_attempt.unwrap();

        clock.advance(Duration::from_millis(199));
        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Waiting
        );
        clock.advance(Duration::from_millis(1));
        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Failed
        );
        assert!(monitor.state().last_recovery_attempt.unwrap() > first);
        assert_eq!(backend.open_calls(), 2);
        assert_eq!(monitor.health(), Health::Degraded);
    }

    #[test]
    fn test_recovery_fails_when_validation_times_out() {
        let (clock, backend, mut dev, mut monitor) = setup();
        let vars = ConfigVariables::default();
        backend.set_responsive(false);
        monitor.declare_lost("test");

        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Failed
        );
        assert!(!dev.is_open());
        assert_eq!(clock.now().unwrap(), VALIDATION_TIMEOUT);
    }

    #[test]
    fn test_recovery_uses_current_vars() {
        let (clock, backend, mut dev, mut monitor) = setup();
        let vars = ConfigVariables {
            serial_name: "SN-7".into(),
            update_rate_ms: 2000,
            ..Default::default()
        };
        monitor.declare_lost("test");
        assert_eq!(
            monitor.step_recovery(&clock, &mut dev, &vars),
            RecoveryStep::Recovered
        );
        assert_eq!(backend.last_serial().as_deref(), Some("SN-7"));
        assert_eq!(dev.applied_rate_ms(), Some(crate::device::MAX_UPDATE_RATE_MS));
        assert_eq!(monitor.state().last_rx_timestamp, Some(Duration::ZERO));
    }

    #[test]
    fn test_clock_failure_skips_attempt() {
        let (clock, backend, mut dev, mut monitor) = setup();
        let flaky = FlakyClock::new(clock.clone());
        let vars = ConfigVariables::default();
        backend.set_attached(false);
        monitor.declare_lost("test");

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            monitor.step_recovery(&flaky, &mut dev, &vars),
            RecoveryStep::Failed
        );
        let attempt = monitor.state().last_recovery_attempt;

        flaky.set_failing(true);
        clock.advance(Duration::from_secs(1));
        for _ in 0..10 {
            assert_eq!(
                monitor.step_recovery(&flaky, &mut dev, &vars),
                RecoveryStep::Waiting
            );
        }
        assert_eq!(monitor.state().last_recovery_attempt, attempt);
        assert_eq!(backend.open_calls(), 1);
    }
}
