//! State shared by every sensor variant

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{EntityDescriptor, SensorKind, Thresholds};
use crate::constants::attr;
use crate::error::{Result, ThermalError};
use crate::sensor::{
    Demand, FaultCounter, FullReason, MilliCelsius, PollContext, PwmRequest, Reading, SensorState,
};

/// Position of a reading relative to the threshold set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThermalLevel {
    Normal,
    Warning,
    Critical,
    Emergency,
}

/// Identity, thresholds, fault counter and last reading of one sensor
#[derive(Debug, Clone)]
pub struct SensorCore {
    name: String,
    kind: SensorKind,
    base: PathBuf,
    interval: Duration,
    thresholds: Thresholds,
    fault: FaultCounter,
    value: Option<MilliCelsius>,
    present: bool,
    level: ThermalLevel,
    state: SensorState,
}

impl SensorCore {
    pub fn new(desc: &EntityDescriptor, fault_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            name: desc.name.clone(),
            kind: desc.kind,
            base: desc.sysfs_path.clone(),
            interval: desc.poll_interval(),
            thresholds: desc.thresholds,
            fault: FaultCounter::new(fault_threshold, recovery_threshold),
            value: None,
            present: true,
            level: ThermalLevel::Normal,
            state: SensorState::Ok,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn value(&self) -> Option<MilliCelsius> {
        self.value
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    pub fn level(&self) -> ThermalLevel {
        self.level
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn fault_counter(&self) -> &FaultCounter {
        &self.fault
    }

    /// Path of an attribute relative to the entity directory
    pub fn attr(&self, rel: &str) -> PathBuf {
        self.base.join(rel)
    }

    /// Replace thresholds, e.g. with limits reported by the hardware
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }

    /// Presence of the entity
    ///
    /// Uses the `present` attribute when there is one, otherwise the
    /// existence of the `input` link. Link checks are cached for one poll
    /// interval.
    pub fn read_presence(&self, ctx: &PollContext<'_>, input: &str) -> Result<bool> {
        self.read_flag(ctx, attr::PRESENT)
            .map(|flag| match flag {
                Some(present) => Ok(present),
                None => Ok(ctx.io.probe(&self.attr(input), self.interval)),
            })?
    }

    /// Read an optional 0/1 attribute; `None` when the attribute does not exist
    pub fn read_flag(&self, ctx: &PollContext<'_>, rel: &str) -> Result<Option<bool>> {
        let path = self.attr(rel);
        if !ctx.io.probe(&path, self.interval) {
            return Ok(None);
        }
        match ctx.io.read_int(&path) {
            Ok(v) => Ok(Some(v != 0)),
            Err(ThermalError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record a good temperature reading
    ///
    /// A value at or above the `fault` threshold is implausible and is
    /// recorded as a failed read instead.
    pub fn record_value(&mut self, value: MilliCelsius) -> Reading {
        if value >= self.thresholds.fault {
            let err = ThermalError::Malformed {
                path: self.attr(attr::TEMP_INPUT),
                content: format!("{} exceeds fault threshold {}", value, self.thresholds.fault),
            };
            return self.record_failure(&err);
        }
        self.fault.record(true);
        self.present = true;
        self.value = Some(value);
        self.set_level(classify(&self.thresholds, value));
        self.refresh_state();
        self.reading(true)
    }

    /// Record a good read that carries no temperature (passive or absent entity)
    pub fn record_idle(&mut self, present: bool) -> Reading {
        self.fault.record(true);
        self.present = present;
        self.value = None;
        self.set_level(ThermalLevel::Normal);
        self.refresh_state();
        self.reading(true)
    }

    /// Record a failed read
    ///
    /// The last good value is kept so a degraded sensor still contributes.
    pub fn record_failure(&mut self, err: &ThermalError) -> Reading {
        self.fault.record(false);
        if self.fault.failures() == 1 {
            warn!(sensor = %self.name, kind = %self.kind, error = %err, "Sensor read failed");
        } else {
            debug!(
                sensor = %self.name,
                failures = self.fault.failures(),
                error = %err,
                "Sensor read failed again"
            );
        }
        self.refresh_state();
        self.reading(false)
    }

    /// Enter `Fault` immediately on a safety condition
    pub fn force_fault(&mut self, reason: &str) {
        if !self.fault.is_fault() {
            error!(sensor = %self.name, kind = %self.kind, reason, "Safety fault");
        }
        self.fault.force_fault();
        self.refresh_state();
    }

    /// Contribution derived from state, level and last value
    pub fn contribution(&self) -> PwmRequest<'_> {
        let demand = if self.state == SensorState::Fault {
            Demand::Full(FullReason::Fault)
        } else if self.level == ThermalLevel::Emergency {
            Demand::Full(FullReason::Emergency)
        } else if !self.present {
            Demand::Idle
        } else {
            self.value.map(Demand::Temperature).unwrap_or(Demand::Idle)
        };
        PwmRequest {
            sensor: &self.name,
            demand,
        }
    }

    pub fn reading(&self, ok: bool) -> Reading {
        Reading {
            value: self.value,
            rpm: None,
            present: self.present,
            ok,
        }
    }

    fn set_level(&mut self, level: ThermalLevel) {
        if level == self.level {
            return;
        }
        match level {
            ThermalLevel::Emergency => error!(
                sensor = %self.name,
                value = ?self.value,
                threshold = self.thresholds.emergency,
                "Emergency temperature, forcing maximum cooling"
            ),
            ThermalLevel::Critical => error!(
                sensor = %self.name,
                value = ?self.value,
                threshold = self.thresholds.critical,
                "Critical temperature"
            ),
            ThermalLevel::Warning => warn!(
                sensor = %self.name,
                value = ?self.value,
                threshold = self.thresholds.warning,
                "Temperature above warning threshold"
            ),
            ThermalLevel::Normal => info!(sensor = %self.name, "Temperature back to normal"),
        }
        self.level = level;
    }

    fn refresh_state(&mut self) {
        let next = if self.fault.is_fault() {
            SensorState::Fault
        } else if self.fault.failures() > 0 || self.level > ThermalLevel::Normal {
            SensorState::Degraded
        } else {
            SensorState::Ok
        };

        if next != self.state {
            match (self.state, next) {
                (_, SensorState::Fault) => {
                    error!(sensor = %self.name, kind = %self.kind, "Sensor entered fault state")
                }
                (SensorState::Fault, _) => {
                    info!(sensor = %self.name, kind = %self.kind, "Sensor recovered from fault")
                }
                _ => debug!(sensor = %self.name, from = ?self.state, to = ?next, "Sensor state changed"),
            }
            self.state = next;
        }
    }
}

/// Threshold level of a value
pub fn classify(thresholds: &Thresholds, value: MilliCelsius) -> ThermalLevel {
    if value >= thresholds.emergency {
        ThermalLevel::Emergency
    } else if value >= thresholds.critical {
        ThermalLevel::Critical
    } else if value >= thresholds.warning {
        ThermalLevel::Warning
    } else {
        ThermalLevel::Normal
    }
}
