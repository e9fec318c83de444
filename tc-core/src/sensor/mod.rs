//! Sensor hierarchy
//!
//! Every monitored entity implements [`Sensor`]. Cross-cutting behavior (fault
//! counting, threshold evaluation, presence probing) lives in an owned
//! [`SensorCore`] that each variant composes.
//!
//! # Variants
//!
//! | kind                | type              | notes |
//! |---------------------|-------------------|-------|
//! | `thermal_sensor`    | [`ThermalSensor`] | plain temperature input |
//! | `ambient_sensor`    | [`ThermalSensor`] | read-only input to aggregation |
//! | `module_sensor`     | [`ModuleSensor`]  | absent cage is a zero contribution |
//! | `asic_sensor`       | [`ModuleSensor`]  | chip not up is a zero contribution |
//! | `tec_module_sensor` | [`TecModuleSensor`] | drives its own TEC cooling level |
//! | `fan_sensor`        | [`FanSensor`]     | stalled or missing fan faults at once |
//! | `psu_fan_sensor`    | [`FanSensor`]     | absent PSU is a zero contribution |
//! | `dpu_module`        | [`DpuModule`]     | CPU and DDR of one DPU board |

mod base;
mod dpu;
mod factory;
mod fan;
mod fault;
mod module;
mod tec;
mod thermal;

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::SensorKind;
use crate::hw::SysfsIo;

pub use base::{SensorCore, ThermalLevel};
pub use dpu::DpuModule;
pub use factory::build_sensor;
pub use fan::FanSensor;
pub use fault::{FaultCounter, FaultState};
pub use module::ModuleSensor;
pub use tec::TecModuleSensor;
pub use thermal::ThermalSensor;

/// Temperature in milli-degrees Celsius
pub type MilliCelsius = i64;

/// Lifecycle state of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Ok,
    /// Over a warning threshold, or failing reads not yet counted as a fault
    Degraded,
    Fault,
}

/// Why a sensor demands full cooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullReason {
    Fault,
    Emergency,
}

/// What a sensor asks of its zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// No thermal pressure (absent or passive entity)
    Idle,
    /// Map this temperature through the zone's strategy
    Temperature(MilliCelsius),
    /// Force `max_pwm`, bypassing hysteresis and rate limits
    Full(FullReason),
}

/// A sensor's contribution to its zone's duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmRequest<'a> {
    pub sensor: &'a str,
    pub demand: Demand,
}

impl PwmRequest<'_> {
    pub fn is_override(&self) -> bool {
        matches!(self.demand, Demand::Full(_))
    }
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub value: Option<MilliCelsius>,
    /// Lowest tachometer reading, for fans
    pub rpm: Option<u32>,
    pub present: bool,
    /// Whether the read itself succeeded
    pub ok: bool,
}

/// Everything a sensor may use while polling
pub struct PollContext<'a> {
    pub io: &'a dyn SysfsIo,
    /// Duty cycle currently committed to the owning zone
    pub commanded: Option<u16>,
    pub now: Instant,
}

/// Capability set of every monitored entity
pub trait Sensor: Send + fmt::Debug {
    /// Shared state and bookkeeping
    fn core(&self) -> &SensorCore;

    /// Read the hardware and update state
    ///
    /// Never fails: I/O errors become state.
    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn kind(&self) -> SensorKind {
        self.core().kind()
    }

    fn poll_interval(&self) -> Duration {
        self.core().interval()
    }

    /// Last good value
    fn value(&self) -> Option<MilliCelsius> {
        self.core().value()
    }

    fn contribution(&self) -> PwmRequest<'_> {
        self.core().contribution()
    }

    fn state(&self) -> SensorState {
        self.core().state()
    }
}
