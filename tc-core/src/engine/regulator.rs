//! PWM aggregation strategies
//!
//! # How It Works
//!
//! Every member sensor of a zone turns its demand into a duty cycle and the
//! zone runs at the highest of them, so cooling always satisfies the
//! hottest contributor.
//!
//! - **Simple**: linear mapping between two per-sensor breakpoints.
//! - **Dynamic**: per-kind `dmin`/`dmax` tables. Raising is immediate.
//!   Lowering waits until the lower target has held for the dwell time and
//!   then moves down by at most `step_down` per commit.
//!
//! A `Full` demand always yields `max_pwm` and cancels any pending lowering.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

use tracing::trace;

use crate::config::{
    Breakpoints, EntityDescriptor, StrategyKind, TableConfig, ZoneConfig, ZoneTuning,
};
use crate::engine::table::{linear, DutyTable};
use crate::error::{Result, ThermalError};
use crate::sensor::{Demand, PwmRequest};

/// Aggregation algorithm of one zone
pub trait PwmStrategy: Send + fmt::Debug {
    /// Target duty cycle for the current member requests
    ///
    /// `current` is the duty cycle last committed to the zone.
    fn aggregate(&mut self, requests: &[PwmRequest<'_>], current: Option<u16>, now: Instant) -> u16;

    /// When the strategy wants to be asked again without new readings
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Apply reloaded tuning
    fn apply_hot(&mut self, _tuning: &ZoneTuning) {}

    fn name(&self) -> &'static str;
}

/// Duty-cycle bounds shared by both strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    min: u16,
    max: u16,
}

impl Bounds {
    fn clamp(&self, duty: u16) -> u16 {
        duty.clamp(self.min, self.max)
    }
}

/// Linear breakpoints per sensor, maximum across members
#[derive(Debug)]
pub struct SimpleStrategy {
    bounds: Bounds,
    breakpoints: HashMap<String, Breakpoints>,
}

impl SimpleStrategy {
    pub fn new(min_pwm: u16, max_pwm: u16, breakpoints: HashMap<String, Breakpoints>) -> Self {
        Self {
            bounds: Bounds { min: min_pwm, max: max_pwm },
            breakpoints,
        }
    }

    fn duty_for(&self, request: &PwmRequest<'_>) -> u16 {
        match request.demand {
            Demand::Idle => self.bounds.min,
            Demand::Full(_) => self.bounds.max,
            Demand::Temperature(t) => match self.breakpoints.get(request.sensor) {
                Some(bp) => linear(bp, self.bounds.min, self.bounds.max, t),
                None => self.bounds.max,
            },
        }
    }
}

impl PwmStrategy for SimpleStrategy {
    fn aggregate(&mut self, requests: &[PwmRequest<'_>], _current: Option<u16>, _now: Instant) -> u16 {
        let duty = requests
            .iter()
            .map(|r| self.duty_for(r))
            .max()
            .unwrap_or(self.bounds.min);
        self.bounds.clamp(duty)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Table-driven strategy with dwell and asymmetric rate limiting
#[derive(Debug)]
pub struct DynamicStrategy {
    bounds: Bounds,
    tables: HashMap<String, DutyTable>,
    tuning: ZoneTuning,
    /// When the target first dropped below the committed duty
    below_since: Option<Instant>,
}

impl DynamicStrategy {
    pub fn new(
        min_pwm: u16,
        max_pwm: u16,
        tuning: ZoneTuning,
        tables: HashMap<String, DutyTable>,
    ) -> Self {
        Self {
            bounds: Bounds { min: min_pwm, max: max_pwm },
            tables,
            tuning,
            below_since: None,
        }
    }

    fn duty_for(&self, request: &PwmRequest<'_>) -> u16 {
        match request.demand {
            Demand::Idle => self.bounds.min,
            Demand::Full(_) => self.bounds.max,
            Demand::Temperature(t) => match self.tables.get(request.sensor) {
                Some(table) => self.bounds.clamp(table.duty(t)),
                None => self.bounds.max,
            },
        }
    }
}

impl PwmStrategy for DynamicStrategy {
    fn aggregate(&mut self, requests: &[PwmRequest<'_>], current: Option<u16>, now: Instant) -> u16 {
        if requests.iter().any(PwmRequest::is_override) {
            self.below_since = None;
            return self.bounds.max;
        }

        let target = requests
            .iter()
            .map(|r| self.duty_for(r))
            .max()
            .unwrap_or(self.bounds.min);

        let Some(current) = current else {
            return target;
        };

        if target >= current {
            self.below_since = None;
            return target;
        }
        // Inside the hysteresis band a lower target is noise
        if current - target <= self.tuning.hysteresis {
            self.below_since = None;
            return current;
        }

        let since = *self.below_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.tuning.dwell {
            trace!(target, current, "Lower duty pending dwell");
            return current;
        }

        let next = target.max(current.saturating_sub(self.tuning.step_down));
        self.below_since = if next > target { Some(now) } else { None };
        next
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.below_since.map(|since| since + self.tuning.dwell)
    }

    fn apply_hot(&mut self, tuning: &ZoneTuning) {
        self.tuning = *tuning;
    }

    fn name(&self) -> &'static str {
        "dynamic"
    }
}

/// Build the strategy configured for `zone` over its member entities
pub fn build_strategy(
    zone: &ZoneConfig,
    members: &[&EntityDescriptor],
    tables: &BTreeMap<String, TableConfig>,
) -> Result<Box<dyn PwmStrategy>> {
    match zone.strategy {
        StrategyKind::Simple => {
            let breakpoints = members
                .iter()
                .map(|e| (e.name.clone(), e.effective_breakpoints()))
                .collect();
            Ok(Box::new(SimpleStrategy::new(zone.min_pwm, zone.max_pwm, breakpoints)))
        }
        StrategyKind::Dynamic => {
            let mut resolved = HashMap::with_capacity(members.len());
            for entity in members {
                let name = entity.table_name();
                let table = tables.get(name).ok_or_else(|| {
                    ThermalError::invalid_config(
                        format!("entities[{}].table", entity.name),
                        format!("table '{}' is not defined", name),
                    )
                })?;
                resolved.insert(entity.name.clone(), DutyTable::from_config(table));
            }
            Ok(Box::new(DynamicStrategy::new(
                zone.min_pwm,
                zone.max_pwm,
                zone.tuning(),
                resolved,
            )))
        }
    }
}
