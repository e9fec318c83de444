//! Per-sensor polling scheduler
//!
//! Every sensor has its own poll interval. A tick polls the sensors that are
//! due, re-aggregates only the zones whose members changed (or whose strategy
//! asked for a deadline), and commits the result to hardware. Slow sensors
//! therefore never throttle fast ones.
//!
//! The scheduler owns all sensor and zone state. Cancellation is cooperative:
//! the stop flag is checked before each poll, never in the middle of one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{HotParams, SystemConfig};
use crate::constants::attr;
use crate::engine::PwmZone;
use crate::error::{Result, ThermalError};
use crate::hw::SysfsIo;
use crate::sensor::{build_sensor, Demand, MilliCelsius, PollContext, Sensor, SensorState};

/// What a zone sees of a sensor; a change triggers re-aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    value: Option<MilliCelsius>,
    state: SensorState,
    demand: Demand,
}

impl Snapshot {
    fn of(sensor: &dyn Sensor) -> Self {
        Self {
            value: sensor.value(),
            state: sensor.state(),
            demand: sensor.contribution().demand,
        }
    }
}

struct SensorSlot {
    sensor: Box<dyn Sensor>,
    zone: usize,
    next_due: Instant,
    snapshot: Option<Snapshot>,
}

struct ZoneSlot {
    zone: PwmZone,
    members: Vec<usize>,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sensors polled
    pub polled: usize,
    /// Sensors whose snapshot changed
    pub changed: usize,
    /// Zones re-aggregated
    pub aggregated: usize,
    /// Zones that committed a new duty cycle
    pub committed: usize,
    /// The stop flag was raised during the tick
    pub interrupted: bool,
}

pub struct Scheduler {
    io: Box<dyn SysfsIo>,
    slots: Vec<SensorSlot>,
    zones: Vec<ZoneSlot>,
    fault_report_dir: Option<PathBuf>,
}

impl Scheduler {
    /// Build the sensor graph for a validated configuration
    ///
    /// Every sensor is due immediately.
    pub fn new(config: &SystemConfig, io: Box<dyn SysfsIo>, now: Instant) -> Result<Self> {
        let mut zones = Vec::with_capacity(config.zones.len());
        for zone in &config.zones {
            let members: Vec<_> = config
                .entities
                .iter()
                .filter(|e| e.pwm_zone == zone.name)
                .collect();
            zones.push(ZoneSlot {
                zone: PwmZone::from_config(zone, &members, &config.tables)?,
                members: Vec::with_capacity(members.len()),
            });
        }

        let mut slots = Vec::with_capacity(config.entities.len());
        for desc in &config.entities {
            let zone = config
                .zones
                .iter()
                .position(|z| z.name == desc.pwm_zone)
                .ok_or_else(|| ThermalError::UnknownZone {
                    entity: desc.name.clone(),
                    zone: desc.pwm_zone.clone(),
                })?;
            zones[zone].members.push(slots.len());
            slots.push(SensorSlot {
                sensor: build_sensor(desc, config)?,
                zone,
                next_due: now,
                snapshot: None,
            });
        }

        info!(
            sensors = slots.len(),
            zones = zones.len(),
            sku = %config.sku,
            "Scheduler ready"
        );
        Ok(Self {
            io,
            slots,
            zones,
            fault_report_dir: config.fault_report_dir.clone(),
        })
    }

    /// Poll due sensors, then aggregate and actuate affected zones
    pub fn tick(&mut self, now: Instant, stop: &AtomicBool) -> TickReport {
        let mut report = TickReport::default();
        let mut dirty = vec![false; self.zones.len()];

        for slot in self.slots.iter_mut() {
            if stop.load(Ordering::SeqCst) {
                report.interrupted = true;
                return report;
            }
            if slot.next_due > now {
                continue;
            }

            let ctx = PollContext {
                io: self.io.as_ref(),
                commanded: self.zones[slot.zone].zone.committed(),
                now,
            };
            slot.sensor.poll(&ctx);
            slot.next_due = now + slot.sensor.poll_interval();
            report.polled += 1;

            let snapshot = Snapshot::of(slot.sensor.as_ref());
            if slot.snapshot == Some(snapshot) {
                continue;
            }
            let was_fault = slot
                .snapshot
                .is_some_and(|s| s.state == SensorState::Fault);
            let is_fault = snapshot.state == SensorState::Fault;
            if was_fault != is_fault {
                report_fault(
                    self.io.as_ref(),
                    self.fault_report_dir.as_deref(),
                    slot.sensor.name(),
                    is_fault,
                );
            }
            slot.snapshot = Some(snapshot);
            dirty[slot.zone] = true;
            report.changed += 1;
        }

        for (index, entry) in self.zones.iter_mut().enumerate() {
            let deadline_passed = entry.zone.next_deadline().is_some_and(|d| d <= now);
            let due = dirty[index]
                || deadline_passed
                || entry.zone.write_pending()
                || entry.zone.committed().is_none();
            if !due {
                continue;
            }
            let requests: Vec<_> = entry
                .members
                .iter()
                .map(|&i| self.slots[i].sensor.contribution())
                .collect();
            report.aggregated += 1;
            if entry.zone.update(&requests, self.io.as_ref(), now).is_some() {
                report.committed += 1;
            }
        }

        if report.changed > 0 {
            debug!(
                polled = report.polled,
                changed = report.changed,
                committed = report.committed,
                "Tick"
            );
        }
        report
    }

    /// Earliest instant at which a sensor or a strategy deadline is due
    pub fn next_due(&self) -> Option<Instant> {
        let sensors = self.slots.iter().map(|s| s.next_due);
        let deadlines = self.zones.iter().filter_map(|z| z.zone.next_deadline());
        sensors.chain(deadlines).min()
    }

    /// Command every zone to its safe duty cycle
    ///
    /// Every zone is attempted; the first error is returned.
    pub fn apply_safe(&mut self) -> Result<()> {
        let mut first_err = None;
        for entry in self.zones.iter_mut() {
            if let Err(e) = entry.zone.apply_safe(self.io.as_ref()) {
                warn!(zone = %entry.zone.name(), error = %e, "Failed to apply safe duty cycle");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Apply reloaded zone tuning; returns how many zones were updated
    pub fn apply_hot(&mut self, params: &HotParams) -> usize {
        let mut applied = 0;
        for (name, tuning) in &params.zones {
            match self.zones.iter_mut().find(|z| z.zone.name() == name) {
                Some(entry) => {
                    entry.zone.apply_hot(tuning);
                    applied += 1;
                }
                None => warn!(zone = %name, "Reloaded zone does not exist, ignoring"),
            }
        }
        applied
    }

    pub fn sensors(&self) -> impl Iterator<Item = &dyn Sensor> + '_ {
        self.slots.iter().map(|s| s.sensor.as_ref())
    }

    pub fn sensor(&self, name: &str) -> Option<&dyn Sensor> {
        self.sensors().find(|s| s.name() == name)
    }

    pub fn zones(&self) -> impl Iterator<Item = &PwmZone> + '_ {
        self.zones.iter().map(|z| &z.zone)
    }

    pub fn zone(&self, name: &str) -> Option<&PwmZone> {
        self.zones().find(|z| z.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.zones.is_empty()
    }
}

/// Publish a sensor's fault state as `<name>_fault`
fn report_fault(io: &dyn SysfsIo, dir: Option<&Path>, name: &str, fault: bool) {
    let Some(dir) = dir else {
        return;
    };
    let path = dir.join(attr::fault_report(name));
    if let Err(e) = io.write_int(&path, i64::from(fault)) {
        warn!(sensor = %name, path = %path.display(), error = %e, "Failed to write fault report");
    }
}
