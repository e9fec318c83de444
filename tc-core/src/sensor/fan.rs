//! Fan drawers and PSU fans
//!
//! A fan never asks for cooling by temperature alone. It faults, and so
//! forces its zone to full speed, when the drawer is missing, the hardware
//! raises its fault flag, or the tachometers read below the floor while the
//! zone is driving it.

use tracing::trace;

use crate::config::{EntityDescriptor, SensorKind};
use crate::constants::{attr, sensor as sensor_const};
use crate::sensor::{PollContext, Reading, Sensor, SensorCore};

#[derive(Debug)]
pub struct FanSensor {
    core: SensorCore,
    tacho_count: u32,
    rpm_floor: u32,
    last_rpm: Option<u32>,
}

impl FanSensor {
    pub fn new(desc: &EntityDescriptor, fault_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            core: SensorCore::new(desc, fault_threshold, recovery_threshold),
            tacho_count: desc.tacho_count.unwrap_or(1).max(1),
            rpm_floor: desc.rpm_floor.unwrap_or(sensor_const::DEFAULT_RPM_FLOOR),
            last_rpm: None,
        }
    }

    fn is_psu(&self) -> bool {
        self.core.kind() == SensorKind::PsuFanSensor
    }

    fn with_rpm(&self, mut reading: Reading) -> Reading {
        reading.rpm = self.last_rpm;
        reading
    }

    fn fault(&mut self, reason: &str) -> Reading {
        self.core.force_fault(reason);
        self.with_rpm(self.core.reading(false))
    }
}

impl Sensor for FanSensor {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading {
        match self.core.read_flag(ctx, attr::PRESENT) {
            Ok(Some(false)) if self.is_psu() => {
                self.last_rpm = None;
                return self.core.record_idle(false);
            }
            Ok(Some(false)) => return self.fault("fan drawer missing"),
            Ok(_) => {}
            Err(e) => return self.core.record_failure(&e),
        }

        match self.core.read_flag(ctx, attr::FAULT) {
            Ok(Some(true)) => return self.fault("hardware fault flag set"),
            Ok(_) => {}
            Err(e) => return self.core.record_failure(&e),
        }

        let mut slowest = u32::MAX;
        for index in 1..=self.tacho_count {
            let path = self.core.attr(&attr::tacho(index));
            match ctx.io.read_int(&path) {
                Ok(rpm) => slowest = slowest.min(rpm.clamp(0, i64::from(u32::MAX)) as u32),
                Err(e) => return self.core.record_failure(&e),
            }
        }
        self.last_rpm = Some(slowest);
        trace!(sensor = %self.core.name(), rpm = slowest, "Tachometer read");

        if let Some(duty) = ctx.commanded {
            if duty > 0 && slowest < self.rpm_floor {
                return self.fault("fan stalled below rpm floor");
            }
        }

        let temperature = self.core.attr(attr::TEMP_INPUT);
        let reading = if ctx.io.probe(&temperature, self.core.interval()) {
            match ctx.io.read_int(&temperature) {
                Ok(value) => self.core.record_value(value),
                Err(e) => self.core.record_failure(&e),
            }
        } else {
            self.core.record_idle(true)
        };
        self.with_rpm(reading)
    }
}
