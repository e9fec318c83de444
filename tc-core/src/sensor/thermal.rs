//! Plain temperature inputs (board, CPU, ambient)

use std::path::PathBuf;

use crate::config::EntityDescriptor;
use crate::constants::attr;
use crate::sensor::{PollContext, Reading, Sensor, SensorCore};

#[derive(Debug)]
pub struct ThermalSensor {
    core: SensorCore,
    input: PathBuf,
}

impl ThermalSensor {
    pub fn new(desc: &EntityDescriptor, fault_threshold: u32, recovery_threshold: u32) -> Self {
        let core = SensorCore::new(desc, fault_threshold, recovery_threshold);
        let input = core.attr(attr::TEMP_INPUT);
        Self { core, input }
    }
}

impl Sensor for ThermalSensor {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading {
        match ctx.io.read_int(&self.input) {
            Ok(value) => self.core.record_value(value),
            Err(e) => self.core.record_failure(&e),
        }
    }
}
