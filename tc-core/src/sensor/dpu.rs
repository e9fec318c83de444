//! DPU boards
//!
//! Each board lives in a `dpu{N}` directory under the entity path and
//! reports CPU and DDR temperatures. The hotter of the two drives cooling.
//! A board that is not up yet contributes nothing.

use std::path::PathBuf;

use crate::config::{check_dpu_index, EntityDescriptor};
use crate::constants::attr;
use crate::error::{Result, ThermalError};
use crate::sensor::{PollContext, Reading, Sensor, SensorCore};

#[derive(Debug)]
pub struct DpuModule {
    core: SensorCore,
    cpu: PathBuf,
    ddr: PathBuf,
}

impl DpuModule {
    /// Build the sensor for board `dpu_index` of `dpu_count`
    ///
    /// The index is checked before any path is derived from it.
    pub fn new(
        desc: &EntityDescriptor,
        dpu_count: u32,
        fault_threshold: u32,
        recovery_threshold: u32,
    ) -> Result<Self> {
        let index = desc.dpu_index.ok_or_else(|| {
            ThermalError::invalid_config(
                format!("entities[{}].dpu_index", desc.name),
                "DPU entities need an index",
            )
        })?;
        check_dpu_index(index, dpu_count)?;

        let mut board = desc.clone();
        board.sysfs_path = desc.sysfs_path.join(attr::dpu_dir(index));
        let core = SensorCore::new(&board, fault_threshold, recovery_threshold);
        Ok(Self {
            cpu: core.attr(attr::DPU_CPU_TEMP),
            ddr: core.attr(attr::DPU_DDR_TEMP),
            core,
        })
    }

    fn read_hottest(&self, ctx: &PollContext<'_>) -> Result<i64> {
        let cpu = ctx.io.read_int(&self.cpu)?;
        if !ctx.io.probe(&self.ddr, self.core.interval()) {
            return Ok(cpu);
        }
        let ddr = ctx.io.read_int(&self.ddr)?;
        Ok(cpu.max(ddr))
    }
}

impl Sensor for DpuModule {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading {
        match self.core.read_flag(ctx, attr::READY) {
            Ok(Some(false)) => return self.core.record_idle(false),
            Ok(_) => {}
            Err(e) => return self.core.record_failure(&e),
        }
        match self.read_hottest(ctx) {
            Ok(value) => self.core.record_value(value),
            Err(e) => self.core.record_failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorKind;
    use crate::hw::{SysfsGateway, SysfsIo};
    use crate::sensor::{testing, Demand, SensorState};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn ctx(io: &dyn SysfsIo) -> PollContext<'_> {
        PollContext { io, commanded: None, now: Instant::now() }
    }

    fn descriptor(dir: &Path, index: Option<u32>) -> EntityDescriptor {
        let mut desc = testing::descriptor("dpu", SensorKind::DpuModule, dir);
        desc.poll_interval_ms = 0;
        desc.dpu_index = index;
        desc
    }

    #[test]
    fn test_index_out_of_range_rejected() {
        let dir = Path::new("/hw/dpu");
        for index in [0, 5] {
            match DpuModule::new(&descriptor(dir, Some(index)), 4, 3, 3) {
                Err(ThermalError::DpuIndexOutOfRange { index: i, count }) => {
                    assert_eq!(i, index);
                    assert_eq!(count, 4);
                }
                other => panic!("expected DpuIndexOutOfRange, got {:?}", other),
            }
        }
        assert!(DpuModule::new(&descriptor(dir, None), 4, 3, 3).is_err());
        assert!(DpuModule::new(&descriptor(dir, Some(4)), 4, 3, 3).is_ok());
    }

    #[test]
    fn test_hotter_of_cpu_and_ddr() {
        let dir = TempDir::new().unwrap();
        let board = dir.path().join("dpu2");
        fs::create_dir(&board).unwrap();
        fs::write(board.join("ready"), "1").unwrap();
        fs::write(board.join("cpu_temp"), "61000").unwrap();
        fs::write(board.join("ddr_temp"), "64000").unwrap();

        let mut s = DpuModule::new(&descriptor(dir.path(), Some(2)), 2, 3, 3).unwrap();
        let io = SysfsGateway::new()
            .with_read_timeout(None)
            .with_retry_delay(Duration::ZERO);
        s.poll(&ctx(&io));
        assert_eq!(s.contribution().demand, Demand::Temperature(64_000));

        fs::write(board.join("ready"), "0").unwrap();
        s.poll(&ctx(&io));
        assert_eq!(s.contribution().demand, Demand::Idle);
        assert_eq!(s.state(), SensorState::Ok);
    }
}
