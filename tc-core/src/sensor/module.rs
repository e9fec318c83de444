//! Pluggable modules and the switch ASIC
//!
//! Both may legitimately be missing: an empty cage or an ASIC that has not
//! finished initialization contributes nothing and is not a fault. Modules
//! report their own thresholds, which take precedence over the configured
//! ones while the module is plugged in.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{EntityDescriptor, SensorKind, Thresholds};
use crate::constants::attr;
use crate::error::Result;
use crate::sensor::{MilliCelsius, PollContext, Reading, Sensor, SensorCore};

#[derive(Debug)]
pub struct ModuleSensor {
    core: SensorCore,
    input: PathBuf,
    presence_attr: &'static str,
    configured: Thresholds,
    hw_thresholds_loaded: bool,
}

impl ModuleSensor {
    pub fn new(desc: &EntityDescriptor, fault_threshold: u32, recovery_threshold: u32) -> Self {
        let core = SensorCore::new(desc, fault_threshold, recovery_threshold);
        let input = core.attr(attr::TEMP_INPUT);
        let presence_attr = match desc.kind {
            SensorKind::AsicSensor => attr::READY,
            _ => attr::PRESENT,
        };
        Self {
            core,
            input,
            presence_attr,
            configured: desc.thresholds,
            hw_thresholds_loaded: desc.kind == SensorKind::AsicSensor,
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }

    /// Whether the entity is there to be read
    pub(crate) fn probe_presence(&mut self, ctx: &PollContext<'_>) -> Result<bool> {
        match self.core.read_flag(ctx, self.presence_attr)? {
            Some(flag) => Ok(flag),
            None => Ok(ctx.io.probe(&self.input, self.core.interval())),
        }
    }

    /// Read the temperature of a present entity
    pub(crate) fn read_temperature(&mut self, ctx: &PollContext<'_>) -> Reading {
        let sample = self.sample(ctx);
        self.record_sample(sample)
    }

    /// Raw temperature of a present entity, not yet recorded
    pub(crate) fn sample(&mut self, ctx: &PollContext<'_>) -> Result<MilliCelsius> {
        if !self.hw_thresholds_loaded {
            self.load_hw_thresholds(ctx);
        }
        ctx.io.read_int(&self.input)
    }

    /// Record the outcome of one poll
    pub(crate) fn record_sample(&mut self, sample: Result<MilliCelsius>) -> Reading {
        match sample {
            // No temperature sensor on this module (passive cable)
            Ok(0) => self.core.record_idle(true),
            Ok(value) => self.core.record_value(value),
            Err(e) => self.core.record_failure(&e),
        }
    }

    pub(crate) fn mark_absent(&mut self) -> Reading {
        if self.core.is_present() {
            info!(sensor = %self.core.name(), kind = %self.core.kind(), "Entity absent");
        }
        if self.core.kind() != SensorKind::AsicSensor {
            self.hw_thresholds_loaded = false;
            self.core.set_thresholds(self.configured);
        }
        self.core.record_idle(false)
    }

    fn load_hw_thresholds(&mut self, ctx: &PollContext<'_>) {
        let read = |rel: &str| {
            ctx.io
                .read_int(&self.core.attr(rel))
                .ok()
                .filter(|v| *v > 0)
        };
        let mut thresholds = self.configured;
        if let Some(crit) = read(attr::TEMP_CRIT) {
            thresholds.critical = crit;
            thresholds.warning = thresholds.warning.min(crit);
        }
        if let Some(emergency) = read(attr::TEMP_EMERGENCY) {
            thresholds.emergency = emergency;
        }
        thresholds.emergency = thresholds.emergency.max(thresholds.critical);
        thresholds.fault = thresholds.fault.max(thresholds.emergency + 1);

        if thresholds != self.configured {
            debug!(
                sensor = %self.core.name(),
                critical = thresholds.critical,
                emergency = thresholds.emergency,
                "Using module-reported thresholds"
            );
        }
        self.core.set_thresholds(thresholds);
        self.hw_thresholds_loaded = true;
    }
}

impl Sensor for ModuleSensor {
    fn core(&self) -> &SensorCore {
        &self.core
    }

    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading {
        match self.probe_presence(ctx) {
            Ok(true) => self.read_temperature(ctx),
            Ok(false) => self.mark_absent(),
            Err(e) => self.core.record_failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{SysfsGateway, SysfsIo};
    use crate::sensor::{testing, Demand, SensorState};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn gateway() -> SysfsGateway {
        SysfsGateway::new()
            .with_read_timeout(None)
            .with_retry_delay(Duration::ZERO)
    }

    fn ctx(io: &dyn SysfsIo) -> PollContext<'_> {
        PollContext { io, commanded: None, now: Instant::now() }
    }

    fn write(dir: &Path, rel: &str, value: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value).unwrap();
    }

    fn module(dir: &Path) -> ModuleSensor {
        let mut desc = testing::descriptor("module1", SensorKind::ModuleSensor, dir);
        desc.poll_interval_ms = 0;
        ModuleSensor::new(&desc, 3, 3)
    }

    #[test]
    fn test_absent_module_is_idle_without_fault() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "0");
        let io = gateway();
        let mut s = module(dir.path());

        for _ in 0..5 {
            let reading = s.poll(&ctx(&io));
            assert!(reading.ok);
            assert!(!reading.present);
        }
        assert_eq!(s.state(), SensorState::Ok);
        assert_eq!(s.contribution().demand, Demand::Idle);
        assert_eq!(s.core().fault_counter().failures(), 0);
    }

    #[test]
    fn test_missing_input_link_means_absent() {
        let dir = TempDir::new().unwrap();
        let io = gateway();
        let mut s = module(dir.path());
        s.poll(&ctx(&io));
        assert_eq!(s.state(), SensorState::Ok);
        assert_eq!(s.contribution().demand, Demand::Idle);
    }

    #[test]
    fn test_zero_temperature_is_idle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "0");
        let io = gateway();
        let mut s = module(dir.path());
        s.poll(&ctx(&io));
        assert_eq!(s.contribution().demand, Demand::Idle);
        assert_eq!(s.state(), SensorState::Ok);
    }

    #[test]
    fn test_module_thresholds_override_configured() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "72000");
        write(dir.path(), attr::TEMP_CRIT, "75000");
        write(dir.path(), attr::TEMP_EMERGENCY, "0");
        let io = gateway();
        let mut s = module(dir.path());

        s.poll(&ctx(&io));
        assert_eq!(s.core().thresholds().critical, 75_000);
        assert_eq!(s.core().thresholds().emergency, 90_000);
        assert_eq!(s.contribution().demand, Demand::Temperature(72_000));

        // Unplug restores configured thresholds
        write(dir.path(), "present", "0");
        s.poll(&ctx(&io));
        assert_eq!(s.core().thresholds().critical, 80_000);
    }

    #[test]
    fn test_asic_not_ready_is_idle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ready", "0");
        write(dir.path(), attr::TEMP_INPUT, "60000");
        let desc = testing::descriptor("asic", SensorKind::AsicSensor, dir.path());
        let mut s = ModuleSensor::new(&desc, 3, 3);
        let io = gateway();

        s.poll(&ctx(&io));
        assert_eq!(s.contribution().demand, Demand::Idle);

        write(dir.path(), "ready", "1");
        s.poll(&ctx(&io));
        assert_eq!(s.contribution().demand, Demand::Temperature(60_000));
    }

    #[test]
    fn test_present_module_with_unreadable_input_faults() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "garbage");
        let io = gateway();
        let mut s = module(dir.path());
        for _ in 0..3 {
            s.poll(&ctx(&io));
        }
        assert_eq!(s.state(), SensorState::Fault);
    }
}
