//! Modules with a thermoelectric cooler
//!
//! Behaves like a module sensor for fan control and additionally drives the
//! module's own cooling level proportionally to how far the temperature is
//! above the TEC target.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{EntityDescriptor, TecConfig};
use crate::constants::attr;
use crate::error::Result;
use crate::sensor::{MilliCelsius, ModuleSensor, PollContext, Reading, Sensor, SensorCore};

const DEFAULT_MAX_LEVEL: u32 = 100;

#[derive(Debug)]
pub struct TecModuleSensor {
    module: ModuleSensor,
    tec: TecConfig,
    level_path: PathBuf,
    max_level: Option<u32>,
    last_level: Option<u32>,
}

impl TecModuleSensor {
    pub fn new(desc: &EntityDescriptor, fault_threshold: u32, recovery_threshold: u32) -> Self {
        let tec = desc.tec.unwrap_or(TecConfig {
            target: desc.thresholds.warning,
            band: (desc.thresholds.critical - desc.thresholds.warning).max(1),
            max_level: None,
        });
        let module = ModuleSensor::new(desc, fault_threshold, recovery_threshold);
        let level_path = module.core().attr(attr::COOLING_LEVEL);
        Self {
            module,
            tec,
            level_path,
            max_level: None,
            last_level: None,
        }
    }

    /// Last cooling level written to the module
    pub fn cooling_level(&self) -> Option<u32> {
        self.last_level
    }

    fn resolve_max_level(&mut self, ctx: &PollContext<'_>) -> u32 {
        if let Some(max) = self.max_level {
            return max;
        }
        let path = self.module.core().attr(attr::COOLING_LEVEL_MAX);
        let max = ctx
            .io
            .read_int(&path)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .or(self.tec.max_level)
            .unwrap_or(DEFAULT_MAX_LEVEL);
        self.max_level = Some(max);
        max
    }

    /// Write the cooling level for `temperature`
    fn drive(&mut self, ctx: &PollContext<'_>, temperature: MilliCelsius) -> Result<()> {
        let max_level = self.resolve_max_level(ctx);
        let level = tec_level(&self.tec, max_level, temperature);
        if self.last_level == Some(level) {
            return Ok(());
        }
        match ctx.io.write_int(&self.level_path, i64::from(level)) {
            Ok(()) => {
                debug!(
                    sensor = %self.module.core().name(),
                    level,
                    max_level,
                    temperature,
                    "TEC cooling level set"
                );
                self.last_level = Some(level);
                Ok(())
            }
            Err(e) => {
                warn!(sensor = %self.module.core().name(), error = %e, "Failed to set TEC cooling level");
                Err(e)
            }
        }
    }
}

/// Cooling level for a temperature, proportional within the band
pub fn tec_level(tec: &TecConfig, max_level: u32, temperature: MilliCelsius) -> u32 {
    let band = tec.band.max(1);
    let over = (temperature - tec.target).clamp(0, band);
    ((over * i64::from(max_level)) / band) as u32
}

impl Sensor for TecModuleSensor {
    fn core(&self) -> &SensorCore {
        self.module.core()
    }

    /// One outcome per poll: a failed cooling-level write counts as a failed
    /// read and the last good temperature is kept.
    fn poll(&mut self, ctx: &PollContext<'_>) -> Reading {
        match self.module.probe_presence(ctx) {
            Ok(true) => {
                let sample = match self.module.sample(ctx) {
                    Ok(value) if value != 0 && value < self.module.core().thresholds().fault => {
                        self.drive(ctx, value).map(|()| value)
                    }
                    other => other,
                };
                self.module.record_sample(sample)
            }
            Ok(false) => {
                self.max_level = None;
                self.last_level = None;
                self.module.mark_absent()
            }
            Err(e) => self.module.core_mut().record_failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorKind;
    use crate::sensor::SensorState;
    use crate::hw::{SysfsGateway, SysfsIo};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn ctx(io: &dyn SysfsIo) -> PollContext<'_> {
        PollContext { io, commanded: None, now: Instant::now() }
    }

    fn write(dir: &Path, rel: &str, value: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value).unwrap();
    }

    #[test]
    fn test_tec_level_is_proportional_and_clamped() {
        let tec = TecConfig { target: 50_000, band: 20_000, max_level: None };
        assert_eq!(tec_level(&tec, 100, 40_000), 0);
        assert_eq!(tec_level(&tec, 100, 50_000), 0);
        assert_eq!(tec_level(&tec, 100, 60_000), 50);
        assert_eq!(tec_level(&tec, 100, 65_000), 75);
        assert_eq!(tec_level(&tec, 100, 90_000), 100);
        assert_eq!(tec_level(&tec, 960, 55_000), 240);
    }

    #[test]
    fn test_poll_writes_cooling_level() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "60000");
        write(dir.path(), attr::COOLING_LEVEL_MAX, "200");

        let mut desc = crate::sensor::testing::descriptor("tec1", SensorKind::TecModuleSensor, dir.path());
        desc.tec = Some(TecConfig { target: 50_000, band: 20_000, max_level: None });
        let mut s = TecModuleSensor::new(&desc, 3, 3);
        let io = SysfsGateway::new()
            .with_read_timeout(None)
            .with_retry_delay(Duration::ZERO);

        let reading = s.poll(&ctx(&io));
        assert!(reading.ok);
        assert_eq!(s.cooling_level(), Some(100));
        let written = fs::read_to_string(dir.path().join(attr::COOLING_LEVEL)).unwrap();
        assert_eq!(written, "100");
    }

    #[test]
    fn test_failed_level_write_counts_once_per_poll() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "60000");
        write(dir.path(), attr::COOLING_LEVEL_MAX, "100");
        // A directory in place of the attribute makes every write fail
        fs::create_dir_all(dir.path().join(attr::COOLING_LEVEL)).unwrap();

        let desc = crate::sensor::testing::descriptor("tec1", SensorKind::TecModuleSensor, dir.path());
        let mut s = TecModuleSensor::new(&desc, 2, 1);
        let io = SysfsGateway::new()
            .with_read_timeout(None)
            .with_retry_delay(Duration::ZERO);

        let reading = s.poll(&ctx(&io));
        assert!(!reading.ok);
        assert_eq!(s.core().fault_counter().failures(), 1);
        assert_ne!(s.core().state(), SensorState::Fault);
        assert_eq!(s.cooling_level(), None);

        s.poll(&ctx(&io));
        assert_eq!(s.core().fault_counter().failures(), 2);
        assert_eq!(s.core().state(), SensorState::Fault);
    }

    #[test]
    fn test_replugged_module_reloads_thresholds() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_INPUT, "40000");
        write(dir.path(), attr::TEMP_CRIT, "75000");

        let desc = crate::sensor::testing::descriptor("tec1", SensorKind::TecModuleSensor, dir.path());
        let mut s = TecModuleSensor::new(&desc, 3, 3);
        let io = SysfsGateway::new()
            .with_read_timeout(None)
            .with_retry_delay(Duration::ZERO);

        s.poll(&ctx(&io));
        assert_eq!(s.core().thresholds().critical, 75_000);

        write(dir.path(), "present", "0");
        let reading = s.poll(&ctx(&io));
        assert!(!reading.present);
        assert_eq!(s.core().thresholds().critical, 80_000);

        // A different module goes into the cage
        write(dir.path(), "present", "1");
        write(dir.path(), attr::TEMP_CRIT, "85000");
        s.poll(&ctx(&io));
        assert_eq!(s.core().thresholds().critical, 85_000);
    }

    #[test]
    fn test_default_band_from_thresholds() {
        let desc = crate::sensor::testing::descriptor("tec1", SensorKind::TecModuleSensor, Path::new("/x"));
        let s = TecModuleSensor::new(&desc, 3, 3);
        assert_eq!(s.tec.target, 70_000);
        assert_eq!(s.tec.band, 10_000);
    }
}
