//! Sensor construction from configuration

use tracing::debug;

use crate::config::{EntityDescriptor, SensorKind, SystemConfig};
use crate::error::Result;
use crate::sensor::{DpuModule, FanSensor, ModuleSensor, Sensor, TecModuleSensor, ThermalSensor};

/// Build the sensor described by `desc`
///
/// Fails for a DPU board whose index is out of range for the SKU.
pub fn build_sensor(desc: &EntityDescriptor, config: &SystemConfig) -> Result<Box<dyn Sensor>> {
    let (fault, recovery) = (config.fault_threshold, config.recovery_threshold);
    let sensor: Box<dyn Sensor> = match desc.kind {
        SensorKind::ThermalSensor | SensorKind::AmbientSensor => {
            Box::new(ThermalSensor::new(desc, fault, recovery))
        }
        SensorKind::ModuleSensor | SensorKind::AsicSensor => {
            Box::new(ModuleSensor::new(desc, fault, recovery))
        }
        SensorKind::TecModuleSensor => Box::new(TecModuleSensor::new(desc, fault, recovery)),
        SensorKind::FanSensor | SensorKind::PsuFanSensor => {
            Box::new(FanSensor::new(desc, fault, recovery))
        }
        SensorKind::DpuModule => Box::new(DpuModule::new(desc, config.dpu_count, fault, recovery)?),
    };
    debug!(
        sensor = %desc.name,
        kind = %desc.kind,
        zone = %desc.pwm_zone,
        path = %desc.sysfs_path.display(),
        "Sensor created"
    );
    Ok(sensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThermalError;
    use crate::sensor::testing;
    use std::path::Path;

    #[test]
    fn test_builds_every_kind() {
        let mut config = SystemConfig::default();
        config.dpu_count = 1;
        for kind in SensorKind::ALL {
            let mut desc = testing::descriptor("s", kind, Path::new("/hw/s"));
            desc.dpu_index = Some(1);
            let sensor = build_sensor(&desc, &config).unwrap();
            assert_eq!(sensor.kind(), kind);
            assert_eq!(sensor.name(), "s");
        }
    }

    #[test]
    fn test_dpu_out_of_range_fails() {
        let config = SystemConfig::default();
        let mut desc = testing::descriptor("dpu1", SensorKind::DpuModule, Path::new("/hw"));
        desc.dpu_index = Some(1);
        assert!(matches!(
            build_sensor(&desc, &config),
            Err(ThermalError::DpuIndexOutOfRange { index: 1, count: 0 })
        ));
    }
}
