//! Configuration validation
//!
//! Every rule here is checked once at load time. A configuration that passes
//! can be turned into a sensor graph without further fallible lookups.

use std::collections::HashSet;

use crate::config::types::{
    EntityDescriptor, SensorKind, StrategyKind, SystemConfig, TableConfig, ZoneConfig,
};
use crate::error::{Result, ThermalError};

/// Validate a resolved configuration
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    if config.fault_threshold == 0 {
        return Err(ThermalError::invalid_config("fault_threshold", "must be at least 1"));
    }
    if config.recovery_threshold == 0 {
        return Err(ThermalError::invalid_config("recovery_threshold", "must be at least 1"));
    }

    let mut zone_names = HashSet::new();
    for zone in &config.zones {
        if !zone_names.insert(zone.name.as_str()) {
            return Err(ThermalError::invalid_config(
                format!("zones.{}", zone.name),
                "duplicate zone name",
            ));
        }
        validate_zone(zone)?;
    }

    for (name, table) in &config.tables {
        validate_table(name, table)?;
    }

    let mut entity_names = HashSet::new();
    for entity in &config.entities {
        if !entity_names.insert(entity.name.as_str()) {
            return Err(ThermalError::invalid_config(
                format!("entities.{}", entity.name),
                "duplicate entity name",
            ));
        }
        let zone = config.zone(&entity.pwm_zone).ok_or_else(|| ThermalError::UnknownZone {
            entity: entity.name.clone(),
            zone: entity.pwm_zone.clone(),
        })?;
        validate_entity(entity, config)?;

        if zone.strategy == StrategyKind::Dynamic {
            let table = entity.table_name();
            match config.tables.get(table) {
                Some(t) => validate_table_range(table, t, zone)?,
                None => {
                    return Err(ThermalError::invalid_config(
                        format!("entities.{}.table", entity.name),
                        format!("table '{}' not defined", table),
                    ))
                }
            }
        }
    }

    Ok(())
}

fn validate_zone(zone: &ZoneConfig) -> Result<()> {
    let field = |f: &str| format!("zones.{}.{}", zone.name, f);

    if zone.min_pwm >= zone.max_pwm {
        return Err(ThermalError::invalid_config(
            field("min_pwm"),
            format!("min_pwm {} must be below max_pwm {}", zone.min_pwm, zone.max_pwm),
        ));
    }

    let safe = zone.safe_pwm();
    if safe == 0 || safe < zone.min_pwm || safe > zone.max_pwm {
        return Err(ThermalError::invalid_config(
            field("safe_pwm"),
            format!(
                "safe_pwm {} must be non-zero and within [{}, {}]",
                safe, zone.min_pwm, zone.max_pwm
            ),
        ));
    }

    if zone.hysteresis >= zone.max_pwm - zone.min_pwm {
        return Err(ThermalError::invalid_config(
            field("hysteresis"),
            "hysteresis band must be narrower than the duty range",
        ));
    }

    if zone.strategy == StrategyKind::Dynamic && zone.step_down <= zone.hysteresis {
        return Err(ThermalError::invalid_config(
            field("step_down"),
            format!(
                "step_down {} must exceed hysteresis {}",
                zone.step_down, zone.hysteresis
            ),
        ));
    }

    Ok(())
}

fn validate_points(name: &str, column: &str, points: &[(i64, u16)]) -> Result<()> {
    if points.is_empty() {
        return Err(ThermalError::invalid_config(
            format!("tables.{}.{}", name, column),
            "table has no control points",
        ));
    }
    if points.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(ThermalError::invalid_config(
            format!("tables.{}.{}", name, column),
            "temperatures must be strictly increasing",
        ));
    }
    Ok(())
}

fn validate_table(name: &str, table: &TableConfig) -> Result<()> {
    validate_points(name, "dmin", &table.dmin)?;
    if let Some(dmax) = &table.dmax {
        validate_points(name, "dmax", dmax)?;
    }
    Ok(())
}

fn validate_table_range(name: &str, table: &TableConfig, zone: &ZoneConfig) -> Result<()> {
    let all = table.dmin.iter().chain(table.dmax.iter().flatten());
    for &(_, duty) in all {
        if duty < zone.min_pwm || duty > zone.max_pwm {
            return Err(ThermalError::invalid_config(
                format!("tables.{}", name),
                format!(
                    "duty {} outside zone '{}' range [{}, {}]",
                    duty, zone.name, zone.min_pwm, zone.max_pwm
                ),
            ));
        }
    }
    Ok(())
}

fn validate_entity(entity: &EntityDescriptor, config: &SystemConfig) -> Result<()> {
    let field = |f: &str| format!("entities.{}.{}", entity.name, f);

    if entity.name.is_empty() {
        return Err(ThermalError::invalid_config("entities.name", "name must not be empty"));
    }
    if entity.poll_interval_ms == 0 {
        return Err(ThermalError::invalid_config(
            field("poll_interval_ms"),
            "poll interval must be non-zero",
        ));
    }

    let t = &entity.thresholds;
    if !(t.warning <= t.critical && t.critical <= t.emergency && t.emergency <= t.fault) {
        return Err(ThermalError::invalid_config(
            field("thresholds"),
            "expected warning <= critical <= emergency <= fault",
        ));
    }

    let bp = entity.effective_breakpoints();
    if bp.low >= bp.high {
        return Err(ThermalError::invalid_config(
            field("breakpoints"),
            "low breakpoint must be below high breakpoint",
        ));
    }

    match entity.kind {
        SensorKind::FanSensor | SensorKind::PsuFanSensor => {
            if entity.tacho_count == Some(0) {
                return Err(ThermalError::invalid_config(
                    field("tacho_count"),
                    "fan entities need at least one tachometer",
                ));
            }
        }
        SensorKind::DpuModule => {
            let index = entity.dpu_index.ok_or_else(|| {
                ThermalError::invalid_config(field("dpu_index"), "DPU entities need an index")
            })?;
            check_dpu_index(index, config.dpu_count)?;
        }
        SensorKind::TecModuleSensor => {
            if let Some(tec) = &entity.tec {
                if tec.band <= 0 {
                    return Err(ThermalError::invalid_config(
                        field("tec.band"),
                        "TEC band must be positive",
                    ));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// Range-check a 1-based DPU index
pub fn check_dpu_index(index: u32, count: u32) -> Result<()> {
    if index == 0 || index > count {
        return Err(ThermalError::DpuIndexOutOfRange { index, count });
    }
    Ok(())
}
