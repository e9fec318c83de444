//! Configuration loading
//!
//! Reads the JSON document, resolves the platform SKU and validates the result.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::types::{ConfigFile, HotParams, SensorKind, SystemConfig};
use crate::config::validation::validate_config;
use crate::constants::{io, paths};
use crate::error::{Result, ThermalError};

/// Largest configuration document accepted (1MB)
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

/// Load and validate the configuration for one SKU
///
/// When `sku` is `None` the SKU is read from DMI, falling back to the
/// `default` entry.
pub fn load_config(path: &Path, sku: Option<&str>) -> Result<SystemConfig> {
    let meta = fs::metadata(path).map_err(|e| ThermalError::from_io(path, e))?;
    if meta.len() > MAX_CONFIG_SIZE {
        return Err(ThermalError::config(format!(
            "{} is too large ({} bytes, max {})",
            path.display(),
            meta.len(),
            MAX_CONFIG_SIZE
        )));
    }

    let text = fs::read_to_string(path).map_err(|e| ThermalError::from_io(path, e))?;
    let detected;
    let sku = match sku {
        Some(s) => Some(s),
        None => {
            detected = read_dmi_sku(Path::new(paths::dmi::PRODUCT_SKU));
            detected.as_deref()
        }
    };

    let config = parse_config(&text, sku)?;
    info!(
        sku = %config.sku,
        entities = config.entities.len(),
        zones = config.zones.len(),
        "Configuration loaded from {}",
        path.display()
    );
    Ok(config)
}

/// Parse, resolve and validate a configuration document
pub fn parse_config(text: &str, sku: Option<&str>) -> Result<SystemConfig> {
    let value: Value = serde_json::from_str(text)?;
    check_sensor_kinds(&value)?;

    let file: ConfigFile = serde_json::from_value(value)?;
    let sku_name = select_sku(&file, sku)?;
    let sku_config = file
        .skus
        .get(&sku_name)
        .cloned()
        .ok_or_else(|| ThermalError::config(format!("SKU '{}' not present", sku_name)))?;

    let config = SystemConfig {
        platform_support: file.platform_support,
        sku: sku_name,
        fault_threshold: file.fault_threshold,
        recovery_threshold: file.recovery_threshold,
        read_retries: file.read_retries.max(1),
        read_timeout: match file.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        },
        fault_report_dir: file.fault_report_dir,
        dpu_count: sku_config.dpu_count,
        zones: sku_config.zones,
        tables: sku_config.tables,
        entities: sku_config.entities,
    };

    validate_config(&config)?;
    Ok(config)
}

/// Re-read only the reloadable parameters for the running configuration
///
/// The whole document is validated so that a broken edit is rejected as a
/// unit rather than half-applied. Structural edits are reported and left
/// for the next restart.
pub fn load_hot_params(path: &Path, current: &SystemConfig) -> Result<HotParams> {
    let text = fs::read_to_string(path).map_err(|e| ThermalError::from_io(path, e))?;
    let fresh = parse_config(&text, Some(&current.sku))?;
    if !current.same_structure(&fresh) {
        warn!(
            path = %path.display(),
            "Structural configuration changes need a restart, applying reloadable parameters only"
        );
    }
    Ok(fresh.hot_params())
}

/// Reject unknown sensor kinds with a dedicated error before typed parsing
fn check_sensor_kinds(value: &Value) -> Result<()> {
    let Some(skus) = value.get("skus").and_then(Value::as_object) else {
        return Ok(());
    };
    for sku in skus.values() {
        let entities = sku.get("entities").and_then(Value::as_array);
        for entity in entities.into_iter().flatten() {
            if let Some(kind) = entity.get("kind").and_then(Value::as_str) {
                kind.parse::<SensorKind>()?;
            }
        }
    }
    Ok(())
}

fn select_sku(file: &ConfigFile, requested: Option<&str>) -> Result<String> {
    if let Some(sku) = requested {
        if file.skus.contains_key(sku) {
            return Ok(sku.to_string());
        }
        debug!("SKU '{}' not in configuration, trying '{}'", sku, paths::DEFAULT_SKU);
    }
    if file.skus.contains_key(paths::DEFAULT_SKU) {
        return Ok(paths::DEFAULT_SKU.to_string());
    }
    Err(ThermalError::config(format!(
        "no configuration for SKU {:?} and no '{}' entry (available: {:?})",
        requested.unwrap_or("<unknown>"),
        paths::DEFAULT_SKU,
        file.skus.keys().collect::<Vec<_>>()
    )))
}

/// Read the platform SKU from DMI
pub fn read_dmi_sku(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let sku = content.trim();
    if sku.is_empty() || sku.len() > io::MAX_ATTR_LEN {
        None
    } else {
        Some(sku.to_string())
    }
}
