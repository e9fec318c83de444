//! Configuration data types
//!
//! The on-disk document maps platform SKUs to entity and zone descriptors.
//! `SystemConfig` is the resolved, validated view for the running SKU.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{fault, io, pwm, sensor};
use crate::error::ThermalError;

/// Every sensor variant the engine knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SensorKind {
    ThermalSensor,
    ModuleSensor,
    AsicSensor,
    TecModuleSensor,
    FanSensor,
    PsuFanSensor,
    AmbientSensor,
    DpuModule,
}

impl SensorKind {
    pub const ALL: [SensorKind; 8] = [
        SensorKind::ThermalSensor,
        SensorKind::ModuleSensor,
        SensorKind::AsicSensor,
        SensorKind::TecModuleSensor,
        SensorKind::FanSensor,
        SensorKind::PsuFanSensor,
        SensorKind::AmbientSensor,
        SensorKind::DpuModule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::ThermalSensor => "thermal_sensor",
            SensorKind::ModuleSensor => "module_sensor",
            SensorKind::AsicSensor => "asic_sensor",
            SensorKind::TecModuleSensor => "tec_module_sensor",
            SensorKind::FanSensor => "fan_sensor",
            SensorKind::PsuFanSensor => "psu_fan_sensor",
            SensorKind::AmbientSensor => "ambient_sensor",
            SensorKind::DpuModule => "dpu_module",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = ThermalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ThermalError::UnknownSensorKind(s.to_string()))
    }
}

impl TryFrom<String> for SensorKind {
    type Error = ThermalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Temperature thresholds in milli-degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: i64,
    pub critical: i64,
    pub emergency: i64,
    /// Readings at or above this are implausible and count as failed reads
    pub fault: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 75_000,
            critical: 85_000,
            emergency: 105_000,
            fault: 150_000,
        }
    }
}

/// Linear mapping used by the simple strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoints {
    /// Temperature mapped to `min_pwm`
    pub low: i64,
    /// Temperature mapped to `max_pwm`
    pub high: i64,
}

/// Thermoelectric cooler control parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TecConfig {
    /// Temperature the TEC loop regulates to
    pub target: i64,
    /// Temperature span above target mapped to full cooling
    pub band: i64,
    /// Used when the module does not expose `cooling_level_max`
    #[serde(default)]
    pub max_level: Option<u32>,
}

/// One monitored hardware entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: SensorKind,
    pub sysfs_path: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
    pub pwm_zone: String,
    /// dmin/dmax table name; defaults to the kind name
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub breakpoints: Option<Breakpoints>,
    #[serde(default)]
    pub tacho_count: Option<u32>,
    #[serde(default)]
    pub rpm_floor: Option<u32>,
    #[serde(default)]
    pub dpu_index: Option<u32>,
    #[serde(default)]
    pub tec: Option<TecConfig>,
}

impl EntityDescriptor {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Table name used by the dynamic strategy
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Breakpoints used by the simple strategy
    pub fn effective_breakpoints(&self) -> Breakpoints {
        self.breakpoints.unwrap_or(Breakpoints {
            low: self.thresholds.warning,
            high: self.thresholds.critical,
        })
    }
}

fn default_poll_interval_ms() -> u64 {
    sensor::DEFAULT_POLL_INTERVAL_MS
}

/// Aggregation algorithm for a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Simple,
    #[default]
    Dynamic,
}

/// A group of sensors sharing one duty cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub pwm_paths: Vec<PathBuf>,
    #[serde(default)]
    pub min_pwm: u16,
    #[serde(default = "default_max_pwm")]
    pub max_pwm: u16,
    /// Written on every exit path; defaults to `max_pwm`
    #[serde(default)]
    pub safe_pwm: Option<u16>,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: u16,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    #[serde(default = "default_step_down")]
    pub step_down: u16,
}

impl ZoneConfig {
    pub fn safe_pwm(&self) -> u16 {
        self.safe_pwm.unwrap_or(self.max_pwm)
    }

    pub fn tuning(&self) -> ZoneTuning {
        ZoneTuning {
            hysteresis: self.hysteresis,
            dwell: Duration::from_millis(self.dwell_ms),
            step_down: self.step_down,
        }
    }
}

fn default_max_pwm() -> u16 {
    pwm::MAX_VALUE
}

fn default_hysteresis() -> u16 {
    pwm::DEFAULT_HYSTERESIS
}

fn default_dwell_ms() -> u64 {
    pwm::DEFAULT_DWELL_MS
}

fn default_step_down() -> u16 {
    pwm::DEFAULT_STEP_DOWN
}

/// Zone parameters that may change on reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTuning {
    pub hysteresis: u16,
    pub dwell: Duration,
    pub step_down: u16,
}

/// Temperature to duty-cycle control points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Minimum duty required at a temperature
    pub dmin: Vec<(i64, u16)>,
    /// Maximum duty allowed at a temperature
    #[serde(default)]
    pub dmax: Option<Vec<(i64, u16)>>,
}

/// Everything describing one platform SKU
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkuConfig {
    #[serde(default)]
    pub dpu_count: u32,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
}

/// The configuration document as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_true")]
    pub platform_support: bool,
    #[serde(default = "default_fault_threshold")]
    pub fault_threshold: u32,
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    /// 0 disables the per-read timeout
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub fault_report_dir: Option<PathBuf>,
    #[serde(default)]
    pub skus: BTreeMap<String, SkuConfig>,
}

fn default_true() -> bool {
    true
}

fn default_fault_threshold() -> u32 {
    fault::DEFAULT_FAULT_THRESHOLD
}

fn default_recovery_threshold() -> u32 {
    fault::DEFAULT_RECOVERY_THRESHOLD
}

fn default_read_retries() -> u32 {
    io::DEFAULT_READ_RETRIES
}

fn default_read_timeout_ms() -> u64 {
    io::DEFAULT_READ_TIMEOUT_MS
}

/// Resolved configuration for the running platform
///
/// `Default` is the empty-but-valid configuration installed before anything
/// else in the daemon runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub platform_support: bool,
    pub sku: String,
    pub fault_threshold: u32,
    pub recovery_threshold: u32,
    pub read_retries: u32,
    pub read_timeout: Option<Duration>,
    pub fault_report_dir: Option<PathBuf>,
    pub dpu_count: u32,
    pub zones: Vec<ZoneConfig>,
    pub tables: BTreeMap<String, TableConfig>,
    pub entities: Vec<EntityDescriptor>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            platform_support: true,
            sku: String::new(),
            fault_threshold: fault::DEFAULT_FAULT_THRESHOLD,
            recovery_threshold: fault::DEFAULT_RECOVERY_THRESHOLD,
            read_retries: io::DEFAULT_READ_RETRIES,
            read_timeout: Some(Duration::from_millis(io::DEFAULT_READ_TIMEOUT_MS)),
            fault_report_dir: None,
            dpu_count: 0,
            zones: Vec::new(),
            tables: BTreeMap::new(),
            entities: Vec::new(),
        }
    }
}

impl SystemConfig {
    /// True for the placeholder configuration (nothing to control)
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.entities.is_empty()
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Copy of this configuration with reloaded parameters applied
    ///
    /// Zones missing from `params` keep their current tuning.
    pub fn with_hot_params(&self, params: &HotParams) -> Self {
        let mut config = self.clone();
        config.platform_support = params.platform_support;
        for zone in &mut config.zones {
            if let Some(tuning) = params.zones.get(&zone.name) {
                zone.hysteresis = tuning.hysteresis;
                zone.dwell_ms = u64::try_from(tuning.dwell.as_millis()).unwrap_or(u64::MAX);
                zone.step_down = tuning.step_down;
            }
        }
        config
    }

    /// True when `other` differs from this configuration only in reloadable parameters
    pub fn same_structure(&self, other: &SystemConfig) -> bool {
        other.with_hot_params(&self.hot_params()) == *self
    }

    /// Parameters applied by a reload signal
    pub fn hot_params(&self) -> HotParams {
        HotParams {
            platform_support: self.platform_support,
            zones: self
                .zones
                .iter()
                .map(|z| (z.name.clone(), z.tuning()))
                .collect(),
        }
    }
}

/// The reloadable subset of the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HotParams {
    pub platform_support: bool,
    pub zones: BTreeMap<String, ZoneTuning>,
}
