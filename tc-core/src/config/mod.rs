//! Platform configuration
//!
//! Types describing sensors and PWM zones, the JSON loader and validation.

mod loader;
mod types;
mod validation;

pub use loader::{load_config, load_hot_params, parse_config, read_dmi_sku};
pub use types::{
    Breakpoints, ConfigFile, EntityDescriptor, HotParams, SensorKind, SkuConfig, StrategyKind,
    SystemConfig, TableConfig, TecConfig, Thresholds, ZoneConfig, ZoneTuning,
};
pub use validation::{check_dpu_index, validate_config};
