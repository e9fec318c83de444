//! Thermal Control Core Library
//!
//! Cooling control for network switches: polls heterogeneous temperature
//! sources, turns their readings into one fan duty cycle per zone and writes
//! it back through sysfs.
//!
//! # Features
//!
//! - **Sysfs Gateway**: Retrying attribute I/O with a bounded per-read timeout
//! - **Sensors**: ASICs, optical and TEC modules, fans, PSUs, ambient and DPU boards
//! - **Fault Counting**: Consecutive-failure thresholds with hysteresis on recovery
//! - **Regulation**: Simple breakpoints or dmin/dmax tables with dwell and rate limiting
//! - **Scheduling**: Independent poll interval per sensor
//!
//! # Module Structure
//!
//! - `hw/` - Sysfs attribute access
//! - `config/` - Configuration types, loading and validation
//! - `sensor/` - Sensor hierarchy and fault counter
//! - `engine/` - Duty tables, strategies and PWM zones
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::time::Instant;
//! use tc_core::{load_config, Scheduler, SysfsGateway};
//!
//! let config = load_config(Path::new("/etc/hw-management-thermal/tc_config.json"), None).unwrap();
//! let io = SysfsGateway::from_config(&config);
//! let mut scheduler = Scheduler::new(&config, Box::new(io), Instant::now()).unwrap();
//! scheduler.tick(Instant::now(), &AtomicBool::new(false));
//! ```

// Grouped modules
pub mod config;
pub mod engine;
pub mod hw;
pub mod sensor;

// Standalone modules
pub mod constants;
pub mod error;
pub mod scheduler;

// Re-export configuration
pub use config::{
    check_dpu_index, load_config, load_hot_params, parse_config, read_dmi_sku, validate_config,
    EntityDescriptor, HotParams, SensorKind, StrategyKind, SystemConfig, Thresholds, ZoneConfig,
    ZoneTuning,
};

// Re-export error types
pub use error::{Result, ThermalError};

// Re-export engine types
pub use engine::{DutyTable, PwmStrategy, PwmZone};

// Re-export hardware access
pub use hw::{SysfsGateway, SysfsIo};

// Re-export sensor types
pub use sensor::{
    build_sensor, Demand, FaultCounter, FaultState, FullReason, PwmRequest, Reading, Sensor,
    SensorState,
};

pub use scheduler::{Scheduler, TickReport};
