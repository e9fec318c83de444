//! Constants and configuration values for the thermal control engine
//!
//! Centralizes magic numbers, paths, attribute names and configuration defaults.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default location of the platform thermal configuration
    pub const CONFIG_FILE: &str = "/etc/hw-management-thermal/tc_config.json";

    /// Log level file consulted on start and on every reload signal
    pub const LOG_LEVEL_FILE: &str = "/var/run/hw-management/config/thermal_log_level";

    /// Systemd journal socket, used to pick the log sink
    pub const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

    /// DMI/SMBIOS attributes used to resolve the platform SKU
    pub mod dmi {
        pub const PRODUCT_SKU: &str = "/sys/devices/virtual/dmi/id/product_sku";
    }

    /// SKU entry used when no specific SKU matches
    pub const DEFAULT_SKU: &str = "default";
}

/// Attribute file names relative to an entity's sysfs directory
pub mod attr {
    /// Temperature input in milli-degrees Celsius
    pub const TEMP_INPUT: &str = "temperature/input";
    /// Hardware-provided critical threshold (modules)
    pub const TEMP_CRIT: &str = "temperature/threshold_crit";
    /// Hardware-provided emergency threshold (modules)
    pub const TEMP_EMERGENCY: &str = "temperature/threshold_emergency";
    /// Presence flag: 1 present, 0 absent
    pub const PRESENT: &str = "present";
    /// Hardware fault flag: 1 faulted
    pub const FAULT: &str = "fault";
    /// ASIC/DPU readiness flag
    pub const READY: &str = "ready";
    /// TEC cooling level (written)
    pub const COOLING_LEVEL: &str = "cooling_level";
    /// TEC maximum cooling level (read)
    pub const COOLING_LEVEL_MAX: &str = "cooling_level_max";
    /// DPU CPU package temperature
    pub const DPU_CPU_TEMP: &str = "cpu_temp";
    /// DPU DDR temperature
    pub const DPU_DDR_TEMP: &str = "ddr_temp";

    /// Tachometer input file name for a 1-based index
    pub fn tacho(index: u32) -> String {
        format!("fan{}_input", index)
    }

    /// Per-entity fault report file name
    pub fn fault_report(name: &str) -> String {
        format!("{}_fault", name)
    }

    /// Sub-directory holding one DPU board
    pub fn dpu_dir(index: u32) -> String {
        format!("dpu{}", index)
    }
}

/// PWM control constants
pub mod pwm {
    /// Maximum PWM value for standard hwmon controllers
    pub const MAX_VALUE: u16 = 255;

    /// Default hysteresis band in duty-cycle units
    pub const DEFAULT_HYSTERESIS: u16 = 2;

    /// Default dwell before a lower duty cycle is accepted (milliseconds)
    pub const DEFAULT_DWELL_MS: u64 = 30_000;

    /// Default maximum decrease per committed step
    pub const DEFAULT_STEP_DOWN: u16 = 10;

    /// Suffix of the mode file next to a PWM control attribute
    pub const ENABLE_SUFFIX: &str = "_enable";

    /// PWM enable modes
    pub mod enable {
        /// Manual (software) control
        pub const MANUAL: i64 = 1;
    }
}

/// Fault counter defaults
pub mod fault {
    /// Consecutive failed reads before an entity is declared faulty
    pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

    /// Consecutive good reads before a faulty entity returns to Ok
    pub const DEFAULT_RECOVERY_THRESHOLD: u32 = 3;
}

/// Sysfs gateway tuning
pub mod io {
    use super::*;

    /// Attempts for a transient failure within one poll
    pub const DEFAULT_READ_RETRIES: u32 = 3;

    /// Pause between retry attempts
    pub const RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Default bound on a single attribute read (milliseconds)
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

    /// Largest attribute we are willing to read
    pub const MAX_ATTR_LEN: usize = 4096;
}

/// Sensor defaults
pub mod sensor {
    /// Default poll interval (milliseconds)
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

    /// Default tachometer floor below which a driven fan is stalled
    pub const DEFAULT_RPM_FLOOR: u32 = 500;
}

/// Daemon timing
pub mod timing {
    use super::*;

    /// Upper bound on a scheduler sleep so flags are re-checked regularly
    pub const MAX_IDLE: Duration = Duration::from_secs(5);
}

/// Process exit codes
pub mod exit {
    /// Clean shutdown
    pub const CLEAN: i32 = 0;
    /// Configuration could not be loaded at Init
    pub const CONFIG: i32 = 1;
    /// Unexpected failure while running
    pub const FATAL: i32 = 2;
}
