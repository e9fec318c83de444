//! Unified error handling for the thermal control engine
//!
//! This crate provides a single error type used across all thermal control components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::{Path, PathBuf};

/// Result type alias using ThermalError
pub type Result<T> = std::result::Result<T, ThermalError>;

/// Unified error type for all thermal control operations
#[derive(thiserror::Error, Debug)]
pub enum ThermalError {
    // ============================================================================
    // Sysfs Attribute Errors
    // ============================================================================
    #[error("Attribute not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Malformed value in {path}: '{content}'")]
    Malformed {
        path: PathBuf,
        content: String,
    },

    #[error("Transient I/O failure on {path}: {reason}")]
    Transient {
        path: PathBuf,
        reason: String,
    },

    #[error("Read of {path} timed out after {after_ms}ms")]
    Timeout {
        path: PathBuf,
        after_ms: u64,
    },

    #[error("Failed to write {path}: {reason}")]
    Write {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Unknown sensor kind: {0}")]
    UnknownSensorKind(String),

    #[error("Entity {entity} references unknown PWM zone {zone}")]
    UnknownZone {
        entity: String,
        zone: String,
    },

    #[error("DPU index {index} out of range (1..={count})")]
    DpuIndexOutOfRange {
        index: u32,
        count: u32,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ThermalError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while touching a sysfs attribute.
    ///
    /// EINTR-class failures and the errors a device returns while it is being
    /// hot-plugged are transient; everything else is permanent.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => return Self::NotFound(path),
            io::ErrorKind::PermissionDenied => return Self::PermissionDenied(path),
            io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut => {
                return Self::Transient {
                    path,
                    reason: err.to_string(),
                }
            }
            _ => {}
        }

        match err.raw_os_error() {
            Some(libc::EINTR)
            | Some(libc::EAGAIN)
            | Some(libc::EBUSY)
            | Some(libc::ENODEV)
            | Some(libc::ENXIO)
            | Some(libc::ETIMEDOUT) => Self::Transient {
                path,
                reason: err.to_string(),
            },
            Some(libc::EACCES) | Some(libc::EPERM) => Self::PermissionDenied(path),
            _ => Self::Io(err),
        }
    }

    /// Whether the failure is worth retrying within the same poll
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the failure came from configuration rather than hardware
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidConfig { .. }
                | Self::UnknownSensorKind(_)
                | Self::UnknownZone { .. }
                | Self::DpuIndexOutOfRange { .. }
                | Self::JsonParse(_)
        )
    }
}
