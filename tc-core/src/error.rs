//! Error types, re-exported from the shared error crate

pub use tc_error::{Result, ThermalError};
