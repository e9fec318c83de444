//! Hardware access
//!
//! The sysfs gateway is the only code in the crate that touches attribute files.

pub mod sysfs;

pub use sysfs::{parse_int, SysfsGateway, SysfsIo};

#[cfg(test)]
pub use sysfs::MockSysfsIo;
