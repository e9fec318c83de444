//! PWM regulation engine
//!
//! Duty tables, aggregation strategies and the zones that commit their
//! output to hardware.

mod regulator;
mod table;
mod zone;

pub use regulator::{build_strategy, DynamicStrategy, PwmStrategy, SimpleStrategy};
pub use table::{interpolate, linear, DutyTable};
pub use zone::PwmZone;
