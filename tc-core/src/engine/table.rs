//! Duty-cycle lookup tables
//!
//! Integer interpolation between temperature control points. Below the
//! first point the first duty applies, above the last point the last duty.

use crate::config::{Breakpoints, TableConfig};
use crate::sensor::MilliCelsius;

/// A `dmin` table optionally capped by a `dmax` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyTable {
    dmin: Vec<(MilliCelsius, u16)>,
    dmax: Option<Vec<(MilliCelsius, u16)>>,
}

impl DutyTable {
    pub fn new(dmin: Vec<(MilliCelsius, u16)>, dmax: Option<Vec<(MilliCelsius, u16)>>) -> Self {
        Self { dmin, dmax }
    }

    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(config.dmin.clone(), config.dmax.clone())
    }

    /// Duty cycle required at `temp`
    pub fn duty(&self, temp: MilliCelsius) -> u16 {
        let floor = interpolate(&self.dmin, temp);
        match &self.dmax {
            Some(cap) => floor.min(interpolate(cap, temp)),
            None => floor,
        }
    }
}

/// Interpolate between the two control points bracketing `temp`
///
/// Points must be sorted by temperature. An empty table yields 0.
pub fn interpolate(points: &[(MilliCelsius, u16)], temp: MilliCelsius) -> u16 {
    let (Some(&(first_t, first_d)), Some(&(last_t, last_d))) = (points.first(), points.last())
    else {
        return 0;
    };
    if temp <= first_t {
        return first_d;
    }
    if temp >= last_t {
        return last_d;
    }

    for window in points.windows(2) {
        let (t0, d0) = window[0];
        let (t1, d1) = window[1];
        if temp >= t0 && temp <= t1 {
            let span = t1 - t0;
            if span == 0 {
                return d0;
            }
            let delta = (temp - t0) * (i64::from(d1) - i64::from(d0)) / span;
            return (i64::from(d0) + delta) as u16;
        }
    }
    last_d
}

/// Linear mapping `low -> min_duty`, `high -> max_duty`, clamped at both ends
pub fn linear(bp: &Breakpoints, min_duty: u16, max_duty: u16, temp: MilliCelsius) -> u16 {
    interpolate(&[(bp.low, min_duty), (bp.high, max_duty)], temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<(MilliCelsius, u16)> {
        vec![(30_000, 60), (50_000, 120), (70_000, 255)]
    }

    #[test]
    fn test_interpolation_at_points() {
        let t = table();
        assert_eq!(interpolate(&t, 30_000), 60);
        assert_eq!(interpolate(&t, 50_000), 120);
        assert_eq!(interpolate(&t, 70_000), 255);
    }

    #[test]
    fn test_interpolation_between_points_truncates() {
        let t = table();
        assert_eq!(interpolate(&t, 40_000), 90);
        // 120 + 135 * 1000 / 20000 = 126.75
        assert_eq!(interpolate(&t, 51_000), 126);
    }

    #[test]
    fn test_clamped_outside_table() {
        let t = table();
        assert_eq!(interpolate(&t, -10_000), 60);
        assert_eq!(interpolate(&t, 120_000), 255);
        assert_eq!(interpolate(&[], 50_000), 0);
    }

    #[test]
    fn test_dmax_caps_dmin() {
        let table = DutyTable::new(table(), Some(vec![(0, 200)]));
        assert_eq!(table.duty(40_000), 90);
        assert_eq!(table.duty(70_000), 200);
    }

    #[test]
    fn test_linear_breakpoints() {
        let bp = Breakpoints { low: 40_000, high: 80_000 };
        assert_eq!(linear(&bp, 50, 250, 30_000), 50);
        assert_eq!(linear(&bp, 50, 250, 60_000), 150);
        assert_eq!(linear(&bp, 50, 250, 90_000), 250);
    }
}
