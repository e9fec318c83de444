//! PWM zones
//!
//! A zone owns one strategy and the PWM attributes it drives. It decides
//! whether a proposed duty cycle is worth committing to hardware:
//!
//! - the first value is always committed,
//! - afterwards only changes larger than the hysteresis band are,
//! - except when any member demands full cooling, which commits at once.
//!
//! The committed value is always within `[min_pwm, max_pwm]`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{EntityDescriptor, TableConfig, ZoneConfig, ZoneTuning};
use crate::constants::pwm;
use crate::engine::regulator::{build_strategy, PwmStrategy};
use crate::error::{Result, ThermalError};
use crate::hw::SysfsIo;
use crate::sensor::PwmRequest;

#[derive(Debug)]
pub struct PwmZone {
    name: String,
    pwm_paths: Vec<PathBuf>,
    min_pwm: u16,
    max_pwm: u16,
    safe_pwm: u16,
    hysteresis: u16,
    strategy: Box<dyn PwmStrategy>,
    committed: Option<u16>,
    last_change: Option<Instant>,
    write_pending: bool,
}

impl PwmZone {
    pub fn new(config: &ZoneConfig, strategy: Box<dyn PwmStrategy>) -> Self {
        Self {
            name: config.name.clone(),
            pwm_paths: config.pwm_paths.clone(),
            min_pwm: config.min_pwm,
            max_pwm: config.max_pwm,
            safe_pwm: {
                let floor = config.min_pwm.max(1);
                config.safe_pwm().clamp(floor, config.max_pwm.max(floor))
            },
            hysteresis: config.hysteresis,
            strategy,
            committed: None,
            last_change: None,
            write_pending: false,
        }
    }

    /// Zone with the configured strategy over `members`
    pub fn from_config(
        config: &ZoneConfig,
        members: &[&EntityDescriptor],
        tables: &BTreeMap<String, TableConfig>,
    ) -> Result<Self> {
        let strategy = build_strategy(config, members, tables)?;
        Ok(Self::new(config, strategy))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duty cycle last written to hardware
    pub fn committed(&self) -> Option<u16> {
        self.committed
    }

    pub fn last_change(&self) -> Option<Instant> {
        self.last_change
    }

    pub fn bounds(&self) -> (u16, u16) {
        (self.min_pwm, self.max_pwm)
    }

    pub fn safe_pwm(&self) -> u16 {
        self.safe_pwm
    }

    /// When the strategy needs another aggregation without new readings
    pub fn next_deadline(&self) -> Option<Instant> {
        self.strategy.next_deadline()
    }

    /// A previous write failed and should be retried
    pub fn write_pending(&self) -> bool {
        self.write_pending
    }

    /// Aggregate member requests and commit the result if the rule allows
    ///
    /// Returns the newly committed duty cycle, if any.
    pub fn update(&mut self, requests: &[PwmRequest<'_>], io: &dyn SysfsIo, now: Instant) -> Option<u16> {
        let forced = requests.iter().any(PwmRequest::is_override);
        let proposed = self
            .strategy
            .aggregate(requests, self.committed, now)
            .clamp(self.min_pwm, self.max_pwm);

        let commit = match self.committed {
            None => true,
            Some(current) if current == proposed => self.write_pending,
            Some(current) => {
                forced || self.write_pending || proposed.abs_diff(current) > self.hysteresis
            }
        };
        if !commit {
            return None;
        }

        if self.committed.is_none() {
            self.enable_manual(io);
        }

        match self.write_all(io, proposed) {
            Ok(()) => {
                if forced && proposed != self.committed.unwrap_or(0) {
                    info!(zone = %self.name, duty = proposed, "Full cooling demanded");
                } else {
                    debug!(
                        zone = %self.name,
                        from = ?self.committed,
                        to = proposed,
                        strategy = self.strategy.name(),
                        "Duty cycle committed"
                    );
                }
                self.committed = Some(proposed);
                self.last_change = Some(now);
                self.write_pending = false;
                Some(proposed)
            }
            Err(e) => {
                warn!(zone = %self.name, duty = proposed, error = %e, "Failed to write duty cycle");
                self.write_pending = true;
                None
            }
        }
    }

    /// Write the conservative shutdown duty cycle to every PWM attribute
    ///
    /// All attributes are attempted; the first error is returned.
    pub fn apply_safe(&mut self, io: &dyn SysfsIo) -> Result<()> {
        let result = self.write_all(io, self.safe_pwm);
        if result.is_ok() {
            self.committed = Some(self.safe_pwm);
        }
        info!(zone = %self.name, duty = self.safe_pwm, ok = result.is_ok(), "Safe duty cycle applied");
        result
    }

    /// Apply reloaded tuning to the zone and its strategy
    pub fn apply_hot(&mut self, tuning: &ZoneTuning) {
        if self.hysteresis != tuning.hysteresis {
            info!(zone = %self.name, from = self.hysteresis, to = tuning.hysteresis, "Hysteresis changed");
        }
        self.hysteresis = tuning.hysteresis;
        self.strategy.apply_hot(tuning);
    }

    fn write_all(&self, io: &dyn SysfsIo, duty: u16) -> Result<()> {
        let mut first_err: Option<ThermalError> = None;
        for path in &self.pwm_paths {
            if let Err(e) = io.write_int(path, i64::from(duty)) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Put every controller that has a mode file into manual mode
    fn enable_manual(&self, io: &dyn SysfsIo) {
        for path in &self.pwm_paths {
            let mut name = OsString::from(path.as_os_str());
            name.push(pwm::ENABLE_SUFFIX);
            let enable = PathBuf::from(name);
            if !io.probe(&enable, Duration::ZERO) {
                continue;
            }
            if let Err(e) = io.write_int(&enable, pwm::enable::MANUAL) {
                warn!(zone = %self.name, path = %enable.display(), error = %e, "Failed to enable manual PWM control");
            }
        }
    }
}
