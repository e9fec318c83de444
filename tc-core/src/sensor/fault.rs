//! Consecutive-failure tracking
//!
//! A sensor enters `Fault` after `fault_threshold` failed reads in a row and
//! leaves it only after `recovery_threshold` good reads in a row, so marginal
//! hardware does not flap between states.

/// Health as seen by the fault counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    Ok,
    Fault,
}

/// Per-entity failure counter, owned by its sensor
#[derive(Debug, Clone)]
pub struct FaultCounter {
    failures: u32,
    successes: u32,
    fault_threshold: u32,
    recovery_threshold: u32,
    state: FaultState,
}

impl FaultCounter {
    pub fn new(fault_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            failures: 0,
            successes: 0,
            fault_threshold: fault_threshold.max(1),
            recovery_threshold: recovery_threshold.max(1),
            state: FaultState::Ok,
        }
    }

    /// Record the outcome of one read and return the resulting state
    pub fn record(&mut self, success: bool) -> FaultState {
        if success {
            self.failures = 0;
            if self.state == FaultState::Fault {
                self.successes += 1;
                if self.successes >= self.recovery_threshold {
                    self.state = FaultState::Ok;
                    self.successes = 0;
                }
            }
        } else {
            self.successes = 0;
            self.failures = self.failures.saturating_add(1);
            if self.failures >= self.fault_threshold {
                self.state = FaultState::Fault;
            }
        }
        self.state
    }

    /// Enter `Fault` immediately, e.g. for a stalled fan
    pub fn force_fault(&mut self) {
        self.state = FaultState::Fault;
        self.successes = 0;
    }

    pub fn state(&self) -> FaultState {
        self.state
    }

    pub fn is_fault(&self) -> bool {
        self.state == FaultState::Fault
    }

    /// Consecutive failed reads so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Consecutive good reads while in `Fault`
    pub fn recovery_progress(&self) -> u32 {
        self.successes
    }
}
