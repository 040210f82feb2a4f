//! Estimated progress for a running batch.
//!
//! The remote generator reports nothing until a call settles, so anything
//! finer than `completed / total` is a guess. [`ProgressEstimate`] ramps
//! toward the share of work currently in flight without ever claiming it,
//! and only reaches 100 once every job has settled. The value never
//! decreases.

/// Fraction of the remaining gap closed on every tick.
const RAMP_FACTOR: f64 = 0.15;

/// Highest value reachable while any job is outstanding.
const CEILING: f64 = 99.0;

#[derive(Debug, Clone, Default)]
pub struct ProgressEstimate {
    percent: f64,
}

impl ProgressEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current estimate, rounded down to a whole percent.
    pub fn percent(&self) -> u8 {
        self.percent.floor().clamp(0.0, 100.0) as u8
    }

    /// Advance the estimate while `in_flight` jobs are outstanding.
    pub fn tick(&mut self, completed: usize, in_flight: usize, total: usize) {
        if total == 0 || completed >= total {
            return;
        }
        let target = (share(completed + in_flight, total) * 100.0).min(CEILING);
        if target > self.percent {
            self.percent += (target - self.percent) * RAMP_FACTOR;
        }
    }

    /// Fold in a settled job. Snaps to 100 once `completed == total`.
    pub fn settle(&mut self, completed: usize, total: usize) {
        if total > 0 && completed >= total {
            self.percent = 100.0;
            return;
        }
        let floor = (share(completed, total) * 100.0).min(CEILING);
        if floor > self.percent {
            self.percent = floor;
        }
    }
}

fn share(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
