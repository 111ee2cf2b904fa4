//! Per-frame bar statistics handed to decorators and fillers.

use std::time::Duration;

/// A point-in-time view of a bar's progress.
///
/// Built once per render cycle and shared by every decorator and the
/// filler of that bar, so all fragments of a line describe the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    /// Creation id of the bar.
    pub id: u64,
    /// Current progress value.
    pub current: u64,
    /// Target value. Zero means the total is not known yet.
    pub total: u64,
    /// Whether the bar has reached its total.
    pub completed: bool,
    /// Time since the bar was created.
    pub elapsed: Duration,
}

impl Statistics {
    /// Whether the bar has no known total.
    pub fn is_indeterminate(&self) -> bool {
        self.total == 0
    }

    /// Completion ratio in `0.0..=1.0`, or `None` when indeterminate.
    pub fn ratio(&self) -> Option<f64> {
        if self.is_indeterminate() {
            return None;
        }
        Some((self.current.min(self.total) as f64) / (self.total as f64))
    }

    /// Whole percentage in `0..=100`; zero when indeterminate.
    pub fn percent(&self) -> u64 {
        match self.ratio() {
            Some(ratio) => (ratio * 100.0).floor() as u64,
            None => 0,
        }
    }
}
