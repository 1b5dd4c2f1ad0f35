//! Stopping-criteria policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of executed inputs that must be exceeded before stopping.
pub const DEFAULT_MIN_ITERATIONS: u64 = 100_000;

/// Default time without a new corpus entry that must elapse before stopping.
pub const DEFAULT_STAGNATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Thresholds deciding when a fuzzing run has explored enough.
///
/// All three clauses must hold at once:
/// - exploration: coverage or features at least doubled since `INITED`
///   (only when `require_doubled_coverage` is set, otherwise always true)
/// - volume: more than `min_iterations` inputs executed
/// - stagnation: no `NEW` event for longer than `stagnation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct StopCriteria {
    /// Makes the doubling clause mandatory.
    pub require_doubled_coverage: bool,
    /// Iteration count that must be strictly exceeded.
    pub min_iterations: u64,
    /// Quiet period that must be strictly exceeded.
    pub stagnation: Duration,
}

impl StopCriteria {
    /// Default thresholds with the doubling clause switched as requested.
    #[must_use]
    pub const fn new(require_doubled_coverage: bool) -> Self {
        Self {
            require_doubled_coverage,
            min_iterations: DEFAULT_MIN_ITERATIONS,
            stagnation: DEFAULT_STAGNATION,
        }
    }

    /// Overrides the iteration threshold.
    #[must_use]
    pub const fn with_min_iterations(mut self, min_iterations: u64) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Overrides the stagnation window.
    #[must_use]
    pub const fn with_stagnation(mut self, stagnation: Duration) -> Self {
        self.stagnation = stagnation;
        self
    }
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self::new(false)
    }
}
