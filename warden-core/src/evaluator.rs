//! Stateful stopping-criteria evaluator.
//!
//! One [`Evaluator`] lives for exactly one fuzzing run. The supervisor feeds
//! it every parsed [`Event`] in emission order and asks [`Evaluator::should_stop`]
//! after each one.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::criteria::StopCriteria;
use crate::event::{Event, EventKind};

/// Mutable run statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct EvaluatorState {
    /// Coverage reported by the first `INITED` event.
    pub baseline_coverage: Option<u64>,
    /// Features reported by the first `INITED` event.
    pub baseline_features: Option<u64>,
    /// Most recent coverage seen on any event.
    pub latest_coverage: Option<u64>,
    /// Most recent feature count seen on any event.
    pub latest_features: Option<u64>,
    /// Iteration count of the most recent event.
    pub latest_iteration_count: u64,
    /// Time of the most recent `NEW` event, or of run start.
    pub last_discovery: Instant,
    baseline_established: bool,
}

impl EvaluatorState {
    fn new(start: Instant) -> Self {
        Self {
            baseline_coverage: None,
            baseline_features: None,
            latest_coverage: None,
            latest_features: None,
            latest_iteration_count: 0,
            last_discovery: start,
            baseline_established: false,
        }
    }

    /// Whether an `INITED` event has already fixed the baseline.
    #[must_use]
    pub fn baseline_established(&self) -> bool {
        self.baseline_established
    }
}

/// Point-in-time copy of the evaluator, suitable for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EvaluatorSnapshot {
    pub baseline_coverage: Option<u64>,
    pub baseline_features: Option<u64>,
    pub latest_coverage: Option<u64>,
    pub latest_features: Option<u64>,
    pub latest_iteration_count: u64,
    /// Time elapsed since the last `NEW` event.
    pub since_last_discovery: Duration,
    pub exploration_met: bool,
    pub volume_met: bool,
    pub stagnation_met: bool,
}

/// Tracks run progress and decides when fuzzing has gone on long enough.
#[derive(Debug, Clone)]
pub struct Evaluator {
    criteria: StopCriteria,
    state: EvaluatorState,
}

impl Evaluator {
    /// Creates an evaluator whose run starts now.
    #[must_use]
    pub fn new(criteria: StopCriteria) -> Self {
        Self::starting_at(criteria, Instant::now())
    }

    /// Creates an evaluator whose run started at `start`.
    #[must_use]
    pub fn starting_at(criteria: StopCriteria, start: Instant) -> Self {
        Self { criteria, state: EvaluatorState::new(start) }
    }

    /// Current statistics.
    #[must_use]
    pub fn state(&self) -> &EvaluatorState {
        &self.state
    }

    /// Records an event observed now.
    pub fn update(&mut self, event: &Event) {
        self.update_at(event, Instant::now());
    }

    /// Records an event observed at `now`.
    ///
    /// Metrics update `latest_*` regardless of kind. `NEW` resets the
    /// discovery clock. Only the first `INITED` sets the baseline.
    pub fn update_at(&mut self, event: &Event, now: Instant) {
        let state = &mut self.state;
        state.latest_iteration_count = event.iteration_count;
        if let Some(coverage) = event.coverage {
            state.latest_coverage = Some(coverage);
        }
        if let Some(features) = event.features {
            state.latest_features = Some(features);
        }

        match event.kind {
            EventKind::Inited if !state.baseline_established => {
                state.baseline_coverage = event.coverage;
                state.baseline_features = event.features;
                state.baseline_established = true;
            }
            EventKind::NewPath => state.last_discovery = now,
            _ => {}
        }
    }

    /// Whether all stopping clauses hold now.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.should_stop_at(Instant::now())
    }

    /// Whether all stopping clauses hold at `now`.
    #[must_use]
    pub fn should_stop_at(&self, now: Instant) -> bool {
        self.exploration_met() && self.volume_met() && self.stagnation_met(now)
    }

    /// Copies the current statistics and clause results as of `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> EvaluatorSnapshot {
        let state = &self.state;
        EvaluatorSnapshot {
            baseline_coverage: state.baseline_coverage,
            baseline_features: state.baseline_features,
            latest_coverage: state.latest_coverage,
            latest_features: state.latest_features,
            latest_iteration_count: state.latest_iteration_count,
            since_last_discovery: now.saturating_duration_since(state.last_discovery),
            exploration_met: self.exploration_met(),
            volume_met: self.volume_met(),
            stagnation_met: self.stagnation_met(now),
        }
    }

    fn exploration_met(&self) -> bool {
        if !self.criteria.require_doubled_coverage {
            return true;
        }
        let state = &self.state;
        at_least_doubled(state.latest_coverage, state.baseline_coverage)
            || at_least_doubled(state.latest_features, state.baseline_features)
    }

    fn volume_met(&self) -> bool {
        self.state.latest_iteration_count > self.criteria.min_iterations
    }

    fn stagnation_met(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.state.last_discovery) > self.criteria.stagnation
    }
}

/// `latest >= 2 * baseline`, never true for a missing or zero baseline.
fn at_least_doubled(latest: Option<u64>, baseline: Option<u64>) -> bool {
    match (latest, baseline) {
        (Some(latest), Some(baseline)) if baseline > 0 => {
            baseline.checked_mul(2).is_some_and(|target| latest >= target)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::DEFAULT_MIN_ITERATIONS;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn inited(cov: u64, ft: u64) -> Event {
        Event::new(EventKind::Inited, 2, Some(cov), Some(ft))
    }

    fn pulse(n: u64, cov: u64, ft: u64) -> Event {
        Event::new(EventKind::Pulse, n, Some(cov), Some(ft))
    }

    #[test]
    fn fresh_evaluator_does_not_stop() {
        let start = Instant::now();
        let eval = Evaluator::starting_at(StopCriteria::new(false), start);
        assert!(!eval.should_stop_at(start), "nothing observed yet");
    }

    #[test]
    fn exploration_gates_volume_and_stagnation() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&inited(10, 5), start);
        eval.update_at(&Event::new(EventKind::Pulse, 200_000, None, None), start);

        let later = start + 3 * HOUR;
        let snap = eval.snapshot_at(later);
        assert!(snap.volume_met && snap.stagnation_met);
        assert!(!eval.should_stop_at(later), "coverage never doubled");
    }

    #[test]
    fn coverage_must_reach_exactly_double() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&inited(10, 100), start);
        let later = start + 3 * HOUR;

        eval.update_at(&pulse(200_000, 19, 100), start);
        assert!(!eval.should_stop_at(later), "19 < 2 * 10");

        eval.update_at(&pulse(200_001, 20, 100), start);
        assert!(eval.should_stop_at(later), "20 >= 2 * 10");
    }

    #[test]
    fn doubled_features_alone_satisfy_exploration() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&inited(10, 5), start);
        eval.update_at(&pulse(200_000, 11, 10), start);
        assert!(eval.should_stop_at(start + 3 * HOUR));
    }

    #[test]
    fn zero_or_missing_baseline_never_satisfies_exploration() {
        let start = Instant::now();
        let later = start + 3 * HOUR;

        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&inited(0, 0), start);
        eval.update_at(&pulse(200_000, 500, 500), start);
        assert!(!eval.should_stop_at(later), "0 * 2 must not count as doubled");

        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&pulse(200_000, 500, 500), start);
        assert!(!eval.should_stop_at(later), "no INITED means no baseline");
    }

    #[test]
    fn second_inited_keeps_original_baseline() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&inited(10, 5), start);
        eval.update_at(&inited(40, 50), start);

        let state = eval.state();
        assert_eq!(state.baseline_coverage, Some(10));
        assert_eq!(state.baseline_features, Some(5));
        assert_eq!(state.latest_coverage, Some(40), "latest still tracks every event");
        assert!(state.baseline_established());
    }

    #[test]
    fn inited_without_metrics_still_fixes_baseline() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
        eval.update_at(&Event::new(EventKind::Inited, 1, None, None), start);
        eval.update_at(&inited(10, 5), start);
        assert_eq!(eval.state().baseline_coverage, None);
    }

    #[test]
    fn optional_exploration_stops_on_volume_and_stagnation() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
        eval.update_at(&inited(10, 5), start);
        eval.update_at(&pulse(100_001, 10, 5), start);
        assert!(eval.should_stop_at(start + 2 * HOUR + Duration::from_secs(1)));
    }

    #[test]
    fn volume_threshold_is_strict() {
        let start = Instant::now();
        let later = start + 3 * HOUR;
        let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
        eval.update_at(&pulse(100_000, 1, 1), start);
        assert!(!eval.should_stop_at(later), "exactly 100_000 is not more than 100_000");
        eval.update_at(&pulse(100_001, 1, 1), start);
        assert!(eval.should_stop_at(later));
    }

    #[test]
    fn stagnation_threshold_is_strict() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
        eval.update_at(&pulse(200_000, 1, 1), start);
        assert!(!eval.should_stop_at(start + 2 * HOUR));
        assert!(eval.should_stop_at(start + 2 * HOUR + Duration::from_millis(1)));
    }

    #[test]
    fn new_path_resets_discovery_clock() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
        eval.update_at(&pulse(200_000, 1, 1), start);

        let discovery = start + 3 * HOUR;
        eval.update_at(&Event::new(EventKind::NewPath, 200_001, Some(2), Some(2)), discovery);
        assert!(!eval.should_stop_at(discovery + HOUR), "recent discovery");
        assert!(eval.should_stop_at(discovery + 3 * HOUR));
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let start = Instant::now();
        let criteria = StopCriteria::new(false)
            .with_min_iterations(10)
            .with_stagnation(Duration::from_secs(5));
        let mut eval = Evaluator::starting_at(criteria, start);
        eval.update_at(&pulse(11, 1, 1), start);
        assert!(!eval.should_stop_at(start + Duration::from_secs(5)));
        assert!(eval.should_stop_at(start + Duration::from_secs(6)));
    }

    #[test]
    fn metrics_absent_from_event_keep_previous_values() {
        let start = Instant::now();
        let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
        eval.update_at(&pulse(5, 12, 34), start);
        eval.update_at(&Event::new(EventKind::Done, 6, None, None), start);
        let state = eval.state();
        assert_eq!(state.latest_coverage, Some(12));
        assert_eq!(state.latest_features, Some(34));
        assert_eq!(state.latest_iteration_count, 6);
    }

    #[test]
    fn at_least_doubled_handles_overflowing_baseline() {
        assert!(!at_least_doubled(Some(u64::MAX), Some(u64::MAX)));
        assert!(at_least_doubled(Some(u64::MAX), Some(u64::MAX / 2)));
    }

    proptest::proptest! {
        #[test]
        fn proptest_baseline_is_fixed_by_first_inited(
            first in proptest::prelude::any::<(u64, u64)>(),
            rest in proptest::collection::vec(proptest::prelude::any::<(u64, u64)>(), 0..16usize),
        ) {
            let start = Instant::now();
            let mut eval = Evaluator::starting_at(StopCriteria::new(true), start);
            eval.update_at(&inited(first.0, first.1), start);
            for (cov, ft) in rest {
                eval.update_at(&inited(cov, ft), start);
            }
            proptest::prop_assert_eq!(eval.state().baseline_coverage, Some(first.0));
            proptest::prop_assert_eq!(eval.state().baseline_features, Some(first.1));
        }

        #[test]
        fn proptest_never_stops_below_volume_threshold(
            n in 0..=DEFAULT_MIN_ITERATIONS,
            cov in proptest::prelude::any::<u64>(),
        ) {
            let start = Instant::now();
            let mut eval = Evaluator::starting_at(StopCriteria::new(false), start);
            eval.update_at(&pulse(n, cov, cov), start);
            proptest::prop_assert!(!eval.should_stop_at(start + 10 * HOUR));
        }
    }
}
