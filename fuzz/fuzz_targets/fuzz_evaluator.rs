//! Fuzz target: stopping-criteria evaluator fed with arbitrary output.
//!
//! Splits the input into lines, runs every line through the parser and the
//! evaluator, and checks the baseline never moves once set.
#![no_main]

use std::time::{Duration, Instant};

use libfuzzer_sys::fuzz_target;
use warden_core::{parse_line, Evaluator, StopCriteria};

fuzz_target!(|data: &[u8]| {
    let Some((&flag, rest)) = data.split_first() else {
        return;
    };
    let criteria = StopCriteria::new(flag & 1 == 1)
        .with_min_iterations(u64::from(flag >> 1))
        .with_stagnation(Duration::ZERO);

    let start = Instant::now();
    let mut evaluator = Evaluator::starting_at(criteria, start);
    let mut baseline = None;

    for (i, line) in String::from_utf8_lossy(rest).lines().enumerate() {
        let Ok(Some(event)) = parse_line(line) else {
            continue;
        };
        let now = start + Duration::from_millis(i as u64);
        evaluator.update_at(&event, now);

        let state = evaluator.state();
        if state.baseline_established() {
            let current = (state.baseline_coverage, state.baseline_features);
            assert_eq!(*baseline.get_or_insert(current), current, "baseline moved");
        }

        // Overflow-sized metrics must not panic.
        let _ = evaluator.should_stop_at(now);
        let snapshot = evaluator.snapshot_at(now);
        serde_json::to_string(&snapshot).expect("snapshot serialization must not fail");
    }
});
