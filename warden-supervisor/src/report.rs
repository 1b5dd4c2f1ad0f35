//! Run outcome and summary report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{EvaluatorSnapshot, RunId};

use crate::SupervisorError;

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RunOutcome {
    /// The stopping criteria fired.
    Satisfied,
    /// The engine exited cleanly before the criteria fired.
    Exhausted,
    /// The engine exited with an error before the criteria fired, most likely
    /// because it found a crash. `exit_code` is `None` when it was killed by
    /// a signal.
    Failure { exit_code: Option<i32> },
    /// The caller asked the supervisor to stop.
    Interrupted,
}

impl RunOutcome {
    /// Classify an engine that exited on its own.
    #[must_use]
    pub fn at_exit(exit_code: Option<i32>, criteria_satisfied: bool) -> Self {
        match (exit_code, criteria_satisfied) {
            (_, true) => RunOutcome::Satisfied,
            (Some(0), false) => RunOutcome::Exhausted,
            (code, false) => RunOutcome::Failure { exit_code: code },
        }
    }

    /// `true` for outcomes that should not fail a CI job.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Satisfied | RunOutcome::Exhausted)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Satisfied => f.write_str("satisfied"),
            RunOutcome::Exhausted => f.write_str("exhausted"),
            RunOutcome::Failure { exit_code: Some(code) } => write!(f, "failure (exit code {code})"),
            RunOutcome::Failure { exit_code: None } => f.write_str("failure (killed by signal)"),
            RunOutcome::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Record of one supervised run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RunReport {
    pub run_id: RunId,
    pub fuzzer: String,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Lines received on the engine's progress pipe.
    pub lines_seen: u64,
    /// Lines that parsed into progress events.
    pub events_seen: u64,
    /// 1-based line number after which the criteria fired.
    pub stop_line: Option<u64>,
    /// Evaluator state when the run ended.
    pub evaluator: EvaluatorSnapshot,
    /// Tail of the engine pipe that is not parsed for progress: stderr for
    /// launchers that report on stdout, stdout for a bare libFuzzer binary.
    pub side_output: String,
    /// Bytes of side output discarded to keep the tail bounded.
    pub side_output_dropped: u64,
}

impl RunReport {
    /// One-line human summary naming the fuzzer and outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.outcome {
            RunOutcome::Satisfied => format!("Fuzzer {} satisfied criteria", self.fuzzer),
            RunOutcome::Exhausted => {
                format!("Fuzzer {} exited cleanly before satisfying criteria", self.fuzzer)
            }
            RunOutcome::Failure { .. } => format!(
                "Fuzzer {} stopped without satisfying criteria: {}",
                self.fuzzer, self.outcome
            ),
            RunOutcome::Interrupted => format!("Fuzzer {} interrupted", self.fuzzer),
        }
    }

    /// Convert a failed run into an error.
    ///
    /// # Errors
    /// Returns [`SupervisorError::EngineFailed`] for [`RunOutcome::Failure`].
    pub fn into_result(self) -> Result<Self, SupervisorError> {
        match self.outcome {
            RunOutcome::Failure { exit_code } => {
                Err(SupervisorError::EngineFailed { fuzzer: self.fuzzer, exit_code })
            }
            _ => Ok(self),
        }
    }
}
