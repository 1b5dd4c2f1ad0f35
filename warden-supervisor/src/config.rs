//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::StopCriteria;

/// Default time to wait for the engine to exit after it closes stdout.
pub const DEFAULT_FINAL_WAIT: Duration = Duration::from_secs(15);

/// Everything needed to supervise one fuzzing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SupervisorConfig {
    /// Name of the fuzz target, e.g. `xrow_decode_raft_fuzzer`.
    pub fuzzer: String,

    /// File receiving the timestamped engine output.
    pub transcript_path: PathBuf,

    /// Directory where the engine stores its generated corpus.
    pub corpus_dir: PathBuf,

    /// When to stop the engine.
    pub criteria: StopCriteria,

    /// Bound on the wait for process exit after end of output.
    pub final_wait: Duration,

    /// Dictionary passed as `-dict=`, used only if the file exists.
    pub dictionary: Option<PathBuf>,

    /// Extra flags appended to the engine command line.
    pub extra_engine_args: Vec<String>,
}

impl SupervisorConfig {
    /// Create a config with default criteria and timeouts.
    ///
    /// # Arguments
    /// - `fuzzer`: fuzz target name
    /// - `transcript_path`: where the libFuzzer log is written
    /// - `corpus_dir`: where the engine stores its corpus
    #[must_use]
    pub fn new(
        fuzzer: impl Into<String>,
        transcript_path: impl Into<PathBuf>,
        corpus_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fuzzer: fuzzer.into(),
            transcript_path: transcript_path.into(),
            corpus_dir: corpus_dir.into(),
            criteria: StopCriteria::default(),
            final_wait: DEFAULT_FINAL_WAIT,
            dictionary: None,
            extra_engine_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_criteria(mut self, criteria: StopCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    #[must_use]
    pub fn with_final_wait(mut self, final_wait: Duration) -> Self {
        self.final_wait = final_wait;
        self
    }

    #[must_use]
    pub fn with_dictionary(mut self, dictionary: impl Into<PathBuf>) -> Self {
        self.dictionary = Some(dictionary.into());
        self
    }

    #[must_use]
    pub fn with_extra_engine_args(mut self, args: Vec<String>) -> Self {
        self.extra_engine_args = args;
        self
    }

    /// Flags passed straight to libFuzzer.
    ///
    /// Input reduction is disabled since it slows down both the engine and
    /// the supervisor.
    #[must_use]
    pub fn engine_flags(&self) -> Vec<String> {
        let mut flags = vec!["-reduce_inputs=0".to_owned()];
        if let Some(dict) = self.dictionary.as_ref().filter(|dict| dict.is_file()) {
            flags.push(format!("-dict={}", dict.display()));
        }
        flags.extend(self.extra_engine_args.iter().cloned());
        flags
    }
}
