//! Error types for the supervisor crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::ProgressStream;

/// Errors that can occur while supervising a fuzzing engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// Engine launcher not found at the configured path or in `$PATH`.
    #[error("engine launcher not found at {path}")]
    EngineNotFound { path: PathBuf },

    /// The engine process could not be started.
    #[error("engine spawn failed: {0}")]
    SpawnFailed(String),

    /// The engine pipe carrying progress lines was not captured.
    #[error("engine {stream} is not piped")]
    ProgressUnavailable { stream: ProgressStream },

    /// The engine closed its output but did not exit in time.
    #[error("fuzzer {fuzzer} closed its output but did not exit within {}s", waited.as_secs())]
    FinalWaitTimeout { fuzzer: String, waited: Duration },

    /// The engine exited with an error before the stopping criteria were met.
    #[error("fuzzer {fuzzer} stopped without satisfying criteria, exit code: {}", display_code(*exit_code))]
    EngineFailed { fuzzer: String, exit_code: Option<i32> },

    /// The transcript file could not be written.
    #[error("transcript {}: {source}", path.display())]
    Transcript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn display_code(exit_code: Option<i32>) -> String {
    exit_code.map_or_else(|| "none (killed by signal)".to_owned(), |code| code.to_string())
}
