//! Process supervisor for coverage-guided fuzzing engines.
//!
//! Launches a libFuzzer engine, parses its progress output as it streams,
//! keeps a timestamped transcript, and kills the engine once its stopping
//! criteria hold. An engine that exits with an error first is reported as a
//! failure.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod error;
pub mod libfuzzer;
pub mod oss_fuzz;
pub mod report;
pub mod supervisor;
pub mod transcript;

pub use backend::{spawn_piped, EngineBackend, EngineOutput, EngineProcess, ProgressStream};
pub use config::{SupervisorConfig, DEFAULT_FINAL_WAIT};
pub use error::SupervisorError;
pub use libfuzzer::LibFuzzerBackend;
pub use oss_fuzz::OssFuzzBackend;
pub use report::{RunOutcome, RunReport};
pub use supervisor::Supervisor;
pub use transcript::Transcript;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn final_wait_timeout_display_names_fuzzer() {
        let err = SupervisorError::FinalWaitTimeout {
            fuzzer: "fz".to_owned(),
            waited: Duration::from_secs(15),
        };
        let msg = err.to_string();
        assert!(msg.contains("fz") && msg.contains("15s"), "got {msg}");
    }

    #[test]
    fn engine_failed_display_carries_exit_code() {
        let err = SupervisorError::EngineFailed { fuzzer: "fz".to_owned(), exit_code: Some(1) };
        assert_eq!(
            err.to_string(),
            "fuzzer fz stopped without satisfying criteria, exit code: 1"
        );

        let err = SupervisorError::EngineFailed { fuzzer: "fz".to_owned(), exit_code: None };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn engine_not_found_display_includes_path() {
        let err = SupervisorError::EngineNotFound { path: PathBuf::from("/opt/helper.py") };
        assert!(err.to_string().contains("/opt/helper.py"));
    }

    #[test]
    fn io_errors_convert_transparently() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: SupervisorError = io.into();
        assert!(matches!(err, SupervisorError::Io(_)));
        assert_eq!(err.to_string(), "pipe closed");
    }
}
