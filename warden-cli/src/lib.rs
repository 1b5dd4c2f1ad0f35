//! Command-line front end for the fuzzwarden supervisor.
//!
//! Parses flags into a [`warden_supervisor::SupervisorConfig`], runs the
//! chosen engine backend, and maps the run outcome to a process exit code.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod cli;

use std::future::Future;
use std::path::Path;

use warden_supervisor::{
    EngineBackend, RunOutcome, RunReport, Supervisor, SupervisorConfig, SupervisorError,
};

/// Exit status when the run finished without finding a problem.
pub const EXIT_OK: u8 = 0;
/// Exit status when the engine failed before the criteria were met.
pub const EXIT_ENGINE_FAILED: u8 = 1;
/// Exit status when the supervisor itself could not complete the run.
pub const EXIT_SUPERVISOR_ERROR: u8 = 2;
/// Exit status after Ctrl-C, following the shell's 128 + SIGINT convention.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Process exit status for a finished run.
#[must_use]
pub fn exit_status(outcome: RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Failure { .. } => EXIT_ENGINE_FAILED,
        RunOutcome::Interrupted => EXIT_INTERRUPTED,
        _ => EXIT_OK,
    }
}

/// Health-check the backend, run the supervisor, and optionally write the
/// JSON report.
///
/// # Errors
/// Propagates [`SupervisorError`] from the health check, the run, or report
/// writing.
pub async fn supervise<B, F>(
    backend: B,
    config: SupervisorConfig,
    report_path: Option<&Path>,
    shutdown: F,
) -> Result<RunReport, SupervisorError>
where
    B: EngineBackend,
    F: Future<Output = ()>,
{
    backend.health_check().await?;
    let report = Supervisor::new(backend, config).run_until(shutdown).await?;
    if let Some(path) = report_path {
        write_report(&report, path).await?;
    }
    Ok(report)
}

/// Map a run result to the process exit status, logging supervisor errors.
#[must_use]
pub fn result_status(result: &Result<RunReport, SupervisorError>) -> u8 {
    match result {
        Ok(report) => exit_status(report.outcome),
        Err(e) => {
            tracing::error!(error = %e, "supervisor failed");
            EXIT_SUPERVISOR_ERROR
        }
    }
}

async fn write_report(report: &RunReport, path: &Path) -> Result<(), SupervisorError> {
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))?;
    tokio::fs::write(path, json).await?;
    tracing::info!(report = %path.display(), "run report written");
    Ok(())
}
