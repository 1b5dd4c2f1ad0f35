//! Engine launcher abstraction.
//!
//! Allows swapping between OSS-Fuzz's helper script, a bare libFuzzer binary,
//! or a synthetic engine in tests without changing the supervision loop.

use std::fmt;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::{SupervisorConfig, SupervisorError};

/// How long the engine's process group gets to exit after `SIGTERM`.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// The engine pipe that carries libFuzzer progress lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStream {
    /// Launchers that fold libFuzzer output into stdout, like OSS-Fuzz's helper.
    #[default]
    Stdout,
    /// A bare libFuzzer binary, which reports progress on stderr.
    Stderr,
}

impl fmt::Display for ProgressStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStream::Stdout => f.write_str("stdout"),
            ProgressStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One of the engine's output pipes.
pub type EngineOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A running fuzzing engine process.
///
/// The engine leads its own process group so that helpers and the processes
/// they start are stopped together. The child is also spawned with
/// `kill_on_drop`, so dropping this handle on an error path still kills the
/// group leader.
#[derive(Debug)]
#[non_exhaustive]
pub struct EngineProcess {
    /// The engine child process with piped stdout and stderr.
    pub process: Child,
}

impl EngineProcess {
    /// Wrap a spawned child.
    #[must_use]
    pub fn new(process: Child) -> Self {
        Self { process }
    }

    /// OS process id, if the engine has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    /// Take the progress pipe and, if captured, the other output pipe.
    ///
    /// # Errors
    /// Returns [`SupervisorError::ProgressUnavailable`] if the progress pipe
    /// was not captured or was already taken.
    pub fn take_output(
        &mut self,
        progress: ProgressStream,
    ) -> Result<(EngineOutput, Option<EngineOutput>), SupervisorError> {
        let stdout = self.process.stdout.take().map(|pipe| Box::new(pipe) as EngineOutput);
        let stderr = self.process.stderr.take().map(|pipe| Box::new(pipe) as EngineOutput);
        let (main, side) = match progress {
            ProgressStream::Stdout => (stdout, stderr),
            ProgressStream::Stderr => (stderr, stdout),
        };
        let main = main.ok_or(SupervisorError::ProgressUnavailable { stream: progress })?;
        Ok((main, side))
    }

    /// Stop the engine's process group and reap the engine.
    ///
    /// Sends `SIGTERM` first so launchers can tear down what they started
    /// (the docker client forwards it to the container), then `SIGKILL` to
    /// anything left in the group. Safe to call on an engine that already
    /// exited.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Io`] if a signal cannot be delivered to a
    /// live process or reaping fails.
    pub async fn terminate(&mut self) -> Result<(), SupervisorError> {
        let Some(pid) = self.process.id() else {
            // Already reaped.
            return Ok(());
        };

        signal_group(pid, libc::SIGTERM)?;
        if tokio::time::timeout(TERMINATE_GRACE, self.process.wait()).await.is_err() {
            tracing::warn!(pid, "engine ignored SIGTERM, killing");
        }
        signal_group(pid, libc::SIGKILL)?;

        match self.process.start_kill() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        self.process.wait().await?;
        Ok(())
    }
}

/// Send `signal` to the process group led by `pid`. A group with no members
/// left is not an error.
fn signal_group(pid: u32, signal: libc::c_int) -> Result<(), SupervisorError> {
    let pgid = libc::pid_t::try_from(pid).map_err(|_| io::Error::from(ErrorKind::InvalidInput))?;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::kill(-pgid, signal) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err.into())
    }
}

/// Fuzzing engine launcher.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Start the engine for the configured fuzz target.
    ///
    /// The returned child must have stdout and stderr piped.
    ///
    /// # Errors
    /// Returns [`SupervisorError::EngineNotFound`] if the launcher is missing.
    /// Returns [`SupervisorError::SpawnFailed`] if the process cannot be started.
    async fn spawn(&self, config: &SupervisorConfig) -> Result<EngineProcess, SupervisorError>;

    /// Check that the launcher is installed.
    ///
    /// # Errors
    /// Returns [`SupervisorError::EngineNotFound`] if the environment is not ready.
    async fn health_check(&self) -> Result<(), SupervisorError>;

    /// The pipe this launcher's progress lines arrive on.
    fn progress_stream(&self) -> ProgressStream {
        ProgressStream::Stdout
    }
}

/// Spawn `command` in a new process group with piped output, null stdin and
/// `kill_on_drop`.
///
/// # Errors
/// Maps a missing executable to [`SupervisorError::EngineNotFound`] and any
/// other spawn failure to [`SupervisorError::SpawnFailed`].
pub fn spawn_piped(command: &mut Command) -> Result<EngineProcess, SupervisorError> {
    let program = command.as_std().get_program().to_owned();
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => SupervisorError::EngineNotFound { path: program.clone().into() },
            _ => SupervisorError::SpawnFailed(format!("exec {}: {e}", program.to_string_lossy())),
        })?;
    Ok(EngineProcess::new(child))
}

/// Verify a binary exists either at the given path or in PATH.
pub(crate) fn which_binary(path: &Path) -> Result<(), SupervisorError> {
    if path.components().count() > 1 || path.is_absolute() {
        if path.exists() {
            return Ok(());
        }
        return Err(SupervisorError::EngineNotFound { path: path.to_owned() });
    }

    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).is_file()))
        .unwrap_or(false);

    if found {
        Ok(())
    } else {
        Err(SupervisorError::EngineNotFound { path: path.to_owned() })
    }
}
