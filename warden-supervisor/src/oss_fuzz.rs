//! OSS-Fuzz helper backend.
//!
//! Launches the target through `oss-fuzz/infra/helper.py run_fuzzer`, which
//! builds the docker invocation and forwards everything after `--` to
//! libFuzzer. The helper loads `<fuzzer>_corpus` from the build directory and
//! runs with address sanitizer by default.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::{spawn_piped, which_binary, EngineBackend, EngineProcess};
use crate::{SupervisorConfig, SupervisorError};

/// Default location of the OSS-Fuzz helper, relative to the project root.
pub const DEFAULT_HELPER: &str = "oss-fuzz/infra/helper.py";

/// Runs fuzz targets through OSS-Fuzz's `helper.py`.
#[derive(Debug, Clone)]
pub struct OssFuzzBackend {
    /// Python interpreter.
    python: PathBuf,

    /// Path to `helper.py`.
    helper: PathBuf,

    /// Project directory passed as `--external`.
    project_dir: PathBuf,
}

impl OssFuzzBackend {
    /// Create a backend with explicit paths.
    #[must_use]
    pub fn new(python: PathBuf, helper: PathBuf, project_dir: PathBuf) -> Self {
        Self { python, helper, project_dir }
    }

    /// `python3` from `$PATH`, the default helper location and the current
    /// directory as the external project.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PathBuf::from("python3"), PathBuf::from(DEFAULT_HELPER), PathBuf::from("."))
    }

    /// Build the command line without spawning it.
    ///
    /// `corpus_dir` should already be absolute since the helper resolves it
    /// from a different working directory.
    fn command(&self, config: &SupervisorConfig, corpus_dir: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.helper)
            .arg("run_fuzzer")
            .arg("--external")
            .arg(&self.project_dir)
            .arg("--corpus-dir")
            .arg(corpus_dir)
            .arg(&config.fuzzer)
            // Everything after this goes directly to the fuzzer.
            .arg("--")
            .args(config.engine_flags());
        cmd
    }
}

impl Default for OssFuzzBackend {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl EngineBackend for OssFuzzBackend {
    async fn spawn(&self, config: &SupervisorConfig) -> Result<EngineProcess, SupervisorError> {
        tokio::fs::create_dir_all(&config.corpus_dir).await?;
        let corpus_dir = tokio::fs::canonicalize(&config.corpus_dir).await?;

        tracing::info!(
            fuzzer = %config.fuzzer,
            helper = %self.helper.display(),
            corpus = %corpus_dir.display(),
            "spawning OSS-Fuzz helper"
        );

        spawn_piped(&mut self.command(config, &corpus_dir))
    }

    async fn health_check(&self) -> Result<(), SupervisorError> {
        which_binary(&self.python)?;
        if tokio::fs::metadata(&self.helper).await.is_err() {
            return Err(SupervisorError::EngineNotFound { path: self.helper.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::path::Path;

    use super::*;
    use crate::backend::ProgressStream;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn command_follows_helper_template() {
        let backend = OssFuzzBackend::with_defaults();
        let config = SupervisorConfig::new("xrow_fuzzer", "/tmp/log", "/tmp/corpus");
        let cmd = backend.command(&config, Path::new("/abs/corpus"));

        assert_eq!(cmd.as_std().get_program(), OsStr::new("python3"));
        assert_eq!(
            args_of(&cmd),
            vec![
                "oss-fuzz/infra/helper.py",
                "run_fuzzer",
                "--external",
                ".",
                "--corpus-dir",
                "/abs/corpus",
                "xrow_fuzzer",
                "--",
                "-reduce_inputs=0",
            ]
        );
    }

    #[test]
    fn command_appends_extra_flags_after_separator() {
        let backend = OssFuzzBackend::with_defaults();
        let config = SupervisorConfig::new("fz", "/tmp/log", "/tmp/corpus")
            .with_extra_engine_args(vec!["-max_total_time=60".to_owned()]);
        let args = args_of(&backend.command(&config, Path::new("/abs")));
        let sep = args.iter().position(|a| a == "--").unwrap_or(usize::MAX);
        let extra = args.iter().position(|a| a == "-max_total_time=60").unwrap_or(0);
        assert!(extra > sep, "engine flags must follow the -- separator");
    }

    #[tokio::test]
    async fn health_check_reports_missing_helper() {
        let backend = OssFuzzBackend::new(
            PathBuf::from("sh"),
            PathBuf::from("/nonexistent/helper.py"),
            PathBuf::from("."),
        );
        let result = backend.health_check().await;
        assert!(matches!(
            result,
            Err(SupervisorError::EngineNotFound { path }) if path == Path::new("/nonexistent/helper.py")
        ));
    }

    #[test]
    fn helper_output_is_read_from_stdout() {
        assert_eq!(OssFuzzBackend::with_defaults().progress_stream(), ProgressStream::Stdout);
    }
}
