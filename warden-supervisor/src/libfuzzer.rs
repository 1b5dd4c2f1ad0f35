//! Direct libFuzzer binary backend.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::{spawn_piped, which_binary, EngineBackend, EngineProcess, ProgressStream};
use crate::{SupervisorConfig, SupervisorError};

/// Runs an instrumented libFuzzer binary directly, without docker.
///
/// The corpus directory is passed as the positional argument so new inputs
/// are written there. libFuzzer prints its progress on stderr, so that is the
/// stream the supervisor parses.
#[derive(Debug, Clone)]
pub struct LibFuzzerBackend {
    binary: PathBuf,
}

impl LibFuzzerBackend {
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn command(&self, config: &SupervisorConfig) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(config.engine_flags()).arg(&config.corpus_dir);
        cmd
    }
}

#[async_trait]
impl EngineBackend for LibFuzzerBackend {
    async fn spawn(&self, config: &SupervisorConfig) -> Result<EngineProcess, SupervisorError> {
        tokio::fs::create_dir_all(&config.corpus_dir).await?;

        tracing::info!(
            fuzzer = %config.fuzzer,
            binary = %self.binary.display(),
            corpus = %config.corpus_dir.display(),
            "spawning libFuzzer binary"
        );

        spawn_piped(&mut self.command(config))
    }

    async fn health_check(&self) -> Result<(), SupervisorError> {
        which_binary(&self.binary)
    }

    fn progress_stream(&self) -> ProgressStream {
        ProgressStream::Stderr
    }
}
