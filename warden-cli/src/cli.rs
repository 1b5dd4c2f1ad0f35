//! Command-line arguments for the `fuzzwarden` binary.
//!
//! Every flag can also be set through a `FUZZWARDEN_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use warden_core::{StopCriteria, DEFAULT_MIN_ITERATIONS};
use warden_supervisor::oss_fuzz::DEFAULT_HELPER;
use warden_supervisor::{LibFuzzerBackend, OssFuzzBackend, SupervisorConfig};

/// How the fuzz target is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Through `oss-fuzz/infra/helper.py run_fuzzer`.
    OssFuzz,
    /// By executing a libFuzzer binary directly.
    Libfuzzer,
}

#[derive(Parser, Debug)]
#[command(
    name = "fuzzwarden",
    version,
    about = "Runs a supplied fuzzer target until either stopping criteria are satisfied \
             or the fuzzer detects a bug and fails"
)]
pub struct Cli {
    /// Fuzz target name
    #[arg(env = "FUZZWARDEN_TARGET")]
    pub fuzzer_target_name: String,

    /// File where the libFuzzer log will be written
    #[arg(long, env = "FUZZWARDEN_LIBFUZZER_LOG")]
    pub libfuzzer_log: PathBuf,

    /// Directory where the libFuzzer generated corpus will be stored
    #[arg(long, env = "FUZZWARDEN_CORPUS_DIR")]
    pub corpus_dir: PathBuf,

    /// Enables the 'coverage increased at least twice' criterion
    #[arg(long = "wait-2x-cov", env = "FUZZWARDEN_WAIT_2X_COV")]
    pub wait_2x_cov: bool,

    /// Number of executed inputs that must be exceeded
    #[arg(long, default_value_t = DEFAULT_MIN_ITERATIONS, env = "FUZZWARDEN_MIN_ITERATIONS")]
    pub min_iterations: u64,

    /// Seconds without a new corpus entry that must be exceeded
    #[arg(long, default_value_t = 2 * 60 * 60, env = "FUZZWARDEN_STAGNATION_SECS")]
    pub stagnation_secs: u64,

    /// Seconds to wait for the engine to exit after it closes its output
    #[arg(long, default_value_t = 15, env = "FUZZWARDEN_FINAL_WAIT_SECS")]
    pub final_wait_secs: u64,

    /// libFuzzer dictionary, passed only if the file exists
    #[arg(long, env = "FUZZWARDEN_DICT")]
    pub dict: Option<PathBuf>,

    /// Engine launcher
    #[arg(long, value_enum, default_value_t = Engine::OssFuzz, env = "FUZZWARDEN_ENGINE")]
    pub engine: Engine,

    /// Path to OSS-Fuzz's helper.py
    #[arg(long, default_value = DEFAULT_HELPER, env = "FUZZWARDEN_OSS_FUZZ_HELPER")]
    pub oss_fuzz_helper: PathBuf,

    /// Instrumented libFuzzer binary (libfuzzer engine only)
    #[arg(long, required_if_eq("engine", "libfuzzer"), env = "FUZZWARDEN_FUZZER_BINARY")]
    pub fuzzer_binary: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long, env = "FUZZWARDEN_REPORT")]
    pub report: Option<PathBuf>,

    /// Extra flags passed through to libFuzzer
    #[arg(last = true)]
    pub engine_args: Vec<String>,
}

impl Cli {
    /// Stopping criteria selected by the flags.
    #[must_use]
    pub fn criteria(&self) -> StopCriteria {
        StopCriteria::new(self.wait_2x_cov)
            .with_min_iterations(self.min_iterations)
            .with_stagnation(Duration::from_secs(self.stagnation_secs))
    }

    /// Run configuration selected by the flags.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(
            self.fuzzer_target_name.clone(),
            self.libfuzzer_log.clone(),
            self.corpus_dir.clone(),
        )
        .with_criteria(self.criteria())
        .with_final_wait(Duration::from_secs(self.final_wait_secs))
        .with_extra_engine_args(self.engine_args.clone());
        if let Some(dict) = &self.dict {
            config = config.with_dictionary(dict.clone());
        }
        config
    }

    #[must_use]
    pub fn oss_fuzz_backend(&self) -> OssFuzzBackend {
        OssFuzzBackend::new(
            PathBuf::from("python3"),
            self.oss_fuzz_helper.clone(),
            PathBuf::from("."),
        )
    }

    /// Backend for `--engine libfuzzer`.
    ///
    /// Falls back to `./<fuzzer>` when no binary was given, which only
    /// happens when the struct is built without clap validation.
    #[must_use]
    pub fn libfuzzer_backend(&self) -> LibFuzzerBackend {
        let binary = self
            .fuzzer_binary
            .clone()
            .unwrap_or_else(|| PathBuf::from(".").join(&self.fuzzer_target_name));
        LibFuzzerBackend::new(binary)
    }
}
