//! Entry point for the `fuzzwarden` supervisor.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use warden_cli::cli::{Cli, Engine};
use warden_cli::{result_status, supervise};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.supervisor_config();
    let report_path = cli.report.as_deref();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = match cli.engine {
        Engine::OssFuzz => supervise(cli.oss_fuzz_backend(), config, report_path, shutdown).await,
        Engine::Libfuzzer => {
            supervise(cli.libfuzzer_backend(), config, report_path, shutdown).await
        }
    };

    if let Ok(report) = &result {
        println!("{}", report.summary());
    }
    ExitCode::from(result_status(&result))
}
