mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, DeployArgs};
use eru_client::config::Settings;
use eru_client::deploy::{self, consumer::TracingReporter, DeployRequest};
use eru_client::source::SpecSource;
use logging::LoggingConfig;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    LoggingConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    }
    .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.settings();
    match cli.command {
        Commands::Deploy(args) => deploy_workloads(settings?, &args).await,
    }
}

async fn deploy_workloads(settings: Settings, args: &DeployArgs) -> anyhow::Result<()> {
    tracing::debug!("Deploy {}", args.spec);

    let document = SpecSource::parse(&args.spec)?
        .fetch()
        .await
        .with_context(|| format!("reading spec {}", args.spec))?;
    let specs = document.parse()?;
    let request = DeployRequest::build(&specs, &args.overrides()?)?;

    let client = settings.connect()?;

    let cancel = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("Interrupted, abandoning deploy stream"),
            // no signal handler, never cancel
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let summary = deploy::deploy(&client, &request, &mut TracingReporter, cancel).await?;
    if summary.is_partial() {
        tracing::warn!(
            "{} of {} instances deployed",
            summary.succeeded,
            summary.total()
        );
    }
    Ok(())
}
