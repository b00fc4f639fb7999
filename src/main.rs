//! Binary entry point for the replika CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use replika::{
    AggregateOutcome, AwsCliFactory, ConfigError, PlanError, ReplicationConfig, Replicator,
    TracingProgress,
};

mod cli;

use cli::{Cli, CopyCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("{0}")]
    CopiesFailed(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Copy(command) => copy(command).await,
    }
}

async fn copy(args: CopyCommand) -> Result<(), CliError> {
    let config = apply_overrides(ReplicationConfig::load_without_cli_args()?, args);
    config.validate()?;
    let sources = config.source_image_list()?;
    let accounts = config.target_account_list();

    let factory = AwsCliFactory::with_process_runner(config.aws_settings());
    let replicator =
        Replicator::new(factory, TracingProgress).with_manifest_output(config.manifest_path());
    let tasks = replicator
        .plan(&sources, &accounts, &config.copy_options())
        .await?;
    let outcome = replicator.run(tasks, config.copy_concurrency).await;

    write_summary(io::stdout(), &outcome);
    outcome
        .failure_summary()
        .map_or(Ok(()), |summary| Err(CliError::CopiesFailed(summary)))
}

fn apply_overrides(mut config: ReplicationConfig, args: CopyCommand) -> ReplicationConfig {
    if let Some(concurrency) = args.concurrency {
        config.copy_concurrency = concurrency;
    }
    if args.manifest_output.is_some() {
        config.manifest_output = args.manifest_output;
    }
    if args.ensure_available {
        config.ensure_available = true;
    }
    config
}

fn write_summary(mut target: impl Write, outcome: &AggregateOutcome) {
    for entry in &outcome.manifest {
        writeln!(
            target,
            "{}\t{}\t{}",
            entry.account_id, entry.region, entry.image_id
        )
        .ok();
    }
    writeln!(
        target,
        "{}/{} image copies succeeded",
        outcome.task_count.saturating_sub(outcome.failure_count),
        outcome.task_count
    )
    .ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
