use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod logging;

use cli::{Args, LogFormat};
use config::expand::VariableTable;
use gce_rollout_orchestrations::{gce_client_factory, run_rollouts, RolloutResult, RolloutSettings};

/// Initialize tracing on stdout, as plain text or as GitHub workflow commands
fn initialize_tracing(format: LogFormat) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let format = format.resolve(std::env::var("GITHUB_ACTIONS").ok().as_deref());

    // GitHub only shows ::debug:: lines when step debugging is enabled
    let default_filter = match format {
        LogFormat::Github => "warn,gce_rollout=debug,gce_rollout_orchestrations=debug,duroxide=info,duroxide::runtime=warn",
        _ => "warn,gce_rollout=info,gce_rollout_orchestrations=info,duroxide=info,duroxide::runtime=warn",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Github => registry
            .with(logging::SpanFieldsLayer)
            .with(fmt::layer().event_format(logging::WorkflowCommandFormat::new()))
            .try_init(),
        _ => registry.with(fmt::layer().with_target(false)).try_init(),
    }
    .context("Failed to initialize tracing")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file before the environment is snapshotted
    dotenvy::dotenv().ok();

    let args = Args::parse();
    initialize_tracing(args.log_format)?;

    match run(&args).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1)
        }
    }
}

/// Resolve the config and roll out every deploy; false if any deploy failed
async fn run(args: &Args) -> Result<bool> {
    let env = VariableTable::from_env();

    // 1. Configuration; every error here stops the run before any cloud call
    let (path, text) = config::read_config_file(&args.config).await?;
    info!("Using config {}", path.display());

    let document = config::parse_document(&text)?;
    let resolved = config::resolve(document, &env).await?;
    let targets = config::attach_credentials(resolved.deploys, args.creds.as_deref()).await?;

    if targets.is_empty() {
        info!("Nothing to deploy");
        return Ok(true);
    }

    let settings = RolloutSettings {
        retention: resolved.retention,
        ..RolloutSettings::default()
    };

    // 2. One orchestration per deploy
    info!("Deploying {} instance group(s)", targets.len());
    let results = run_rollouts(targets, &settings, &gce_client_factory()).await?;

    // 3. Report
    Ok(report(&results) == 0)
}

/// Log one line per deploy; returns the number of failed deploys
fn report(results: &[RolloutResult]) -> usize {
    let mut failed = 0;
    for result in results {
        match &result.outcome {
            Ok(output) => info!(
                deploy = %result.name,
                "Deployed instance template '{}/{}'",
                output.project,
                output.template
            ),
            Err(e) => {
                failed += 1;
                error!(deploy = %result.name, "{}", e);
            }
        }
    }

    if failed > 0 {
        error!("{} of {} deploys failed", failed, results.len());
    }

    failed
}
