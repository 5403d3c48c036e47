use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use plan_agents::telemetry::{append_telemetry, RunRecord};
use plan_agents::{check_endpoint, AgentFactory, AgentsConfig};
use refinement::{Profile, RefinementConfig, RefinementEngine};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Generate a weekly workout plan and refine it until it verifies.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Profile JSON file
    #[arg(long)]
    profile: PathBuf,

    /// Refinement config TOML (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the revision cap (takes precedence over MAX_REVISIONS)
    #[arg(long)]
    max_revisions: Option<u32>,

    /// Write the run outcome JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Append a run summary to this JSONL file
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Skip the endpoint reachability check
    #[arg(long, default_value_t = false)]
    skip_endpoint_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RefinementConfig::from_toml_file(path)?,
        None => RefinementConfig::default(),
    };
    if let Some(cap) = args.max_revisions {
        config = config.with_max_revisions(cap);
    }

    let raw = std::fs::read_to_string(&args.profile)
        .with_context(|| format!("Failed to read profile {}", args.profile.display()))?;
    let profile: Profile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid profile {}", args.profile.display()))?;

    let agents_config = AgentsConfig::default();
    info!(
        url = %agents_config.endpoint.url,
        model = %agents_config.endpoint.model,
        max_revisions = config.max_revisions,
        "Plan refinement starting"
    );
    if !args.skip_endpoint_check && !check_endpoint(&agents_config.endpoint.url).await {
        warn!(url = %agents_config.endpoint.url, "Inference endpoint not reachable, calls will likely fail");
    }

    let factory = AgentFactory::new(&agents_config)?;
    let collaborators = factory.collaborators(config.patterns.clone());
    let engine = RefinementEngine::new(config, collaborators)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current iteration");
            signal_token.cancel();
        }
    });

    let outcome = engine.run(&profile, &cancel).await?;
    info!(summary = %outcome.summary(), "Plan refinement finished");

    if let Some(path) = &args.telemetry {
        let record = RunRecord::from_outcome(&outcome, &profile, &agents_config.endpoint.model);
        match append_telemetry(&record, path) {
            Ok(()) => info!(path = %path.display(), "Appended run telemetry"),
            // the outcome is still written below
            Err(e) => warn!(error = %e, "Run telemetry not recorded"),
        }
    }

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write outcome to {}", path.display()))?;
            info!(path = %path.display(), "Wrote run outcome");
        }
        None => println!("{json}"),
    }

    Ok(())
}
