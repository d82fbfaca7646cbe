//! Batch incident triage over an OpenAI-compatible scoring oracle.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triage::FileVocabulary;
use triage_agents::{
    run_batch, HttpOracle, SummaryStyle, TriageConfig, TriageOracle, TriagePipeline, UsageMeter,
    WorkerRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "triage-agents", about = "Run incidents through the triage pipeline", version)]
struct Cli {
    /// Path to the TOML configuration. Written with defaults when missing.
    #[arg(long, default_value = "triage.toml")]
    config: PathBuf,

    /// Override the configured number of incidents to process.
    #[arg(long)]
    limit: Option<usize>,

    /// Override the configured summary style.
    #[arg(long, value_enum)]
    style: Option<SummaryStyle>,

    /// Let the decision stages consult the oracle instead of the
    /// deterministic rules.
    #[arg(long)]
    oracle_decisions: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = TriageConfig::load_or_init(&cli.config)?;
    if let Some(limit) = cli.limit {
        config.limit = limit;
    }
    if let Some(style) = cli.style {
        config.style = style;
    }
    if cli.oracle_decisions {
        config.oracle_decisions = true;
    }

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();
    info!(config = %cli.config.display(), limit = config.limit, "configuration loaded");

    let meter = Arc::new(UsageMeter::new());
    let oracle: Arc<dyn TriageOracle> = Arc::new(HttpOracle::new(&config.oracle, meter.clone()));
    if !oracle.is_available().await {
        warn!(
            key_env = %config.oracle.api_key_env,
            "oracle API key not set, scoring degrades to empty topics"
        );
    }

    let vocabulary = Arc::new(FileVocabulary::new(config.topics_path.clone()));
    let pipeline = TriagePipeline::new(
        &config,
        oracle,
        meter,
        WorkerRegistry::with_builtin(),
        vocabulary,
    );

    run_batch(&config, &pipeline).await?;
    Ok(())
}
