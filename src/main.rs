use std::path::PathBuf;

use ai_readiness_lib::commands::{AnalysisPipeline, RunOptions, RunOutcome};
use ai_readiness_lib::config::AppConfig;
use ai_readiness_lib::db::connectors::snapshot::SnapshotConnector;
use ai_readiness_lib::jobs::{PipelineStage, RunMode};
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

/// Command-line arguments for ai-readiness
#[derive(Parser, Debug)]
#[command(name = "ai-readiness")]
#[command(about = "Score warehouse tables and columns for AI enablement from catalog metadata")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "AI_READINESS_CONFIG")]
    config: PathBuf,

    /// Metadata snapshot to analyze
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Output directory, overrides the configured one
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Stage to start from, by name or legacy stage code
    #[arg(long, default_value = "discovery")]
    start_stage: PipelineStage,

    /// fresh or append
    #[arg(long)]
    mode: Option<RunMode>,

    /// Ignore cached analyses
    #[arg(long)]
    force_reanalysis: bool,

    /// Sample column data after metadata scoring
    #[arg(long)]
    enable_sampling: bool,

    /// Discover and classify only, without sampling or writing outputs
    #[arg(long)]
    dry_run: bool,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(&args.config)?;
    config.apply_process_env()?;

    if let Some(snapshot) = &args.snapshot {
        config.source.snapshot_path = Some(snapshot.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(mode) = args.mode {
        config.run_mode.mode = mode;
    }
    if args.force_reanalysis {
        config.analysis.force_reanalysis = true;
    }
    if args.enable_sampling {
        config.analysis.sampling_enabled = true;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args).context("Failed to load configuration")?;
    let connector = SnapshotConnector::new(config.source.clone(), config.profiling.thresholds.clone());
    let mut pipeline = AnalysisPipeline::new(config, connector)?;

    let options = RunOptions {
        start_stage: args.start_stage,
        dry_run: args.dry_run,
    };
    match pipeline.run(options).await? {
        RunOutcome::DryRun(scope) => {
            println!("{}", serde_json::to_string_pretty(&scope)?);
        }
        RunOutcome::Completed(summary) => {
            log::info!(
                "Readiness: {} tables, average {:.1} ({} high, {} medium, {} low)",
                summary.readiness.total_tables,
                summary.readiness.average_score,
                summary.readiness.high_readiness_count,
                summary.readiness.medium_readiness_count,
                summary.readiness.low_readiness_count
            );
            log::info!(
                "Candidates: {} succeeded, {} skipped; summary at {}",
                summary.succeeded,
                summary.skipped,
                pipeline.state().summary_path().display()
            );
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
