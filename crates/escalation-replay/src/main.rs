//! escalation-replay — validate engine configs and replay transcripts offline
//!
//! ```bash
//! escalation-replay validate --config config/escalator.example.toml
//! escalation-replay replay --config config/escalator.example.toml \
//!     --transcript chat.json --fail-tier premium
//! ```
//!
//! Decisions are printed to stdout as JSON lines; logs and telemetry go to
//! stderr (`RUST_LOG` controls verbosity).

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use escalation_core::telemetry::TracingSink;
use escalation_core::{EscalationEngine, EscalatorConfig, TelemetryEmitter};
use replay::ReplayOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Environment variable consulted when `--config` is omitted
const CONFIG_ENV: &str = "ESCALATOR_CONFIG";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a config, then print the tier table
    Validate {
        /// Path to the TOML config (overrides ESCALATOR_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Feed a JSON transcript through the engine one turn at a time
    Replay {
        /// Path to the TOML config (overrides ESCALATOR_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON array of {"role", "content"} turns
        #[arg(long)]
        transcript: PathBuf,

        /// Session identifier used in logs and telemetry
        #[arg(long, default_value = "replay")]
        session: String,

        /// Tokens charged on the chosen tier after each decision
        #[arg(long, default_value_t = 500)]
        tokens_per_turn: u64,

        /// Report every call on this tier as failed (repeatable)
        #[arg(long = "fail-tier")]
        fail_tier: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Validate { config } => validate(config),
        Command::Replay {
            config,
            transcript,
            session,
            tokens_per_turn,
            fail_tier,
        } => {
            let config = load_config(config)?;
            let engine = EscalationEngine::from_config(&config)
                .context("Invalid escalation config")?
                .with_telemetry(TelemetryEmitter::new().with_sink(TracingSink));
            let turns = replay::load_transcript(&transcript)?;
            info!(turns = turns.len(), session = %session, "Replaying transcript");

            let options = ReplayOptions {
                session_id: session,
                tokens_per_turn,
                failing_tiers: fail_tier,
            };
            let steps = replay::replay(&engine, &turns, &options)?;

            let mut out = std::io::stdout().lock();
            for step in &steps {
                serde_json::to_writer(&mut out, step)?;
                writeln!(out)?;
            }
            Ok(())
        }
    }
}

fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Load the config from `--config`, then `ESCALATOR_CONFIG`, else defaults.
fn load_config(explicit: Option<PathBuf>) -> Result<EscalatorConfig> {
    match config_path(explicit) {
        Some(path) => EscalatorConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            info!("No config given; using built-in defaults");
            Ok(EscalatorConfig::default())
        }
    }
}

fn validate(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let hierarchy = config.hierarchy()?;
    let initial = config.initial_tier_index(&hierarchy)?;

    println!(
        "{:<3} {:<12} {:<24} {:>16} {:>14}",
        "#", "tier", "model", "score range", "usd/token"
    );
    for (idx, tier) in hierarchy.tiers().iter().enumerate() {
        let marker = if idx == initial { "*" } else { "" };
        println!(
            "{:<3} {:<12} {:<24} {:>16} {:>14.9}",
            idx,
            format!("{}{}", tier.name, marker),
            tier.model,
            format!("[{}, {})", tier.min_score, tier.max_score),
            tier.cost_per_token,
        );
    }
    println!(
        "budget: soft={} hard={} downgrade={:?}",
        config.budget.soft_limit, config.budget.hard_limit, config.budget.downgrade
    );
    println!(
        "hysteresis: deescalation_threshold={}",
        config.hysteresis.deescalation_threshold
    );
    println!(
        "availability: failure_threshold={} window={}s cooldown={}s",
        config.availability.failure_threshold,
        config.availability.window_secs,
        config.availability.cooldown_secs
    );
    Ok(())
}
