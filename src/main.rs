//! news-signals: CLI entrypoint.
//! Generates per-ticker sentiment signals with a chosen backend, reconciles
//! two signal sets, imports flat signal files and prints pipeline counts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use news_signals::config::{ai::DEFAULT_AI_CONFIG_PATH, AiConfig, PipelineConfig};
use news_signals::group::{self, GroupOutcome};
use news_signals::metrics::Metrics;
use news_signals::reconcile::{self, ReportStatus};
use news_signals::{logging, stats, BackendKind};

#[derive(Debug, Parser)]
#[command(name = "news-signals", version, about = "Per-ticker sentiment signals from enriched news")]
struct Cli {
    /// Pipeline config (TOML). Falls back to $SIGNALS_CONFIG_PATH, then config/pipeline.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model provider config (JSON).
    #[arg(long, global = true, default_value = DEFAULT_AI_CONFIG_PATH)]
    ai_config: PathBuf,

    /// Write a Prometheus text snapshot here when the command finishes.
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run (or resume) signal generation.
    Generate {
        #[arg(long, value_enum, default_value_t = BackendKind::Openai)]
        backend: BackendKind,
    },
    /// Compare two signal sets; the first is the reference.
    Reconcile {
        /// Reference set (defaults to the LLM output).
        #[arg(long)]
        a: Option<PathBuf>,
        /// Compared set (defaults to the classifier output).
        #[arg(long)]
        b: Option<PathBuf>,
        #[arg(long, default_value = "llm")]
        label_a: String,
        #[arg(long, default_value = "classifier")]
        label_b: String,
        /// Directory for the summary and CSV files (defaults to results_dir).
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Convert a flat row-per-ticker signal file into grouped records, in place.
    Group {
        /// Defaults to the classifier output path.
        path: Option<PathBuf>,
    },
    /// Print pipeline counts.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = Cli::parse();

    let metrics = match cli.metrics_out {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let pipeline = match &cli.config {
        Some(p) => PipelineConfig::load_from(p)?,
        None => PipelineConfig::load_default()?,
    };

    match cli.command {
        Command::Generate { backend } => {
            let ai = AiConfig::load_or_default(&cli.ai_config)
                .with_context(|| format!("loading {}", cli.ai_config.display()))?;
            let summary = news_signals::run_generation(backend, &pipeline, &ai).await?;
            println!("{}", summary.describe());
        }
        Command::Reconcile {
            a,
            b,
            label_a,
            label_b,
            out_dir,
            threshold,
        } => {
            let a = a.unwrap_or_else(|| pipeline.outputs.llm.clone());
            let b = b.unwrap_or_else(|| pipeline.outputs.classifier.clone());
            let threshold = threshold.unwrap_or(pipeline.reconcile.fuzzy_threshold);
            let out_dir = out_dir.unwrap_or_else(|| pipeline.results_dir.clone());

            let report = reconcile::reconcile_files(&a, &b, threshold);
            print!("{}", report.summary(&label_a, &label_b));
            // Always rewrite the results so a previous run's files never look current.
            report.write_to_dir(&out_dir, &label_a, &label_b)?;
            if report.status != ReportStatus::Ok {
                warn!(dir = %out_dir.display(), "nothing reconciled; wrote empty results");
            } else {
                info!(dir = %out_dir.display(), "reconciliation results saved");
            }
        }
        Command::Group { path } => {
            let path = path.unwrap_or_else(|| pipeline.outputs.classifier.clone());
            match group::group_file(&path)? {
                GroupOutcome::AlreadyGrouped => {
                    println!("File already in grouped format; nothing to do.")
                }
                GroupOutcome::Converted {
                    records,
                    dropped_rows,
                    backup,
                } => {
                    println!("Converted flat signals to grouped format with {records} articles ({dropped_rows} rows dropped).");
                    println!("Backup saved to: {}", backup.display());
                }
            }
        }
        Command::Stats { json } => {
            let s = stats::collect(&pipeline)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                print!("{s}");
            }
        }
    }

    if let (Some(m), Some(path)) = (metrics, cli.metrics_out.as_deref()) {
        m.write_snapshot(path)?;
        info!(path = %path.display(), "metrics snapshot written");
    }
    Ok(())
}
