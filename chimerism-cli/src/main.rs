//! Chimerism CLI - score patient cohorts into slot-aligned risk timelines

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering (input patient order, ascending slot order)
// - Identical input yields byte-for-byte identical output

use anyhow::Context;
use chimerism_core::aggregates::render_summary_text;
use chimerism_core::config::{self, ResolvedConfig};
use chimerism_core::{
    compute_cohort_summary, render_json, render_jsonl, render_text, score_cohort_with_progress,
    select_patients, CohortInput, CohortOutcome, ScoringContext,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit status when the run completed but some patients were rejected
const EXIT_PATIENTS_REJECTED: i32 = 2;

#[derive(Parser)]
#[command(name = "chimerism")]
#[command(about = "Unified chimerism and renal lab risk timelines for transplant follow-up")]
#[command(version = env!("CHIMERISM_VERSION"))]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a cohort and emit one record per patient per grid slot
    Score {
        /// Path to the cohort JSON document
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of worker threads (default: one per core)
        #[arg(long)]
        jobs: Option<usize>,

        /// Write output to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score a cohort and print patient status and alarm distribution
    Summary {
        /// Path to the cohort JSON document
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: SummaryFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of worker threads (default: one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Validate or show the scoring configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the canonical time grid in use
    Grid {
        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without scoring anything
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Jsonl,
    Text,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SummaryFormat {
    Json,
    Text,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Score {
            input,
            format,
            config: config_path,
            jobs,
            output,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            configure_workers(jobs)?;
            let outcome = run_cohort(&input, &resolved)?;

            let rendered = match format {
                OutputFormat::Json => format!("{}\n", render_json(&outcome.timelines)),
                OutputFormat::Jsonl => render_jsonl(&outcome.timelines),
                OutputFormat::Text => render_text(&outcome.timelines),
            };
            match output {
                Some(path) => {
                    write_output(&path, &rendered)?;
                    eprintln!("Output written to: {}", path.display());
                }
                None => print!("{}", rendered),
            }

            exit_on_rejections(&outcome);
        }
        Commands::Summary {
            input,
            format,
            config: config_path,
            jobs,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            configure_workers(jobs)?;
            let outcome = run_cohort(&input, &resolved)?;
            let summary = compute_cohort_summary(&outcome.timelines, &resolved.params.thresholds);

            match format {
                SummaryFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                SummaryFormat::Text => {
                    print!("{}", render_summary_text(&summary));
                }
            }

            exit_on_rejections(&outcome);
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let root = std::env::current_dir()?;
                match config::load_and_resolve(&root, path.as_deref()) {
                    Ok(resolved) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&root, path.as_deref())
                    .context("failed to load configuration")?;

                match resolved.config_path {
                    Some(ref p) => eprintln!("Source: {}", p.display()),
                    None => eprintln!("Source: defaults (no config file found)"),
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&resolved.effective_config())?
                );
            }
        },
        Commands::Grid {
            config: config_path,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            println!(
                "{:<10} {:>5} {:>6}  {:<4} {}",
                "SLOT", "ORDER", "DAY", "KMR", "LAB"
            );
            for slot in resolved.grid.slots() {
                println!(
                    "{:<10} {:>5} {:>6}  {:<4} {}",
                    slot.key,
                    slot.order,
                    slot.pseudo_day_offset,
                    yes_no(slot.kmr_applicable),
                    yes_no(slot.lab_applicable),
                );
            }
        }
    }

    Ok(())
}

/// RUST_LOG wins over --log-level; logs go to stderr so stdout stays parseable
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let root = std::env::current_dir()?;
    let resolved =
        config::load_and_resolve(&root, config_path).context("failed to load configuration")?;
    if let Some(ref path) = resolved.config_path {
        eprintln!("Using config: {}", path.display());
    }
    Ok(resolved)
}

fn configure_workers(jobs: Option<usize>) -> anyhow::Result<()> {
    if let Some(jobs) = jobs {
        if jobs == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("failed to configure worker pool")?;
    }
    Ok(())
}

/// Load, select and score a cohort with a progress bar on stderr
fn run_cohort(input: &Path, resolved: &ResolvedConfig) -> anyhow::Result<CohortOutcome> {
    if !input.exists() {
        anyhow::bail!("Input does not exist: {}", input.display());
    }
    let entries = CohortInput::load(input)?.entries();
    let total = entries.len();
    let patients = select_patients(entries, resolved);
    if patients.len() < total {
        eprintln!(
            "Selected {} of {} patient(s) by include/exclude patterns",
            patients.len(),
            total
        );
    }

    let context = ScoringContext::from_config(resolved);
    tracing::debug!(
        patients = patients.len(),
        slots = context.grid.len(),
        "scoring cohort"
    );
    let progress = if patients.len() > 1 {
        let pb = ProgressBar::new(patients.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner} scoring [{bar:30}] {pos}/{len} patients")
                .context("invalid progress template")?
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let outcome = score_cohort_with_progress(&patients, &context, || progress.inc(1));
    progress.finish_and_clear();

    for failure in &outcome.failures {
        eprintln!("rejected {}: {}", failure.patient_id, failure.error);
    }
    Ok(outcome)
}

fn exit_on_rejections(outcome: &CohortOutcome) {
    if outcome.has_failures() {
        eprintln!("{} patient(s) rejected", outcome.failures.len());
        std::process::exit(EXIT_PATIENTS_REJECTED);
    }
}

/// Write output with the temp + rename pattern
fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temporary file to: {}", path.display()))?;
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
