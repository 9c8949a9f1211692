use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use connwatch::config::{Config, GenerateConfig, ReportConfig};
use connwatch::fake;
use connwatch::report::ReportSink;
use connwatch::scheduler::Scheduler;

/// Connection-log analyzer producing trailing-window reports.
#[derive(Parser)]
#[command(name = "connwatch", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan logs matching LOCATION and report connection activity.
    RunReport(RunReportArgs),

    /// Append a synthetic connection log for testing.
    GenerateFakeData(GenerateArgs),

    /// Print version information and exit.
    Version,
}

#[derive(Args)]
struct RunReportArgs {
    /// Never end execution; re-run the report every --sleep-seconds.
    #[arg(long, conflicts_with = "folder")]
    tail: bool,

    /// Run the report once and exit (the default).
    #[arg(long)]
    folder: bool,

    /// Number of seconds to look back for connections.
    #[arg(long)]
    seconds: Option<u64>,

    /// Period length in seconds for the intermediate aggregates.
    #[arg(long)]
    grouping_seconds: Option<u64>,

    /// Tail mode: number of seconds between report re-runs.
    #[arg(long)]
    sleep_seconds: Option<u64>,

    /// Parallel aggregation workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Glob pattern locating the input logs.
    location: Option<String>,

    /// Source host of interest (reached-destinations report).
    host_from: Option<String>,

    /// Destination host of interest (connected-sources report).
    host_to: Option<String>,
}

#[derive(Args)]
struct GenerateArgs {
    /// Output file to append to.
    location: Option<String>,

    /// How many seconds back the generated timestamps reach.
    #[arg(long)]
    span_seconds: Option<u64>,

    /// Width in seconds of each generation burst.
    #[arg(long)]
    interval_seconds: Option<u64>,

    /// Lines appended per burst.
    #[arg(long)]
    lines_per_interval: Option<u64>,
}

/// Build-time version info.
mod version {
    /// Release version string.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Command::Version = &cli.command {
        println!("connwatch {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Command::RunReport(args) => {
            apply_report_args(&mut cfg.report, &args);
            cfg.report.validate()?;

            tracing::info!(
                version = version::RELEASE,
                commit = version::git_commit(),
                "starting connwatch",
            );

            // Build and run the tokio runtime; a failure here is the one
            // unrecoverable resource error.
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;

            rt.block_on(async { run_report(cfg.report).await })
        }
        Command::GenerateFakeData(args) => {
            apply_generate_args(&mut cfg.generate, &args);
            cfg.generate.validate()?;

            let summary = fake::generate(&cfg.generate)?;
            println!(
                "wrote {} lines from {} to {}",
                summary.lines_written, summary.from, summary.to,
            );
            Ok(())
        }
        Command::Version => unreachable!("handled above"),
    }
}

fn apply_report_args(cfg: &mut ReportConfig, args: &RunReportArgs) {
    if args.tail {
        cfg.tail = true;
    }
    if args.folder {
        cfg.tail = false;
    }
    if let Some(seconds) = args.seconds {
        cfg.window = Duration::from_secs(seconds);
    }
    if let Some(seconds) = args.grouping_seconds {
        cfg.granularity = Duration::from_secs(seconds);
    }
    if let Some(seconds) = args.sleep_seconds {
        cfg.interval = Duration::from_secs(seconds);
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
    if let Some(location) = &args.location {
        cfg.location = location.clone();
    }
    if let Some(host) = &args.host_from {
        cfg.pinned_source = host.clone();
    }
    if let Some(host) = &args.host_to {
        cfg.pinned_destination = host.clone();
    }
}

fn apply_generate_args(cfg: &mut GenerateConfig, args: &GenerateArgs) {
    if let Some(location) = &args.location {
        cfg.location = location.clone();
    }
    if let Some(seconds) = args.span_seconds {
        cfg.span = Duration::from_secs(seconds);
    }
    if let Some(seconds) = args.interval_seconds {
        cfg.interval = Duration::from_secs(seconds);
    }
    if let Some(lines) = args.lines_per_interval {
        cfg.lines_per_interval = lines;
    }
}

async fn run_report(cfg: ReportConfig) -> Result<()> {
    // Set up signal handling: stop scheduling further ticks but let the
    // in-flight tick finish and report.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("received SIGINT, finishing current tick");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, finishing current tick");
                }
            }

            cancel.cancel();
        });
    }

    let scheduler = Scheduler::new(cfg, ReportSink::Stdout, cancel);
    scheduler.run().await?;

    tracing::info!("connwatch stopped");

    Ok(())
}
