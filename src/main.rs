//! `dw-export` command line

use clap::{Args, Parser, Subcommand};
use dw_export::batch::BatchDriver;
use dw_export::config::{Config, PauseRange};
use dw_export::error::{Error, Result};
use dw_export::export::{Exporter, MonthExporter};
use dw_export::images::{ImageFetcher, read_url_list};
use dw_export::session::{CookieSource, bootstrap};
use dw_export::transport::Transport;
use dw_export::types::{ExportOutcome, Month};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for configuration errors
const EXIT_CONFIG: u8 = 2;

/// Exit code for any other unrecoverable error
const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "dw-export", version, about = "Month-by-month Dreamwidth journal export")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a single month
    Month(MonthArgs),
    /// Export every month in a range, skipping months already on disk
    Batch(BatchArgs),
    /// Download images listed in a URL file
    Images(ImagesArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// Netscape cookies.txt exported from a logged-in browser
    #[arg(long)]
    cookie_file: Option<PathBuf>,
    /// Raw Cookie header value
    #[arg(long)]
    cookie_header: Option<String>,
    /// Journal or community name (default: the logged-in account)
    #[arg(long)]
    journal: Option<String>,
    /// Output directory for exported months
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Directory for failure diagnostics
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

#[derive(Args)]
struct MonthArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Year to export
    #[arg(long)]
    year: i32,
    /// Month to export (1-12)
    #[arg(long)]
    month: u32,
    /// Print the first 2000 characters of a non-export response
    #[arg(long)]
    print_snippet: bool,
}

#[derive(Args)]
struct BatchArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, default_value_t = 2006)]
    start_year: i32,
    #[arg(long, default_value_t = 12)]
    start_month: u32,
    /// Defaults to the current UTC year
    #[arg(long)]
    end_year: Option<i32>,
    /// Defaults to the current UTC month
    #[arg(long)]
    end_month: Option<u32>,
    /// Seconds
    #[arg(long)]
    normal_pause_min: Option<f64>,
    /// Seconds
    #[arg(long)]
    normal_pause_max: Option<f64>,
    /// Seconds
    #[arg(long)]
    grumpy_pause_min: Option<f64>,
    /// Seconds
    #[arg(long)]
    grumpy_pause_max: Option<f64>,
    /// CSV file recording failed months
    #[arg(long)]
    failure_log: Option<PathBuf>,
    /// Consecutive failures that stop the run
    #[arg(long)]
    max_consecutive_failures: Option<u32>,
}

#[derive(Args)]
struct ImagesArgs {
    /// Newline-delimited URL list
    #[arg(long)]
    url_list: Option<PathBuf>,
    /// Root directory for downloaded images
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// CSV file recording failed URLs
    #[arg(long)]
    failure_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("{e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) if e.is_configuration() => {
            error!(error = %e, "Configuration error");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!(error = %e, code = e.code(), "Fatal error");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| Error::config(format!("invalid log level: {level}"), "log_level"))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn run(cli: Cli) -> Result<u8> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Month(args) => {
            let month = Month::new(args.year, args.month)?;
            config.export.print_snippet |= args.print_snippet;
            let exporter = build_exporter(&mut config, args.session).await?;

            let outcome = exporter.export_month(month).await?;
            if let ExportOutcome::Success { path, .. } = &outcome {
                info!(month = %month, path = %path.display(), "Export complete");
            }
            Ok(outcome.exit_code())
        }
        Command::Batch(args) => {
            let start = Month::new(args.start_year, args.start_month)?;
            let current = Month::current_utc();
            let end = Month::new(
                args.end_year.unwrap_or(current.year()),
                args.end_month.unwrap_or(current.month()),
            )?;

            let batch = &mut config.batch;
            override_pause(&mut batch.normal_pause, args.normal_pause_min, args.normal_pause_max)?;
            override_pause(&mut batch.grumpy_pause, args.grumpy_pause_min, args.grumpy_pause_max)?;
            if let Some(path) = args.failure_log {
                batch.failure_log = path;
            }
            if let Some(n) = args.max_consecutive_failures {
                batch.max_consecutive_failures = n;
            }

            let exporter = build_exporter(&mut config, args.session).await?;
            tokio::fs::create_dir_all(&config.export.output_dir).await?;

            let driver = BatchDriver::new(exporter, config.batch.clone());
            let report = driver.run(start, end).await?;
            if report.tripped() {
                error!("Circuit breaker tripped; check your cookies and the failure log");
            } else {
                info!(ledger = %driver.ledger().path().display(), "Batch export complete");
            }
            Ok(report.exit_code())
        }
        Command::Images(args) => {
            let images = &mut config.images;
            if let Some(path) = args.url_list {
                images.url_list = path;
            }
            if let Some(path) = args.image_dir {
                images.image_dir = path;
            }
            if let Some(path) = args.failure_log {
                images.failure_log = path;
            }
            config.validate()?;

            let urls = read_url_list(&config.images.url_list).await?;
            let fetcher = ImageFetcher::new(config.images.clone(), config.retry.request_timeout)?;
            fetcher.run(&urls).await?;
            Ok(0)
        }
    }
}

/// Apply session flags, validate, and build an authenticated exporter
async fn build_exporter(config: &mut Config, args: SessionArgs) -> Result<Exporter> {
    if let Some(journal) = args.journal.filter(|j| !j.is_empty()) {
        config.export.journal = Some(journal);
    }
    if let Some(dir) = args.outdir {
        config.export.output_dir = dir;
    }
    if let Some(dir) = args.debug_dir {
        config.export.debug_dir = dir;
    }
    config.validate()?;

    let source = CookieSource::from_options(args.cookie_file, args.cookie_header)?;
    let client = bootstrap(&source, &config.site, config.retry.request_timeout).await?;
    let transport = Transport::new(client, config.retry.clone());
    let exporter = Exporter::new(transport, config.site.clone(), config.export.clone());
    info!(
        output_dir = %config.export.output_dir.display(),
        journal = config.export.journal.as_deref().unwrap_or("default"),
        "Export session ready"
    );
    Ok(exporter)
}

fn override_pause(range: &mut PauseRange, min: Option<f64>, max: Option<f64>) -> Result<()> {
    let secs = |s: f64| {
        Duration::try_from_secs_f64(s)
            .map_err(|_| Error::config(format!("invalid pause: {s}"), "pause"))
    };
    if let Some(min) = min {
        range.min = secs(min)?;
    }
    if let Some(max) = max {
        range.max = secs(max)?;
    }
    Ok(())
}
