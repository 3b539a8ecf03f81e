mod config;
mod models;
mod pipeline;
mod report;
mod scraper;
mod storage;
mod utils;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, RunRequest};
use crate::report::SummaryReport;
use crate::scraper::driver::ChromeLauncher;
use crate::storage::ExportPaths;

#[derive(Parser)]
#[command(name = "earnings-scraper", about = "Earnings calendar scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape the earnings calendar for a range of days
    Scrape {
        /// First day to scrape, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        start: Option<NaiveDate>,

        /// Number of calendar days to cover; weekends are skipped
        #[arg(short, long, default_value_t = 5)]
        days: u32,

        /// Visit quote pages to add sector and market cap
        #[arg(short, long)]
        enrich: bool,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Export directory (default: export.data_dir)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Print the summary without writing JSON/CSV
        #[arg(long)]
        no_export: bool,
    },

    /// Print the summary report of a JSON export
    Summary {
        path: PathBuf,
    },

    /// Regenerate the CSV for a JSON export
    ExportCsv {
        path: PathBuf,

        /// Output file (default: same name with .csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8, log_dir: &Path) -> Result<()> {
    let filter = match verbose {
        0 => "earnings_scraper=info,warn",
        1 => "earnings_scraper=debug,info",
        _ => "trace",
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Could not create log dir {:?}", log_dir))?;
    let log_path = log_dir.join(format!("earnings_scraper_{}.log", Local::now().format("%Y%m%d")));
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Could not open log file {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .with(EnvFilter::new(filter))
        .init();

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    init_logging(cli.verbose, &config.export.log_dir)?;

    match cli.command {
        Command::Scrape { start, days, enrich, headed, out_dir, no_export } => {
            if headed {
                config.stealth.headless = false;
            }
            if let Some(dir) = out_dir {
                config.export.data_dir = dir;
            }

            let request = RunRequest {
                start: start.unwrap_or_else(|| Local::now().date_naive()),
                days,
                enrich,
            };

            let launcher = ChromeLauncher::new(&config.stealth, config.scraper.navigation_timeout_secs);
            let data_dir = config.export.data_dir.clone();
            let pipeline = Pipeline::new(config, launcher)?;

            let run = {
                let _t = utils::Timer::start("Earnings scrape");
                pipeline.run(&request).await?
            };

            if !no_export && !run.events.is_empty() {
                let paths = ExportPaths::timestamped(&data_dir, Local::now());
                storage::write_json(&paths.json, &run.events, Some(&run.stats))?;
                storage::write_csv(&paths.csv, &run.events)?;
            } else if run.events.is_empty() {
                info!("No events found; nothing exported");
            }

            println!("{}", SummaryReport::build(&run.events));
            println!(
                "  Pages {} | errors {} | skipped days {} | success {:.1}% | {:.1}s",
                run.stats.pages_scraped,
                run.stats.errors_encountered,
                run.stats.days_skipped,
                run.stats.success_rate.unwrap_or_default(),
                run.stats.duration_secs.unwrap_or_default(),
            );

            if !run.is_complete() {
                warn!("Run ended early: {}", run.status);
                bail!("run {}", run.status);
            }
        }

        Command::Summary { path } => {
            let doc = storage::read_json(&path)?;
            println!("{}", SummaryReport::build(&doc.earnings_events));
            if let Some(stats) = doc.metadata.session_stats {
                println!(
                    "  Scraped {} (v{}) | pages {} | errors {}",
                    doc.metadata.scrape_timestamp.format("%Y-%m-%d %H:%M:%S"),
                    doc.metadata.version,
                    stats.pages_scraped,
                    stats.errors_encountered,
                );
            }
        }

        Command::ExportCsv { path, out } => {
            let doc = storage::read_json(&path)?;
            let out = out.unwrap_or_else(|| path.with_extension("csv"));
            let n = storage::write_csv(&out, &doc.earnings_events)?;
            println!("Wrote {} rows to {}", n, out.display());
        }
    }

    Ok(())
}
