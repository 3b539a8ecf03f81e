//! JSON and CSV exports of a run. Both are regenerable from the event list.

use crate::models::{EarningsEvent, SessionStats};
use crate::utils::weekday_name;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Paths ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl ExportPaths {
    /// `{dir}/earnings_data_YYYYMMDD_HHMMSS.{json,csv}`
    pub fn timestamped<Tz: TimeZone>(dir: &Path, at: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let stem = format!("earnings_data_{}", at.format("%Y%m%d_%H%M%S"));
        Self {
            json: dir.join(format!("{}.json", stem)),
            csv: dir.join(format!("{}.csv", stem)),
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    Ok(())
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMetadata {
    pub scrape_timestamp: NaiveDateTime,
    pub total_events: usize,
    pub session_stats: Option<SessionStats>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub earnings_events: Vec<EarningsEvent>,
}

impl ExportDocument {
    pub fn new(events: &[EarningsEvent], stats: Option<&SessionStats>) -> Self {
        Self {
            metadata: ExportMetadata {
                scrape_timestamp: Utc::now().naive_utc(),
                total_events: events.len(),
                session_stats: stats.cloned(),
                version: EXPORT_VERSION.to_string(),
            },
            earnings_events: events.to_vec(),
        }
    }
}

pub fn write_json(path: &Path, events: &[EarningsEvent], stats: Option<&SessionStats>) -> Result<()> {
    create_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &ExportDocument::new(events, stats))
        .with_context(|| format!("Failed to write JSON to {:?}", path))?;
    info!("Saved {} events to {:?}", events.len(), path);
    Ok(())
}

pub fn read_json(path: &Path) -> Result<ExportDocument> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{:?} is not an earnings export", path))
}

// ── CSV ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    symbol: &'a str,
    company_name: &'a str,
    earnings_date: String,
    earnings_time: &'a str,
    eps_estimate: Option<f64>,
    revenue_estimate: Option<&'a str>,
    market_cap: Option<&'a str>,
    sector: Option<&'a str>,
    scraped_timestamp: String,
    has_eps_estimate: bool,
    has_revenue_estimate: bool,
    weekday: &'static str,
}

impl<'a> From<&'a EarningsEvent> for CsvRow<'a> {
    fn from(e: &'a EarningsEvent) -> Self {
        Self {
            symbol: &e.symbol,
            company_name: &e.company_name,
            earnings_date: e.earnings_date.format("%Y-%m-%d").to_string(),
            earnings_time: &e.earnings_time,
            eps_estimate: e.eps_estimate,
            revenue_estimate: e.revenue_estimate.as_deref(),
            market_cap: e.market_cap.as_deref(),
            sector: e.sector.as_deref(),
            scraped_timestamp: e.scraped_timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            has_eps_estimate: e.has_eps_estimate(),
            has_revenue_estimate: e.has_revenue_estimate(),
            weekday: weekday_name(e.earnings_date),
        }
    }
}

pub fn write_csv(path: &Path, events: &[EarningsEvent]) -> Result<usize> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    for event in events {
        writer
            .serialize(CsvRow::from(event))
            .with_context(|| format!("write row {} {}", event.symbol, event.earnings_date))?;
    }
    writer.flush()?;

    info!("Saved {} rows to {:?}", events.len(), path);
    Ok(events.len())
}
