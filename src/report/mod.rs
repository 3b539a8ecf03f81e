use crate::models::EarningsEvent;
use crate::scraper::cleaner::parse_financial_number;
use crate::utils::fmt_compact;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const TOP_MARKET_CAPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketCapEntry {
    pub symbol: String,
    pub company_name: String,
    pub market_cap: String,
    pub value: f64,
}

/// Aggregate view of a set of events. Built only from its input, so
/// building twice from the same events yields equal reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub total_events: usize,
    pub unique_symbols: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub time_distribution: BTreeMap<String, usize>,
    pub with_eps_estimate: usize,
    pub with_revenue_estimate: usize,
    pub sector_distribution: BTreeMap<String, usize>,
    pub top_market_caps: Vec<MarketCapEntry>,
}

impl SummaryReport {
    pub fn build(events: &[EarningsEvent]) -> Self {
        let mut time_distribution = BTreeMap::new();
        let mut sector_distribution = BTreeMap::new();
        for e in events {
            *time_distribution.entry(e.earnings_time.clone()).or_insert(0) += 1;
            if let Some(sector) = &e.sector {
                *sector_distribution.entry(sector.clone()).or_insert(0) += 1;
            }
        }

        Self {
            total_events: events.len(),
            unique_symbols: events.iter().map(|e| e.symbol.as_str()).collect::<BTreeSet<_>>().len(),
            first_date: events.iter().map(|e| e.earnings_date).min(),
            last_date: events.iter().map(|e| e.earnings_date).max(),
            time_distribution,
            with_eps_estimate: events.iter().filter(|e| e.has_eps_estimate()).count(),
            with_revenue_estimate: events.iter().filter(|e| e.has_revenue_estimate()).count(),
            sector_distribution,
            top_market_caps: top_market_caps(events),
        }
    }
}

/// Largest parseable market caps, one entry per symbol.
fn top_market_caps(events: &[EarningsEvent]) -> Vec<MarketCapEntry> {
    let mut entries: Vec<MarketCapEntry> = events
        .iter()
        .filter_map(|e| {
            let text = e.market_cap.as_deref()?;
            Some(MarketCapEntry {
                symbol: e.symbol.clone(),
                company_name: e.company_name.clone(),
                market_cap: text.to_string(),
                value: parse_financial_number(text)?,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.symbol.cmp(&b.symbol)));

    let mut seen = BTreeSet::new();
    entries.retain(|e| seen.insert(e.symbol.clone()));
    entries.truncate(TOP_MARKET_CAPS);
    entries
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "─".repeat(45);
        writeln!(f, "{}", rule)?;
        writeln!(f, "  Earnings Calendar Summary")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "  Events          : {}", self.total_events)?;
        writeln!(f, "  Unique symbols  : {}", self.unique_symbols)?;
        match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => writeln!(f, "  Dates           : {} → {}", first, last)?,
            _ => writeln!(f, "  Dates           : —")?,
        }
        writeln!(f, "  With EPS est.   : {}", self.with_eps_estimate)?;
        writeln!(f, "  With revenue    : {}", self.with_revenue_estimate)?;

        if !self.time_distribution.is_empty() {
            writeln!(f, "\n  Timing")?;
            for (time, n) in &self.time_distribution {
                writeln!(f, "    {:<28} {:>5}", time, n)?;
            }
        }

        if !self.sector_distribution.is_empty() {
            writeln!(f, "\n  Sectors")?;
            for (sector, n) in &self.sector_distribution {
                writeln!(f, "    {:<28} {:>5}", sector, n)?;
            }
        }

        if !self.top_market_caps.is_empty() {
            writeln!(f, "\n  Largest by market cap")?;
            for (i, entry) in self.top_market_caps.iter().enumerate() {
                writeln!(
                    f,
                    "    {:>2}. {:<8} {:<24} {:>10}",
                    i + 1,
                    entry.symbol,
                    entry.company_name.chars().take(24).collect::<String>(),
                    fmt_compact(entry.value)
                )?;
            }
        }

        write!(f, "{}", rule)
    }
}
