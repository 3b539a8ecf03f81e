use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "unknown";

// ── Earnings event ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsEvent {
    pub symbol: String,
    pub company_name: String,
    pub earnings_date: NaiveDate,  // the calendar day the page was requested for
    pub earnings_time: String,     // BMO / AMC / clock time / "unknown"
    pub eps_estimate: Option<f64>,
    pub revenue_estimate: Option<String>,
    pub market_cap: Option<String>,
    pub sector: Option<String>,
    pub scraped_timestamp: NaiveDateTime,
}

impl EarningsEvent {
    /// Returns a copy carrying detail-page attributes. Only `sector` and
    /// `market_cap` change; a `None` argument keeps the current value.
    pub fn enriched(&self, sector: Option<String>, market_cap: Option<String>) -> Self {
        Self {
            sector: sector.or_else(|| self.sector.clone()),
            market_cap: market_cap.or_else(|| self.market_cap.clone()),
            ..self.clone()
        }
    }

    pub fn has_eps_estimate(&self) -> bool {
        self.eps_estimate.is_some()
    }

    pub fn has_revenue_estimate(&self) -> bool {
        self.revenue_estimate.is_some()
    }
}

// ── Raw table rows ────────────────────────────────────────────────────────────

/// One `<td>` as seen in the DOM snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCell {
    pub text: String,
    /// `title` or `aria-label` of the first link inside the cell.
    pub link_title: Option<String>,
}

#[cfg(test)]
impl RawCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), link_title: None }
    }

    pub fn linked(text: impl Into<String>, title: impl Into<String>) -> Self {
        Self { text: text.into(), link_title: Some(title.into()) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

// ── Session stats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub pages_scraped: usize,
    pub events_found: usize,
    pub errors_encountered: usize,
    pub pages_without_data: usize,
    pub days_skipped: usize,
    pub events_enriched: usize,
    pub enrichment_failures: usize,
    pub start_time: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub duration_secs: Option<f64>,
    pub success_rate: Option<f64>,
}

impl SessionStats {
    pub fn start() -> Self {
        Self {
            pages_scraped: 0,
            events_found: 0,
            errors_encountered: 0,
            pages_without_data: 0,
            days_skipped: 0,
            events_enriched: 0,
            enrichment_failures: 0,
            start_time: Utc::now().naive_utc(),
            finished_at: None,
            duration_secs: None,
            success_rate: None,
        }
    }

    /// Percentage of scraped pages not offset by an error, floored at 0.
    pub fn compute_success_rate(&self) -> f64 {
        let pages = self.pages_scraped.max(1) as f64;
        ((1.0 - self.errors_encountered as f64 / pages) * 100.0).max(0.0)
    }

    pub fn finish(&mut self) {
        let now = Utc::now().naive_utc();
        let elapsed = now - self.start_time;
        self.finished_at = Some(now);
        self.duration_secs = Some(elapsed.num_milliseconds() as f64 / 1000.0);
        self.success_rate = Some(self.compute_success_rate());
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EarningsEvent {
        EarningsEvent {
            symbol: "AAPL".into(),
            company_name: "Apple Inc.".into(),
            earnings_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            earnings_time: "After Market Close".into(),
            eps_estimate: Some(1.5),
            revenue_estimate: Some("90.3B".into()),
            market_cap: None,
            sector: Some("Technology".into()),
            scraped_timestamp: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_enriched_keeps_identity_fields() {
        let event = sample_event();
        let out = event.enriched(None, Some("2.6T".into()));

        assert_eq!(out.market_cap.as_deref(), Some("2.6T"));
        assert_eq!(out.sector.as_deref(), Some("Technology"));
        assert_eq!(out.scraped_timestamp, event.scraped_timestamp);
        assert_eq!(out.symbol, event.symbol);
        assert!(event.market_cap.is_none());
    }

    #[test]
    fn test_success_rate() {
        let mut stats = SessionStats::start();
        assert_eq!(stats.compute_success_rate(), 100.0);

        stats.pages_scraped = 4;
        stats.errors_encountered = 1;
        assert_eq!(stats.compute_success_rate(), 75.0);

        stats.pages_scraped = 0;
        stats.errors_encountered = 3;
        assert_eq!(stats.compute_success_rate(), 0.0);
    }

    #[test]
    fn test_finish_sets_derived_fields() {
        let mut stats = SessionStats::start();
        stats.pages_scraped = 2;
        stats.finish();
        assert!(stats.finished_at.is_some());
        assert!(stats.duration_secs.unwrap() >= 0.0);
        assert_eq!(stats.success_rate, Some(100.0));
    }
}
