//! Pipeline orchestrator: browser session → calendar days → enrichment.
//!
//! ## Run model
//!
//! `run()` opens one browser session and walks consecutive calendar days
//! in ascending order:
//!   1. Weekends are skipped without a request.
//!   2. Each business day goes through the page scraper; failures there are
//!      folded into the stats and the run moves on.
//!   3. A randomized pause separates business days (none after the last).
//!   4. Optionally, the first N events are enriched from their quote pages.
//!
//! The session is closed on every path after a successful launch. A lost
//! session ends the run early with whatever was collected and
//! `RunStatus::Aborted`; only a failed launch is an `Err`.

pub mod enrich;

use crate::config::AppConfig;
use crate::models::{EarningsEvent, SessionStats};
use crate::scraper::cleaner::{CalendarRowParser, RowParser};
use crate::scraper::driver::{BrowserDriver, DriverError, DriverLauncher};
use crate::scraper::{CalendarScraper, PageOutcome, ScrapeError};
use crate::utils::{calendar_days, is_business_day, weekday_name};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use self::enrich::Enricher;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not start browser session: {0}")]
    Launch(#[source] DriverError),

    #[error(transparent)]
    Config(#[from] ScrapeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub start: NaiveDate,
    pub days: u32,
    pub enrich: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    /// Stopped early; the report holds the events collected until then.
    Aborted(String),
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub events: Vec<EarningsEvent>,
    pub stats: SessionStats,
    pub status: RunStatus,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

pub struct Pipeline<L, P = CalendarRowParser> {
    launcher: L,
    scraper: CalendarScraper<P>,
    enricher: Enricher,
    config: AppConfig,
}

impl<L: DriverLauncher> Pipeline<L> {
    pub fn new(config: AppConfig, launcher: L) -> Result<Self, PipelineError> {
        let scraper = CalendarScraper::new(&config.scraper)?;
        Ok(Self::with_scraper(config, launcher, scraper))
    }
}

impl<L: DriverLauncher, P: RowParser> Pipeline<L, P> {
    pub fn with_scraper(config: AppConfig, launcher: L, scraper: CalendarScraper<P>) -> Self {
        let enricher = Enricher::new(scraper.urls().clone(), &config.enrichment);
        Self { launcher, scraper, enricher, config }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, PipelineError> {
        let mut stats = SessionStats::start();

        let days = calendar_days(request.start, request.days);
        let business: Vec<NaiveDate> = days.iter().copied().filter(|d| is_business_day(*d)).collect();
        for day in days.iter().filter(|d| !is_business_day(**d)) {
            debug!("Skipping {} ({})", day, weekday_name(*day));
        }
        stats.days_skipped = days.len() - business.len();

        info!(
            "=== Earnings run: {} day(s) from {}, {} business day(s), enrich={} ===",
            request.days,
            request.start,
            business.len(),
            request.enrich
        );

        if business.is_empty() {
            info!("No business days in range; nothing to scrape");
            stats.finish();
            return Ok(RunReport { events: Vec::new(), stats, status: RunStatus::Completed });
        }

        let mut driver = self.launcher.launch().await.map_err(PipelineError::Launch)?;

        let (events, status) = self.run_session(&mut driver, &business, request.enrich, &mut stats).await;

        if let Err(e) = driver.quit().await {
            warn!("Browser session did not close cleanly: {}", e);
        }

        stats.finish();
        info!(
            "=== Done: {} events | {} pages | {} errors | success {:.1}% | {:.1}s ===",
            events.len(),
            stats.pages_scraped,
            stats.errors_encountered,
            stats.success_rate.unwrap_or_default(),
            stats.duration_secs.unwrap_or_default(),
        );

        Ok(RunReport { events, stats, status })
    }

    async fn run_session<D: BrowserDriver>(
        &self,
        driver: &mut D,
        business: &[NaiveDate],
        enrich: bool,
        stats: &mut SessionStats,
    ) -> (Vec<EarningsEvent>, RunStatus) {
        let mut events = Vec::new();

        for (i, date) in business.iter().enumerate() {
            match self.scraper.scrape_date(driver, *date, stats).await {
                PageOutcome::Scraped { events: found, .. } => events.extend(found),
                PageOutcome::NoTable => info!("{}: no earnings listed", date),
                PageOutcome::Failed(ScrapeError::SessionLost(e)) => {
                    error!("Stopping run at {}: {}", date, e);
                    return (events, RunStatus::Aborted(format!("browser session lost on {}: {}", date, e)));
                }
                PageOutcome::Failed(_) => {}
            }

            if i + 1 < business.len() {
                self.config.scraper.inter_page_delay.pause().await;
            }
        }

        if enrich && !events.is_empty() {
            let batch = self.enricher.enrich(driver, events, stats).await;
            if let Some(e) = batch.session_lost {
                return (batch.events, RunStatus::Aborted(format!("browser session lost during enrichment: {}", e)));
            }
            events = batch.events;
        }

        (events, RunStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::scraper::testing::{calendar_html, quote_html, test_config, FixtureDriver, FixtureLauncher};
    use std::time::Duration;
    use tokio::time::Instant;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn launcher(driver: FixtureDriver) -> FixtureLauncher {
        FixtureLauncher { driver, fail: false }
    }

    #[test]
    fn test_weekend_days_are_not_requested() {
        // Fri 2024-01-19 .. Mon 2024-01-22
        let driver = FixtureDriver::new()
            .page("day=2024-01-19", &calendar_html(&[&["AAPL", "AMC", "1.50", "90B"]]))
            .page("day=2024-01-22", &calendar_html(&[&["KO", "BMO", "0.70", "11B"], &["PEP", "BMO", "1.9", "N/A"]]));
        let log = driver.shared_log();
        let pipeline = Pipeline::new(test_config(), launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 19), days: 4, enrich: false };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.visited.len(), 2);
        assert!(log.visited.iter().all(|u| !u.contains("2024-01-20") && !u.contains("2024-01-21")));
        assert!(log.visited[0].contains("day=2024-01-19"));
        assert!(log.visited[1].contains("day=2024-01-22"));
        assert_eq!(log.quits, 1);

        assert!(report.is_complete());
        assert_eq!(report.stats.days_skipped, 2);
        assert_eq!(report.stats.pages_scraped, 2);
        let dated: Vec<_> = report.events.iter().map(|e| (e.symbol.as_str(), e.earnings_date)).collect();
        assert_eq!(dated, [("AAPL", d(2024, 1, 19)), ("KO", d(2024, 1, 22)), ("PEP", d(2024, 1, 22))]);
        assert_eq!(report.stats.success_rate, Some(100.0));
    }

    #[test]
    fn test_pacing_between_business_days_only() {
        // Thu 2024-01-18 .. Mon 2024-01-22: three business days
        let driver = FixtureDriver::new()
            .page("day=2024-01-18", &calendar_html(&[&["AAPL", "AMC", "1.50", "90B"]]))
            .page("day=2024-01-19", &calendar_html(&[&["KO", "BMO", "0.70", "11B"]]))
            .page("day=2024-01-22", &calendar_html(&[&["PEP", "BMO", "1.9", "N/A"]]));
        let mut cfg = test_config();
        cfg.scraper.page_delay = DelayRange::new(1_000, 1_000);
        cfg.scraper.inter_page_delay = DelayRange::new(5_000, 5_000);
        let pipeline = Pipeline::new(cfg, launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 18), days: 5, enrich: false };

        let (report, elapsed) = tokio_test::block_on(async {
            tokio::time::pause();
            let start = Instant::now();
            let report = pipeline.run(&request).await.unwrap();
            (report, start.elapsed())
        });

        // one page delay per day, inter-page delays only between days
        let expected = Duration::from_millis(3 * 1_000 + 2 * 5_000);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(100),
            "elapsed {:?}",
            elapsed
        );
        assert_eq!(report.stats.pages_scraped, 3);
        assert_eq!(report.events.len(), 3);
    }

    #[test]
    fn test_failed_day_does_not_stop_run() {
        let driver = FixtureDriver::new()
            .timeout_on("day=2024-01-16")
            .page("day=2024-01-17", &calendar_html(&[&["MSFT", "AMC", "2.78", "61B"]]));
        let log = driver.shared_log();
        let pipeline = Pipeline::new(test_config(), launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 16), days: 2, enrich: false };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.stats.errors_encountered, 1);
        assert_eq!(report.stats.pages_scraped, 1);
        assert_eq!(report.stats.success_rate, Some(0.0));
        assert_eq!(log.lock().unwrap().quits, 1);
    }

    #[test]
    fn test_lost_session_returns_partial_results() {
        let driver = FixtureDriver::new()
            .page("day=2024-01-16", &calendar_html(&[&["MSFT", "AMC", "2.78", "61B"]]))
            .page("day=2024-01-17", &calendar_html(&[&["AAPL", "AMC", "1.50", "90B"]]))
            .lose_session_after(1);
        let log = driver.shared_log();
        let pipeline = Pipeline::new(test_config(), launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 16), days: 3, enrich: false };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        assert!(matches!(report.status, RunStatus::Aborted(_)));
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].symbol, "MSFT");
        assert_eq!(log.lock().unwrap().quits, 1, "driver released after abort");
    }

    #[test]
    fn test_launch_failure_is_fatal() {
        let pipeline = Pipeline::new(
            test_config(),
            FixtureLauncher { driver: FixtureDriver::new(), fail: true },
        )
        .unwrap();
        let request = RunRequest { start: d(2024, 1, 16), days: 1, enrich: false };

        let result = tokio_test::block_on(pipeline.run(&request));

        assert!(matches!(result, Err(PipelineError::Launch(_))));
    }

    #[test]
    fn test_weekend_only_range_skips_launch() {
        let driver = FixtureDriver::new();
        let log = driver.shared_log();
        let pipeline = Pipeline::new(test_config(), launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 20), days: 2, enrich: true };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        assert!(report.is_complete());
        assert!(report.events.is_empty());
        assert_eq!(report.stats.days_skipped, 2);
        assert_eq!(log.lock().unwrap().visited.len(), 0);
    }

    #[test]
    fn test_run_with_enrichment() {
        let driver = FixtureDriver::new()
            .page("day=2024-01-16", &calendar_html(&[&["MSFT", "AMC", "2.78", "61B"], &["KO", "BMO", "0.70", "11B"]]))
            .page("quote/MSFT", &quote_html(Some("Technology"), Some("3.1T")));
        let mut cfg = test_config();
        cfg.enrichment.limit = 1;
        let pipeline = Pipeline::new(cfg, launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 16), days: 1, enrich: true };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.events[0].sector.as_deref(), Some("Technology"));
        assert_eq!(report.events[0].market_cap.as_deref(), Some("3.1T"));
        assert_eq!(report.events[1].sector, None);
        assert_eq!(report.stats.events_enriched, 1);
    }

    #[test]
    fn test_no_table_day_is_empty_not_error() {
        let driver = FixtureDriver::new().page("day=2024-01-16", "<html><body>Nothing scheduled</body></html>");
        let pipeline = Pipeline::new(test_config(), launcher(driver)).unwrap();
        let request = RunRequest { start: d(2024, 1, 16), days: 1, enrich: true };

        let report = tokio_test::block_on(pipeline.run(&request)).unwrap();

        assert!(report.is_complete());
        assert!(report.events.is_empty());
        assert_eq!(report.stats.errors_encountered, 0);
        assert_eq!(report.stats.pages_without_data, 1);
    }
}
