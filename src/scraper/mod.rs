pub mod cleaner;
pub mod driver;
pub mod parsers;
pub mod stealth;

#[cfg(test)]
pub mod testing;

use crate::config::ScraperConfig;
use crate::models::{EarningsEvent, SessionStats};
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use self::cleaner::{CalendarRowParser, NumberParser, RowParser};
use self::driver::{BrowserDriver, DriverError};
use self::parsers::locate_table;
use self::stealth::pointer_moves_script;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("navigation failed: {0}")]
    Navigation(#[source] DriverError),

    #[error("browser error: {0}")]
    Driver(#[source] DriverError),

    #[error("browser session lost: {0}")]
    SessionLost(#[source] DriverError),
}

impl ScrapeError {
    fn from_driver(e: DriverError) -> Self {
        match e {
            e if e.is_fatal() => ScrapeError::SessionLost(e),
            e @ DriverError::NavigationTimeout { .. } => ScrapeError::Navigation(e),
            e => ScrapeError::Driver(e),
        }
    }
}

// ── Site URLs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: Url,
}

impl SiteUrls {
    pub fn new(base_url: &str) -> Result<Self, ScrapeError> {
        let invalid = |reason: String| ScrapeError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url.trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a hierarchical url".to_string()));
        }
        Ok(Self { base })
    }

    fn with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Single-day calendar view, e.g.
    /// `/calendar/earnings?from=2024-01-16&to=2024-01-16&day=2024-01-16&offset=0&size=100`
    pub fn calendar(&self, date: NaiveDate, page_size: u32) -> Url {
        let day = date.format("%Y-%m-%d").to_string();
        let mut url = self.with_segments(&["calendar", "earnings"]);
        url.query_pairs_mut()
            .append_pair("from", &day)
            .append_pair("to", &day)
            .append_pair("day", &day)
            .append_pair("offset", "0")
            .append_pair("size", &page_size.to_string());
        url
    }

    /// Per-symbol quote page. `BRK.B` → `/quote/BRK.B`
    pub fn quote(&self, symbol: &str) -> Url {
        self.with_segments(&["quote", &symbol.trim().to_uppercase()])
    }
}

// ── Page outcome ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum PageOutcome {
    /// The results table was found. Skipped short rows are not errors.
    Scraped { events: Vec<EarningsEvent>, row_errors: usize },
    /// No selector matched within the wait: a day without data.
    NoTable,
    Failed(ScrapeError),
}

#[cfg(test)]
impl PageOutcome {
    pub fn into_events(self) -> Vec<EarningsEvent> {
        match self {
            PageOutcome::Scraped { events, .. } => events,
            _ => Vec::new(),
        }
    }
}

// ── Calendar scraper ──────────────────────────────────────────────────────────

const TABLE_POLL: Duration = Duration::from_millis(250);

/// A bare `table` matches layout tables too; it is only tried on the
/// snapshot, never waited for.
fn is_catch_all(selector: &str) -> bool {
    selector.trim().eq_ignore_ascii_case("table")
}

pub struct CalendarScraper<P = CalendarRowParser> {
    config: ScraperConfig,
    urls: SiteUrls,
    parser: P,
    /// Valid, specific table selectors in priority order, polled while the
    /// page renders.
    wait_selectors: Vec<String>,
}

impl CalendarScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let numbers = NumberParser::new(&config.not_available_tokens);
        Self::with_parser(config, CalendarRowParser::new(numbers))
    }
}

impl<P: RowParser> CalendarScraper<P> {
    pub fn with_parser(config: &ScraperConfig, parser: P) -> Result<Self, ScrapeError> {
        let valid: Vec<&String> = config
            .table_selectors
            .iter()
            .filter(|s| ::scraper::Selector::parse(s).is_ok())
            .collect();
        let specific: Vec<String> = valid.iter().filter(|s| !is_catch_all(s.as_str())).map(|s| s.to_string()).collect();
        let wait_selectors = match (specific.is_empty(), valid.is_empty()) {
            (false, _) => specific,
            (true, false) => valid.into_iter().cloned().collect(),
            (true, true) => vec!["table".to_string()],
        };

        Ok(Self {
            config: config.clone(),
            urls: SiteUrls::new(&config.base_url)?,
            parser,
            wait_selectors,
        })
    }

    pub fn urls(&self) -> &SiteUrls {
        &self.urls
    }

    /// Poll the selectors in order until one matches or the table timeout
    /// runs out. Returns the selector that matched.
    async fn wait_for_table<D: BrowserDriver>(&self, driver: &mut D) -> Result<Option<&str>, DriverError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.table_timeout_secs);
        loop {
            for selector in &self.wait_selectors {
                if driver.wait_for_element(selector, Duration::ZERO).await? {
                    return Ok(Some(selector.as_str()));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(TABLE_POLL).await;
        }
    }

    /// Scrape one calendar day. Never fails: every problem is folded into
    /// the returned outcome and the session stats.
    pub async fn scrape_date<D: BrowserDriver>(
        &self,
        driver: &mut D,
        date: NaiveDate,
        stats: &mut SessionStats,
    ) -> PageOutcome {
        let url = self.urls.calendar(date, self.config.page_size);
        info!("Scraping earnings for {} ({})", date, url);

        if let Err(e) = driver.navigate(url.as_str()).await {
            return page_failed(date, e, stats);
        }

        self.config.page_delay.pause().await;

        match self.wait_for_table(driver).await {
            Ok(Some(selector)) => debug!("{}: table appeared for {:?}", date, selector),
            Ok(None) => {
                warn!("{}: no results table after {}s", date, self.config.table_timeout_secs);
                stats.pages_without_data += 1;
                return PageOutcome::NoTable;
            }
            Err(e) => return page_failed(date, e, stats),
        }

        let html = match driver.page_source().await {
            Ok(html) => html,
            Err(e) => return page_failed(date, e, stats),
        };

        let Some(table) = locate_table(&html, &self.config.table_selectors) else {
            warn!("{}: no selector strategy matched a table with rows", date);
            stats.pages_without_data += 1;
            return PageOutcome::NoTable;
        };

        let mut events = Vec::new();
        let mut row_errors = 0usize;

        for (i, row) in table.data_rows().iter().enumerate() {
            match self.parser.parse_row(row, date) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => debug!("{}: row {} skipped ({} cells)", date, i + 1, row.cells.len()),
                Err(e) => {
                    warn!("{}: row {}: {}", date, i + 1, e);
                    row_errors += 1;
                }
            }
        }

        stats.pages_scraped += 1;
        stats.events_found += events.len();
        stats.errors_encountered += row_errors;

        info!(
            "{}: {} events via {:?} ({} row errors)",
            date,
            events.len(),
            table.selector,
            row_errors
        );

        let script = pointer_moves_script(driver.window_size());
        if let Err(e) = driver.execute_script(&script).await {
            debug!("Pointer movement ignored: {}", e);
        }

        PageOutcome::Scraped { events, row_errors }
    }
}

fn page_failed(date: NaiveDate, e: DriverError, stats: &mut SessionStats) -> PageOutcome {
    error!("{}: page scrape failed: {}", date, e);
    stats.errors_encountered += 1;
    PageOutcome::Failed(ScrapeError::from_driver(e))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
