//! In-memory browser for tests: serves fixture HTML keyed by URL fragment.

use super::driver::{BrowserDriver, DriverError, DriverLauncher};
use crate::config::{AppConfig, DelayRange};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const EMPTY_PAGE: &str = "<html><body></body></html>";

/// Everything the fixture driver was asked to do, shared across clones.
#[derive(Debug, Default)]
pub struct DriverLog {
    pub visited: Vec<String>,
    pub scripts: usize,
    pub quits: usize,
}

#[derive(Clone, Default)]
pub struct FixtureDriver {
    pages: Vec<(String, String)>,
    timeouts: Vec<String>,
    fail_scripts: bool,
    /// Session dies once this many navigations have been served.
    lose_session_after: Option<usize>,
    current: Option<String>,
    log: Arc<Mutex<DriverLog>>,
}

impl FixtureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for any URL containing `fragment`.
    pub fn page(mut self, fragment: &str, html: &str) -> Self {
        self.pages.push((fragment.to_string(), html.to_string()));
        self
    }

    pub fn timeout_on(mut self, fragment: &str) -> Self {
        self.timeouts.push(fragment.to_string());
        self
    }

    pub fn failing_scripts(mut self) -> Self {
        self.fail_scripts = true;
        self
    }

    pub fn lose_session_after(mut self, navigations: usize) -> Self {
        self.lose_session_after = Some(navigations);
        self
    }

    pub fn log(&self) -> MutexGuard<'_, DriverLog> {
        self.log.lock().unwrap()
    }

    pub fn shared_log(&self) -> Arc<Mutex<DriverLog>> {
        Arc::clone(&self.log)
    }

    fn html(&self) -> &str {
        self.current.as_deref().unwrap_or(EMPTY_PAGE)
    }
}

fn matches_any(html: &str, selector: &str) -> bool {
    let doc = ::scraper::Html::parse_document(html);
    ::scraper::Selector::parse(selector)
        .map(|sel| doc.select(&sel).next().is_some())
        .unwrap_or(false)
}

#[async_trait]
impl BrowserDriver for FixtureDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        {
            let mut log = self.log();
            if self.lose_session_after.is_some_and(|n| log.visited.len() >= n) {
                return Err(DriverError::SessionClosed);
            }
            log.visited.push(url.to_string());
        }

        if self.timeouts.iter().any(|f| url.contains(f.as_str())) {
            self.current = None;
            return Err(DriverError::NavigationTimeout { url: url.to_string(), secs: 0 });
        }

        self.current = self
            .pages
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, html)| html.clone());
        Ok(())
    }

    async fn wait_for_element(&mut self, selector: &str, _wait: Duration) -> Result<bool, DriverError> {
        Ok(matches_any(self.html(), selector))
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        Ok(self.html().to_string())
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value, DriverError> {
        self.log().scripts += 1;
        if self.fail_scripts {
            return Err(DriverError::Command("script blocked".into()));
        }
        Ok(serde_json::Value::Bool(true))
    }

    fn window_size(&self) -> (u32, u32) {
        (1280, 800)
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.log().quits += 1;
        Ok(())
    }
}

/// Hands out clones of one fixture driver; they share a log.
pub struct FixtureLauncher {
    pub driver: FixtureDriver,
    pub fail: bool,
}

#[async_trait]
impl DriverLauncher for FixtureLauncher {
    type Driver = FixtureDriver;

    async fn launch(&self) -> Result<FixtureDriver, DriverError> {
        if self.fail {
            return Err(DriverError::Launch("no browser in test".into()));
        }
        Ok(self.driver.clone())
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Config with every pause and wait disabled.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.scraper.base_url = "https://calendar.test".to_string();
    cfg.scraper.page_delay = DelayRange::none();
    cfg.scraper.inter_page_delay = DelayRange::none();
    cfg.scraper.table_timeout_secs = 0;
    cfg.enrichment.delay = DelayRange::none();
    cfg
}

/// Calendar page with a header row followed by `rows`. The first cell of
/// each row becomes a quote link titled "<SYMBOL> Inc.".
pub fn calendar_html(rows: &[&[&str]]) -> String {
    let mut body = String::from(
        "<table data-test=\"cal-table\"><thead><tr><th>Symbol</th><th>Time</th><th>EPS Estimate</th><th>Revenue</th></tr></thead><tbody>",
    );
    for row in rows {
        body.push_str("<tr>");
        for (i, cell) in row.iter().enumerate() {
            if i == 0 {
                body.push_str(&format!("<td><a href=\"/quote/{0}\" title=\"{0} Inc.\">{0}</a></td>", cell));
            } else {
                body.push_str(&format!("<td>{}</td>", cell));
            }
        }
        body.push_str("</tr>");
    }
    body.push_str("</tbody></table>");
    format!("<html><body>{}</body></html>", body)
}

pub fn quote_html(sector: Option<&str>, market_cap: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(sector) = sector {
        body.push_str(&format!("<span data-test=\"SECTOR\">{}</span>", sector));
    }
    if let Some(cap) = market_cap {
        body.push_str(&format!(
            "<table><tr><td>Market Cap</td><td data-test=\"MARKET_CAP-value\">{}</td></tr></table>",
            cap
        ));
    }
    format!("<html><body>{}</body></html>", body)
}
