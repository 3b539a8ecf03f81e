use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub stealth: StealthConfig,
    pub enrichment: EnrichmentConfig,
    pub export: ExportConfig,
}

/// Inclusive bounds for a randomized pause, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// No pause at all.
    #[cfg(test)]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }
}

/// Calendar scraping configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,

    /// Rows requested per calendar page.
    pub page_size: u32,

    pub navigation_timeout_secs: u64,

    /// Upper bound on waiting for the results table to appear.
    pub table_timeout_secs: u64,

    /// Pause after each navigation, before the DOM is inspected.
    pub page_delay: DelayRange,

    /// Pause between two calendar days. Longer than `page_delay`.
    pub inter_page_delay: DelayRange,

    /// Tried in order; the first selector matching a table with rows wins.
    pub table_selectors: Vec<String>,

    /// Cell texts meaning "no value" (compared case-insensitively).
    pub not_available_tokens: Vec<String>,
}

/// Browser launch settings used to look like a manual session
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StealthConfig {
    pub headless: bool,
    pub user_agents: Vec<String>,
    pub window_sizes: Vec<(u32, u32)>,
    pub launch_retries: usize,
}

/// Per-symbol detail page pass
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub limit: usize,
    pub delay: DelayRange,
    pub sector_selectors: Vec<String>,
    pub market_cap_selectors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finance.yahoo.com".to_string(),
            page_size: 100,
            navigation_timeout_secs: 30,
            table_timeout_secs: 15,
            page_delay: DelayRange::new(2_000, 5_000),
            inter_page_delay: DelayRange::new(5_000, 10_000),
            table_selectors: strings(&[
                "table[data-test='cal-table']",
                "#cal-res-table table",
                "div[data-testid='cal-table'] table",
                "section table",
                "table",
            ]),
            not_available_tokens: strings(&["N/A", "NA", "TBD", "--", "-", "—", ""]),
        }
    }
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agents: strings(&[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
            ]),
            window_sizes: vec![(1920, 1080), (1680, 1050), (1536, 864), (1440, 900), (1366, 768)],
            launch_retries: 3,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            delay: DelayRange::new(1_000, 3_000),
            sector_selectors: strings(&[
                "[data-test='SECTOR']",
                "[data-testid='sector'] a",
                "a[href*='/sectors/']",
            ]),
            market_cap_selectors: strings(&[
                "td[data-test='MARKET_CAP-value']",
                "fin-streamer[data-field='marketCap']",
                "[data-testid='MARKET_CAP-value']",
            ]),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("EARNINGS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize()
            .context("Invalid configuration")
    }
}
