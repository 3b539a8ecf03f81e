//! Secondary pass visiting quote pages to add `sector` and `market_cap`.

use crate::config::EnrichmentConfig;
use crate::models::{EarningsEvent, SessionStats};
use crate::scraper::driver::{BrowserDriver, DriverError};
use crate::scraper::parsers::{parse_quote_details, QuoteDetails};
use crate::scraper::SiteUrls;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum EnrichOutcome {
    Enriched,
    /// One of the two attributes was found.
    Partial,
    NotFound,
    Failed(DriverError),
}

/// Result of one enrichment pass. `session_lost` is set when the browser
/// died mid-batch; events from that point on are returned unchanged.
#[derive(Debug)]
pub struct EnrichBatch {
    pub events: Vec<EarningsEvent>,
    pub session_lost: Option<DriverError>,
}

pub struct Enricher {
    urls: SiteUrls,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(urls: SiteUrls, config: &EnrichmentConfig) -> Self {
        Self { urls, config: config.clone() }
    }

    async fn lookup<D: BrowserDriver>(&self, driver: &mut D, symbol: &str) -> Result<QuoteDetails, DriverError> {
        driver.navigate(self.urls.quote(symbol).as_str()).await?;
        self.config.delay.pause().await;
        let html = driver.page_source().await?;
        let details = parse_quote_details(&html, &self.config.sector_selectors, &self.config.market_cap_selectors);
        self.config.delay.pause().await;
        Ok(details)
    }

    /// Looks up one symbol and returns the enriched copy alongside what
    /// happened. On failure the original event is returned as is.
    pub async fn enrich_one<D: BrowserDriver>(
        &self,
        driver: &mut D,
        event: &EarningsEvent,
    ) -> (EarningsEvent, EnrichOutcome) {
        match self.lookup(driver, &event.symbol).await {
            Ok(details) => {
                let outcome = match (&details.sector, &details.market_cap) {
                    (Some(_), Some(_)) => EnrichOutcome::Enriched,
                    (None, None) => EnrichOutcome::NotFound,
                    _ => EnrichOutcome::Partial,
                };
                (event.enriched(details.sector, details.market_cap), outcome)
            }
            Err(e) => (event.clone(), EnrichOutcome::Failed(e)),
        }
    }

    /// Enriches the first `limit` events; the rest pass through untouched.
    pub async fn enrich<D: BrowserDriver>(
        &self,
        driver: &mut D,
        events: Vec<EarningsEvent>,
        stats: &mut SessionStats,
    ) -> EnrichBatch {
        let limit = self.config.limit.min(events.len());
        info!("Enriching {} of {} events", limit, events.len());

        let mut out = Vec::with_capacity(events.len());
        let mut pending = events.into_iter();
        let mut session_lost = None;

        for event in pending.by_ref().take(limit) {
            let (enriched, outcome) = self.enrich_one(driver, &event).await;
            match outcome {
                EnrichOutcome::Enriched | EnrichOutcome::Partial => {
                    debug!("{}: sector={:?} market_cap={:?}", enriched.symbol, enriched.sector, enriched.market_cap);
                    stats.events_enriched += 1;
                }
                EnrichOutcome::NotFound => debug!("{}: no detail attributes found", event.symbol),
                EnrichOutcome::Failed(e) => {
                    warn!("{}: enrichment failed: {}", event.symbol, e);
                    stats.enrichment_failures += 1;
                    if e.is_fatal() {
                        out.push(enriched);
                        session_lost = Some(e);
                        break;
                    }
                }
            }
            out.push(enriched);
        }

        out.extend(pending);
        info!("Enrichment done: {} enriched, {} failed", stats.events_enriched, stats.enrichment_failures);

        EnrichBatch { events: out, session_lost }
    }
}
