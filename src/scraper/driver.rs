use crate::config::StealthConfig;
use crate::scraper::stealth::{stealth_script, LaunchProfile};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} timed out after {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    #[error("browser session closed")]
    SessionClosed,

    #[error("browser command failed: {0}")]
    Command(String),
}

impl DriverError {
    /// The session cannot serve further requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionClosed | DriverError::Launch(_))
    }
}

// ── Driver capability surface ─────────────────────────────────────────────────

/// What the scraper needs from a browser. Element lookups run on a DOM
/// snapshot obtained through `page_source`.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// `Ok(false)` when nothing matched `selector` before `wait` elapsed.
    async fn wait_for_element(&mut self, selector: &str, wait: Duration) -> Result<bool, DriverError>;

    async fn page_source(&mut self) -> Result<String, DriverError>;

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Viewport the session was launched with.
    fn window_size(&self) -> (u32, u32);

    async fn quit(&mut self) -> Result<(), DriverError>;
}

/// Opens one browser session per run.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    type Driver: BrowserDriver;

    async fn launch(&self) -> Result<Self::Driver, DriverError>;
}

// ── Chromium ──────────────────────────────────────────────────────────────────

pub struct ChromeLauncher {
    stealth: StealthConfig,
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(stealth: &StealthConfig, navigation_timeout_secs: u64) -> Self {
        Self {
            stealth: stealth.clone(),
            navigation_timeout: Duration::from_secs(navigation_timeout_secs),
        }
    }

    async fn launch_once(&self) -> Result<ChromeDriver, DriverError> {
        let profile = LaunchProfile::pick(&self.stealth);
        info!(
            "Launching Chromium ({}x{}, headless={})",
            profile.window.0, profile.window.1, profile.headless
        );
        debug!("User agent: {}", profile.user_agent);

        let mut builder = BrowserConfig::builder()
            .window_size(profile.window.0, profile.window.1)
            .args(profile.browser_args());
        if !profile.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(stealth_script()))
            .await
        {
            handler_task.abort();
            return Err(DriverError::Launch(format!("stealth script injection: {}", e)));
        }

        Ok(ChromeDriver {
            browser,
            page,
            handler_task,
            window: profile.window,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

#[async_trait]
impl DriverLauncher for ChromeLauncher {
    type Driver = ChromeDriver;

    async fn launch(&self) -> Result<ChromeDriver, DriverError> {
        let strategy = ExponentialBackoff::from_millis(500)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.stealth.launch_retries);

        Retry::spawn(strategy, || async {
            self.launch_once().await.inspect_err(|e| warn!("{}", e))
        })
        .await
    }
}

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    window: (u32, u32),
    navigation_timeout: Duration,
}

impl ChromeDriver {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.handler_task.is_finished() {
            return Err(DriverError::SessionClosed);
        }
        Ok(())
    }
}

fn command_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Command(e.to_string())
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.check_open()?;
        debug!("GET {}", url);
        match timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(command_error(e)),
            Err(_) => Err(DriverError::NavigationTimeout {
                url: url.to_string(),
                secs: self.navigation_timeout.as_secs(),
            }),
        }
    }

    async fn wait_for_element(&mut self, selector: &str, wait: Duration) -> Result<bool, DriverError> {
        let quoted = serde_json::to_string(selector).map_err(command_error)?;
        let probe = format!("document.querySelector({}) !== null", quoted);
        let deadline = Instant::now() + wait;

        loop {
            self.check_open()?;
            let found = self
                .page
                .evaluate(probe.as_str())
                .await
                .map_err(command_error)?
                .into_value::<bool>()
                .unwrap_or(false);
            if found {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        self.check_open()?;
        self.page.content().await.map_err(command_error)
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value, DriverError> {
        self.check_open()?;
        let result = self.page.evaluate(script).await.map_err(command_error)?;
        Ok(result.into_value::<serde_json::Value>().unwrap_or(serde_json::Value::Null))
    }

    fn window_size(&self) -> (u32, u32) {
        self.window
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        info!("Closing browser session");
        let closed = self.browser.close().await.map(|_| ()).map_err(command_error);
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler_task.abort();
        closed
    }
}
