//! Launch-time disguise and human-like pacing.
//!
//! Nothing here talks to the browser directly: it produces the user agent,
//! window size, init script and pointer-movement script the driver applies,
//! and the randomized pauses the scraper awaits.

use crate::config::{DelayRange, StealthConfig};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const FALLBACK_WINDOW: (u32, u32) = (1920, 1080);

// ── Launch profile ────────────────────────────────────────────────────────────

/// One randomized identity, picked once per browser session.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchProfile {
    pub user_agent: String,
    pub window: (u32, u32),
    pub headless: bool,
}

impl LaunchProfile {
    pub fn pick(config: &StealthConfig) -> Self {
        let mut rng = rand::rng();

        let user_agent = if config.user_agents.is_empty() {
            FALLBACK_USER_AGENT.to_string()
        } else {
            config.user_agents[rng.random_range(0..config.user_agents.len())].clone()
        };

        let window = if config.window_sizes.is_empty() {
            FALLBACK_WINDOW
        } else {
            config.window_sizes[rng.random_range(0..config.window_sizes.len())]
        };

        Self { user_agent, window, headless: config.headless }
    }

    /// Chromium command-line switches for this profile.
    pub fn browser_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-infobars".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--lang=en-US".to_string(),
        ]
    }
}

/// Evaluated before any page script so automation markers are gone by the
/// time the site's own checks run.
pub fn stealth_script() -> &'static str {
    r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5], configurable: true });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
  window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters)
  );
}
delete window.__webdriver_script_fn;
delete document.__webdriver_evaluate;
delete document.__selenium_evaluate;
"#
}

// ── Pacing ────────────────────────────────────────────────────────────────────

impl DelayRange {
    /// Uniform sample within the bounds; swapped bounds are tolerated.
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    pub async fn pause(&self) {
        let d = self.sample();
        if d.is_zero() {
            return;
        }
        debug!("Pausing {:?}", d);
        sleep(d).await;
    }
}

// ── Pointer movement ──────────────────────────────────────────────────────────

/// Script dispatching a short burst of `mousemove` events at random points
/// inside the given viewport.
pub fn pointer_moves_script(window: (u32, u32)) -> String {
    let points: Vec<(u32, u32)> = {
        let mut rng = rand::rng();
        let moves = rng.random_range(3..=7);
        let max_x = window.0.max(200) - 100;
        let max_y = window.1.max(200) - 100;
        (0..moves)
            .map(|_| (rng.random_range(80..=max_x), rng.random_range(80..=max_y)))
            .collect()
    };

    let coords = points
        .iter()
        .map(|(x, y)| format!("[{},{}]", x, y))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "(() => {{ for (const [x, y] of [{}]) {{ \
            const t = document.elementFromPoint(x, y) || document.body; \
            if (t) t.dispatchEvent(new MouseEvent('mousemove', {{ clientX: x, clientY: y, bubbles: true }})); \
        }} return true; }})()",
        coords
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let range = DelayRange::new(10, 20);
        for _ in 0..100 {
            let d = range.sample().as_millis() as u64;
            assert!((10..=20).contains(&d));
        }
        let swapped = DelayRange::new(30, 5).sample();
        assert!(swapped >= Duration::from_millis(5) && swapped <= Duration::from_millis(30));
        assert_eq!(DelayRange::none().sample(), Duration::ZERO);
    }

    #[test]
    fn test_profile_picks_from_pool() {
        let cfg = StealthConfig::default();
        for _ in 0..20 {
            let profile = LaunchProfile::pick(&cfg);
            assert!(cfg.user_agents.contains(&profile.user_agent));
            assert!(cfg.window_sizes.contains(&profile.window));
        }
    }

    #[test]
    fn test_profile_empty_pools_fall_back() {
        let cfg = StealthConfig {
            user_agents: vec![],
            window_sizes: vec![],
            ..StealthConfig::default()
        };
        let profile = LaunchProfile::pick(&cfg);
        assert_eq!(profile.user_agent, FALLBACK_USER_AGENT);
        assert_eq!(profile.window, FALLBACK_WINDOW);
        assert!(profile.browser_args()[0].starts_with("--user-agent=Mozilla"));
    }

    #[test]
    fn test_pointer_script_stays_in_viewport() {
        let script = pointer_moves_script((300, 250));
        assert!(script.contains("mousemove"));
        let inner = script.split("of [").nth(1).unwrap().split("]]").next().unwrap();
        for pair in inner.split("],[") {
            let nums: Vec<u32> = pair
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(|n| n.parse().unwrap())
                .collect();
            assert!(nums[0] <= 200 && nums[1] <= 150);
        }
    }
}
