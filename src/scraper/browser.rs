//! Headless Chrome fallback. Launched on first use; one tab is reused for every page.
//!
//! A fetch navigates, waits out browser verification, scrolls like a reader to trigger
//! lazy-loaded content, waits for the expected container, and for articles dismisses the
//! sign-up dialog before serializing the DOM.

use crate::scraper::article::is_maintenance;
use crate::scraper::challenge::{
    ChallengeMachine, ChallengeOutcome, ChallengePolicy, ChallengeProbe, CHALLENGE_MARKERS,
};
use crate::scraper::fetch::{FetchStrategy, FetchedPage, Intent, Origin};
use crate::scraper::ScraperError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-popup-blocking",
    "--disable-notifications",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-infobars",
    "--dns-prefetch-disable",
];

const CLOSE_DIALOG: &str = r#"div[role="dialog"] svg"#;
const REMOVE_DIALOG_JS: &str =
    r#"(() => { const d = document.querySelector('div[role="dialog"]'); if (d) { d.remove(); } return true; })()"#;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SCROLL_STEP_PX: (u64, u64) = (100, 300);
const SCROLL_PAUSE_MS: (u64, u64) = (100, 300);

/// Launch and wait settings for the browser path.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Fixed User-Agent; a random desktop Chrome one is picked when None.
    pub user_agent: Option<String>,
    pub challenge: ChallengePolicy,
    /// Bounded wait for the listing/article container.
    pub element_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            challenge: ChallengePolicy::default(),
            element_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

struct BrowserSession {
    // Dropping the Browser kills the Chrome process.
    _browser: Browser,
    tab: Arc<Tab>,
}

/// [FetchStrategy] driving a real Chrome instance.
pub struct BrowserStrategy {
    options: BrowserOptions,
    session: Option<BrowserSession>,
}

impl BrowserStrategy {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    fn tab(&mut self) -> Result<Arc<Tab>, ScraperError> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(&session.tab));
        }
        let session = launch(&self.options)?;
        let tab = Arc::clone(&session.tab);
        self.session = Some(session);
        Ok(tab)
    }
}

fn launch(options: &BrowserOptions) -> Result<BrowserSession, ScraperError> {
    let launch_options = LaunchOptions {
        headless: options.headless,
        sandbox: false,
        args: LAUNCH_ARGS.iter().map(OsStr::new).collect(),
        idle_browser_timeout: Duration::from_secs(600),
        ..Default::default()
    };
    let browser = Browser::new(launch_options).map_err(ScraperError::browser("launching Chrome"))?;
    let tab = browser
        .new_tab()
        .map_err(ScraperError::browser("opening a tab"))?;
    let user_agent = match &options.user_agent {
        Some(ua) => ua.clone(),
        None => USER_AGENTS
            .choose(&mut rand::rng())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    };
    if !user_agent.is_empty() {
        tab.set_user_agent(&user_agent, Some("en-US,en;q=0.9"), None)
            .map_err(ScraperError::browser("setting the user agent"))?;
    }
    tab.set_default_timeout(options.navigation_timeout);
    info!(headless = options.headless, "launched Chrome");
    Ok(BrowserSession {
        _browser: browser,
        tab,
    })
}

/// Live tab as a [ChallengeProbe]: polls for the markers with a script.
struct TabProbe<'a> {
    tab: &'a Tab,
}

impl ChallengeProbe for TabProbe<'_> {
    fn markers_cleared(&mut self, timeout: Duration) -> Result<bool, ScraperError> {
        let script = format!("document.querySelector('{}') !== null", CHALLENGE_MARKERS);
        let deadline = Instant::now() + timeout;
        loop {
            let present = self
                .tab
                .evaluate(&script, false)
                .map_err(ScraperError::browser("probing for verification"))?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if !present {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn reload(&mut self) -> Result<(), ScraperError> {
        self.tab
            .reload(false, None)
            .map_err(ScraperError::browser("reloading"))?;
        Ok(())
    }
}

/// Scroll targets and pauses for one pass down a page of `total_height` pixels.
/// Positions strictly increase and the last one reaches the bottom.
pub fn scroll_plan<R: Rng + ?Sized>(total_height: u64, rng: &mut R) -> Vec<(u64, Duration)> {
    let mut plan = Vec::new();
    let mut position = 0u64;
    while position < total_height {
        position += rng.random_range(SCROLL_STEP_PX.0..=SCROLL_STEP_PX.1);
        let pause = rng.random_range(SCROLL_PAUSE_MS.0..=SCROLL_PAUSE_MS.1);
        plan.push((position, Duration::from_millis(pause)));
    }
    plan
}

fn human_scroll(tab: &Tab) -> Result<(), ScraperError> {
    let total_height = tab
        .evaluate("document.body.scrollHeight", false)
        .map_err(ScraperError::browser("measuring the page"))?
        .value
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .max(0.0) as u64;
    let plan = scroll_plan(total_height, &mut rand::rng());
    debug!(total_height, steps = plan.len(), "scrolling");
    for (position, pause) in plan {
        tab.evaluate(&format!("window.scrollTo(0, {});", position), false)
            .map_err(ScraperError::browser("scrolling"))?;
        std::thread::sleep(pause);
    }
    Ok(())
}

/// Close the sign-up dialog, or remove it from the DOM if it cannot be clicked.
fn dismiss_overlay(tab: &Tab) {
    let clicked = tab
        .find_element(CLOSE_DIALOG)
        .and_then(|el| el.click().map(|_| ()));
    match clicked {
        Ok(()) => debug!("closed dialog"),
        Err(_) => match tab.evaluate(REMOVE_DIALOG_JS, false) {
            Ok(_) => debug!("removed dialog"),
            Err(e) => debug!(error = %e, "could not dismiss dialog"),
        },
    }
    std::thread::sleep(Duration::from_millis(100));
}

impl FetchStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn fetch(&mut self, url: &str, intent: Intent) -> Result<FetchedPage, ScraperError> {
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(ScraperError::browser("navigating"))?
            .wait_until_navigated()
            .map_err(ScraperError::browser("waiting for navigation"))?;

        let mut machine = ChallengeMachine::new(self.options.challenge);
        if let ChallengeOutcome::Exhausted { attempts } = machine.run(&mut TabProbe { tab: &tab })? {
            return Err(ScraperError::ChallengeExhausted {
                url: url.to_string(),
                attempts,
            });
        }

        let snapshot = tab
            .get_content()
            .map_err(ScraperError::browser("reading the page"))?;
        if is_maintenance(&snapshot) {
            return Ok(FetchedPage {
                url: url.to_string(),
                html: snapshot,
                origin: Origin::Browser,
            });
        }

        human_scroll(&tab)?;
        let selector = intent.container_selector();
        tab.wait_for_element_with_custom_timeout(selector, self.options.element_timeout)
            .map_err(|_| ScraperError::ContainerTimeout {
                selector: selector.to_string(),
                url: url.to_string(),
            })?;
        if intent == Intent::Article {
            dismiss_overlay(&tab);
        }
        let html = tab
            .get_content()
            .map_err(ScraperError::browser("reading the page"))?;
        debug!(url, bytes = html.len(), "fetched with browser");
        Ok(FetchedPage {
            url: url.to_string(),
            html,
            origin: Origin::Browser,
        })
    }
}
