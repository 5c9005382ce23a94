//! Anti-bot verification handling.
//!
//! After navigation the page is probed for the verification interstitial. A probe waits up
//! to a bounded timeout for the markers to go away; a failed probe is followed by a
//! backoff and a reload, up to a fixed number of attempts.

use crate::scraper::ScraperError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Markers of the "checking your browser" interstitial.
pub const CHALLENGE_MARKERS: &str = "#challenge-form, .cf-browser-verification";

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BACKOFF_SECS: u64 = 10;
const DEFAULT_SETTLE_SECS: u64 = 5;

/// Whether markup (as served, before any script runs) is a verification page.
pub fn has_challenge_markers(html: &str) -> bool {
    let doc = scraper::Html::parse_document(html);
    match crate::scraper::page::parse_selector(CHALLENGE_MARKERS) {
        Ok(sel) => doc.select(&sel).next().is_some(),
        Err(_) => false,
    }
}

/// A page that can be checked for verification markers and reloaded.
pub trait ChallengeProbe {
    /// Wait up to `timeout` for the markers to disappear. `Ok(true)` once they are gone.
    fn markers_cleared(&mut self, timeout: Duration) -> Result<bool, ScraperError>;

    fn reload(&mut self) -> Result<(), ScraperError>;
}

/// Attempts, per-probe wait, backoff before reload, and settle delay after passing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengePolicy {
    pub attempts: u32,
    pub probe_timeout: Duration,
    pub backoff: Duration,
    pub settle: Duration,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            settle: Duration::from_secs(DEFAULT_SETTLE_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Unknown,
    ChallengePresent { attempt: u32 },
    Passed,
    Exhausted,
}

/// Result of running the machine. Exhaustion is an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Passed { attempts: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub struct ChallengeMachine {
    policy: ChallengePolicy,
    state: ChallengeState,
}

impl ChallengeMachine {
    pub fn new(policy: ChallengePolicy) -> Self {
        Self {
            policy,
            state: ChallengeState::Unknown,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Probe until the markers clear or attempts run out. Probe/reload errors propagate.
    pub fn run<P: ChallengeProbe + ?Sized>(
        &mut self,
        probe: &mut P,
    ) -> Result<ChallengeOutcome, ScraperError> {
        self.state = ChallengeState::Unknown;
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            if probe.markers_cleared(self.policy.probe_timeout)? {
                if attempt > 1 {
                    info!(attempt, "browser verification passed");
                } else {
                    debug!("no browser verification pending");
                }
                self.state = ChallengeState::Passed;
                std::thread::sleep(self.policy.settle);
                return Ok(ChallengeOutcome::Passed { attempts: attempt });
            }
            self.state = ChallengeState::ChallengePresent { attempt };
            warn!(attempt, of = attempts, "browser verification still present");
            if attempt < attempts {
                std::thread::sleep(self.policy.backoff);
                probe.reload()?;
            }
        }
        self.state = ChallengeState::Exhausted;
        Ok(ChallengeOutcome::Exhausted { attempts })
    }
}
