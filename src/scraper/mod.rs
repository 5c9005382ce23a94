//! Fetching and extraction. Seed validation, strategy selection, and re-exports.

pub mod article;
pub mod browser;
pub mod challenge;
mod client;
mod error;
pub mod fetch;
pub mod listing;
pub mod page;

pub use article::{ArticleExtractor, SkipReason, Stage};
pub use browser::{BrowserOptions, BrowserStrategy};
pub use challenge::{ChallengeMachine, ChallengeOutcome, ChallengePolicy};
pub use client::{BrowserFamily, BrowserSignature, BypassClient, BypassClientBuilder, Platform};
pub use error::{ExtractError, ScraperError};
pub use fetch::{FetchCoordinator, FetchStrategy, FetchedPage, HttpStrategy, Intent, Origin};
pub use listing::{CrawlScope, ListingBatch, PageWalk};

use reqwest::Url;

/// Default listing page.
pub const DEFAULT_LISTING_URL: &str = "https://www.investing.com/news/forex-news";

/// Which strategies the coordinator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// HTTP only.
    Http,
    /// Browser only.
    Browser,
    /// HTTP first, browser on failure (default).
    #[default]
    Chain,
}

impl FetchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(FetchMode::Http),
            "browser" => Some(FetchMode::Browser),
            "chain" => Some(FetchMode::Chain),
            _ => None,
        }
    }
}

/// Validate the listing URL: absolute http(s) with a host.
pub fn resolve_seed(input: &str) -> Result<Url, ScraperError> {
    let url = Url::parse(input.trim()).map_err(|e| ScraperError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScraperError::InvalidUrl {
            input: input.to_string(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ScraperError::InvalidUrl {
            input: input.to_string(),
            reason: "URL has no host".to_string(),
        });
    }
    Ok(url)
}

/// Coordinator for `mode`. The browser is only launched if the coordinator uses it.
pub fn build_coordinator(
    mode: FetchMode,
    http: HttpStrategy,
    browser: BrowserStrategy,
) -> FetchCoordinator {
    match mode {
        FetchMode::Http => FetchCoordinator::single(Box::new(http)),
        FetchMode::Browser => FetchCoordinator::single(Box::new(browser)),
        FetchMode::Chain => FetchCoordinator::chain(Box::new(http), Box::new(browser)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_accepts_listing_url() -> Result<(), ScraperError> {
        let url = resolve_seed(DEFAULT_LISTING_URL)?;
        assert_eq!(url.host_str(), Some("www.investing.com"));
        Ok(())
    }

    #[test]
    fn seed_rejects_invalid_url() -> Result<(), String> {
        let result = resolve_seed("not-a-url");
        match &result {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "not-a-url" => Ok(()),
            _ => Err(format!("expected InvalidUrl, got {:?}", result)),
        }
    }

    #[test]
    fn seed_rejects_non_http_scheme() {
        assert!(matches!(
            resolve_seed("file:///tmp/listing.html"),
            Err(ScraperError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn fetch_mode_parsing() {
        assert_eq!(FetchMode::parse("HTTP"), Some(FetchMode::Http));
        assert_eq!(FetchMode::parse(" browser "), Some(FetchMode::Browser));
        assert_eq!(FetchMode::parse("chain"), Some(FetchMode::Chain));
        assert_eq!(FetchMode::parse("curl"), None);
        assert_eq!(FetchMode::default(), FetchMode::Chain);
    }
}
