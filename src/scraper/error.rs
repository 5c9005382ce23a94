//! Error types for fetching, challenge handling, extraction, and persistence.

use thiserror::Error;

/// Shared scraper error for URLs, HTTP, browser automation, and output.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Listing or article, for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Empty response body from {url}")]
    EmptyBody { url: String },

    #[error("Failed to build HTTP client: {source}")]
    ClientBuild { source: reqwest::Error },

    // Anti-bot challenge
    #[error("Challenge page served instead of content at {url}")]
    ChallengePage { url: String },

    #[error("Browser verification did not clear after {attempts} attempt(s) at {url}")]
    ChallengeExhausted { url: String, attempts: u32 },

    // Browser automation
    #[error("Browser error while {context}: {message}")]
    Browser { context: String, message: String },

    #[error("Timed out waiting for {selector} at {url}")]
    ContainerTimeout { selector: String, url: String },

    #[error("Expected {selector} missing from {url}")]
    MissingContainer { selector: String, url: String },

    #[error("All fetch strategies failed for {url} (primary: {primary}; fallback: {fallback})")]
    FetchFailed {
        url: String,
        primary: String,
        fallback: String,
    },

    #[error("No fetch strategy configured")]
    NoStrategy,

    // Extraction
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("No articles found on listing page {url}")]
    EmptyListing { url: String },

    // Output and local state
    #[error("Failed to write output {path}: {source}")]
    Persistence {
        path: std::path::PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write session cache {path}: {source}")]
    SessionCache {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl ScraperError {
    /// Wrap a `headless_chrome` failure with what we were doing at the time.
    pub(crate) fn browser(context: &str) -> impl FnOnce(anyhow::Error) -> ScraperError + '_ {
        move |e| ScraperError::Browser {
            context: context.to_string(),
            message: format!("{:#}", e),
        }
    }
}

/// Why an article page could not be turned into a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Article container not found")]
    MissingContainer,

    #[error("Article container has no paragraph text")]
    EmptyContent,

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_error_keeps_context_and_message() {
        let err = ScraperError::browser("navigating")(anyhow::anyhow!("tab crashed"));
        assert_eq!(err.to_string(), "Browser error while navigating: tab crashed");
    }

    #[test]
    fn fetch_failed_mentions_both_strategies() {
        let err = ScraperError::FetchFailed {
            url: "https://example.com/".into(),
            primary: "HTTP 403".into(),
            fallback: "timeout".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("primary: HTTP 403"));
        assert!(msg.contains("fallback: timeout"));
    }
}
