//! Page acquisition: a fast HTTP path, a slow browser path, and the coordinator that
//! chains them.

use crate::scraper::article::{is_maintenance, ARTICLE_CONTAINER};
use crate::scraper::challenge::has_challenge_markers;
use crate::scraper::client::BypassClient;
use crate::scraper::listing::ARTICLE_ITEM;
use crate::scraper::page::parse_selector;
use crate::scraper::ScraperError;
use crate::session::SessionCache;
use reqwest::Url;
use tracing::{debug, info, warn};

/// What kind of page is being fetched; decides which container the browser waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Listing,
    Article,
}

impl Intent {
    /// Element that must be present once the page has loaded.
    pub fn container_selector(self) -> &'static str {
        match self {
            Intent::Listing => ARTICLE_ITEM,
            Intent::Article => ARTICLE_CONTAINER,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::Listing => "listing",
            Intent::Article => "article",
        }
    }
}

/// Which strategy produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Http,
    Browser,
}

/// Whether `html` contains the element `intent` waits for. Maintenance pages count as
/// usable so the extractor can report them.
pub fn has_expected_content(html: &str, intent: Intent) -> bool {
    if is_maintenance(html) {
        return true;
    }
    let doc = scraper::Html::parse_document(html);
    match parse_selector(intent.container_selector()) {
        Ok(sel) => doc.select(&sel).next().is_some(),
        Err(_) => true,
    }
}

/// Markup for one URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub origin: Origin,
}

/// One way of turning a URL into markup.
pub trait FetchStrategy {
    fn name(&self) -> &'static str;

    fn fetch(&mut self, url: &str, intent: Intent) -> Result<FetchedPage, ScraperError>;
}

/// Plain GET through [BypassClient]. Saves the cookie jar after every successful fetch.
pub struct HttpStrategy {
    client: BypassClient,
    cache: Option<SessionCache>,
}

impl HttpStrategy {
    pub fn new(client: BypassClient, cache: Option<SessionCache>) -> Self {
        Self { client, cache }
    }

    fn persist_session(&self, url: &str) {
        let Some(cache) = &self.cache else { return };
        let Ok(parsed) = Url::parse(url) else { return };
        let tokens = self.client.tokens_for(&parsed);
        if tokens.is_empty() {
            return;
        }
        if let Err(e) = cache.save(&tokens) {
            warn!(error = %e, "could not save session cache");
        }
    }
}

impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch(&mut self, url: &str, intent: Intent) -> Result<FetchedPage, ScraperError> {
        let response = self.client.get(url).map_err(|e| ScraperError::Network {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                context: Some(intent.label().to_string()),
            });
        }
        let html = response
            .text()
            .map_err(|e| ScraperError::BodyRead { source: e })?;
        if html.trim().is_empty() {
            return Err(ScraperError::EmptyBody {
                url: url.to_string(),
            });
        }
        if has_challenge_markers(&html) {
            return Err(ScraperError::ChallengePage {
                url: url.to_string(),
            });
        }
        self.persist_session(url);
        debug!(url, bytes = html.len(), "fetched over http");
        Ok(FetchedPage {
            url: url.to_string(),
            html,
            origin: Origin::Http,
        })
    }
}

/// Tries the primary strategy, then the fallback once. Never runs both for one call
/// unless the primary failed. With a fallback configured, a primary page missing the
/// intent's container counts as a failure.
pub struct FetchCoordinator {
    primary: Option<Box<dyn FetchStrategy>>,
    fallback: Option<Box<dyn FetchStrategy>>,
}

impl FetchCoordinator {
    /// Primary with fallback.
    pub fn chain(primary: Box<dyn FetchStrategy>, fallback: Box<dyn FetchStrategy>) -> Self {
        Self {
            primary: Some(primary),
            fallback: Some(fallback),
        }
    }

    /// A single strategy with no fallback.
    pub fn single(strategy: Box<dyn FetchStrategy>) -> Self {
        Self {
            primary: Some(strategy),
            fallback: None,
        }
    }

    pub fn fetch(&mut self, url: &str, intent: Intent) -> Result<FetchedPage, ScraperError> {
        let has_fallback = self.fallback.is_some();
        let primary_err = match self.primary.as_mut() {
            Some(primary) => match primary.fetch(url, intent) {
                Ok(page) if !has_fallback || has_expected_content(&page.html, intent) => {
                    return Ok(page)
                }
                Ok(_) => {
                    let e = ScraperError::MissingContainer {
                        selector: intent.container_selector().to_string(),
                        url: url.to_string(),
                    };
                    warn!(url, strategy = primary.name(), error = %e, "primary page incomplete");
                    Some(e)
                }
                Err(e) => {
                    warn!(url, strategy = primary.name(), error = %e, "primary fetch failed");
                    Some(e)
                }
            },
            None => None,
        };
        let Some(fallback) = self.fallback.as_mut() else {
            return Err(primary_err.unwrap_or(ScraperError::NoStrategy));
        };
        info!(url, strategy = fallback.name(), kind = intent.label(), "using fallback fetch");
        match (fallback.fetch(url, intent), primary_err) {
            (Ok(page), _) => Ok(page),
            (Err(e @ ScraperError::ChallengeExhausted { .. }), _) | (Err(e), None) => Err(e),
            (Err(e), Some(p)) => Err(ScraperError::FetchFailed {
                url: url.to_string(),
                primary: p.to_string(),
                fallback: e.to_string(),
            }),
        }
    }
}
