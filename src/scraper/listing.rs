//! Listing pages: article stubs, next-page resolution, and the page walk.

use crate::model::ArticleStub;
use crate::scraper::error::ExtractError;
use crate::scraper::fetch::{FetchCoordinator, Intent};
use crate::scraper::page::{PageSource, StaticPage};
use crate::scraper::ScraperError;
use chrono::NaiveDateTime;
use reqwest::Url;
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One entry in the news feed.
pub const ARTICLE_ITEM: &str = r#"article[data-test="article-item"]"#;
const TITLE_LINK: &str = r#"a[data-test="article-title-link"]"#;
const PUBLISH_TIME: &str = r#"time[data-test="article-publish-date"]"#;
const PUBLISH_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PAGINATION: &str = "div.flex.gap-2";

pub const DEFAULT_LATEST_LIMIT: usize = 5;
pub const DEFAULT_PER_PAGE_TAIL: usize = 35;

/// Parsed listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub stubs: Vec<ArticleStub>,
    /// Article elements seen, including ones skipped for a missing title or link.
    pub item_count: usize,
    pub next: Option<String>,
}

/// Parse the publish timestamp from a `datetime` attribute.
pub fn parse_publish_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), PUBLISH_FORMAT).ok()
}

/// Stubs in document order plus the next page link, if any.
pub fn parse_listing(
    html: &str,
    page_url: &Url,
    current_page: u32,
) -> Result<ListingPage, ExtractError> {
    let doc = Html::parse_document(html);
    let page = StaticPage::new(&doc);
    let items = page.find_all(ARTICLE_ITEM)?;
    let mut stubs = Vec::with_capacity(items.len());
    for item in &items {
        let Some(link) = page.find_within(*item, TITLE_LINK)?.into_iter().next() else {
            continue;
        };
        let title = page.text(link);
        let Some(href) = page.attr(link, "href").filter(|h| !h.trim().is_empty()) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let Ok(resolved) = page_url.join(href.trim()) else {
            debug!(href = %href, "unresolvable article link");
            continue;
        };
        let published_at = page
            .find_within(*item, PUBLISH_TIME)?
            .into_iter()
            .next()
            .and_then(|t| page.attr(t, "datetime"))
            .and_then(|raw| parse_publish_time(&raw));
        stubs.push(ArticleStub {
            title,
            link: resolved.to_string(),
            published_at,
        });
    }
    let next = resolve_next_link(&page, page_url, current_page)?;
    Ok(ListingPage {
        stubs,
        item_count: items.len(),
        next,
    })
}

/// A link labelled "next" wins; otherwise the numbered link for `current_page + 1`
/// inside the pagination bar.
pub fn resolve_next_link<'a, P: PageSource<'a>>(
    page: &P,
    page_url: &Url,
    current_page: u32,
) -> Result<Option<String>, ExtractError> {
    let resolve = |href: String| page_url.join(&href).ok().map(|u| u.to_string());

    for a in page.find_all("a[href]")? {
        if page.text(a).eq_ignore_ascii_case("next") {
            if let Some(url) = page.attr(a, "href").and_then(resolve) {
                return Ok(Some(url));
            }
        }
    }

    let wanted = (current_page + 1).to_string();
    for region in page.find_all(PAGINATION)? {
        for a in page.find_within(region, "a[href]")? {
            if page.text(a) == wanted {
                if let Some(url) = page.attr(a, "href").and_then(resolve) {
                    return Ok(Some(url));
                }
            }
        }
    }
    Ok(None)
}

/// Last all-digit path segment, e.g. `/news/forex-news/3` -> 3.
pub fn page_number(url: &Url) -> Option<u32> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
}

/// Newest first. Stubs without a timestamp keep their relative order at the end.
pub fn sort_by_recency(stubs: &mut [ArticleStub]) {
    stubs.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// How much of the listing to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlScope {
    /// The seed page only; newest `limit` stubs.
    FirstPage { limit: usize },
    /// Every page until the walk ends; the last `per_page_tail` stubs of each page.
    AllPages { per_page_tail: usize },
}

/// Stubs selected from one listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingBatch {
    pub page_url: String,
    pub page_number: u32,
    pub stubs: Vec<ArticleStub>,
}

/// Pull-based walk over listing pages. Never fetches the same URL twice.
#[derive(Debug)]
pub struct PageWalk {
    next_url: Option<String>,
    page_number: u32,
    scope: CrawlScope,
    visited: HashSet<String>,
}

impl PageWalk {
    pub fn new(seed: &str, scope: CrawlScope) -> Self {
        let page_number = Url::parse(seed)
            .ok()
            .and_then(|u| page_number(&u))
            .unwrap_or(1);
        Self {
            next_url: Some(seed.to_string()),
            page_number,
            scope,
            visited: HashSet::new(),
        }
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    /// Fetch and parse the next page. `None` once the walk is over; an error is yielded
    /// once and ends the walk.
    pub fn next_batch(
        &mut self,
        fetcher: &mut FetchCoordinator,
    ) -> Option<Result<ListingBatch, ScraperError>> {
        let url = self.next_url.take()?;
        if !self.visited.insert(url.clone()) {
            info!(url = %url, "listing page already visited; stopping");
            return None;
        }
        let page_url = match Url::parse(&url) {
            Ok(u) => u,
            Err(e) => {
                return Some(Err(ScraperError::InvalidUrl {
                    input: url,
                    reason: e.to_string(),
                }))
            }
        };
        info!(page = self.page_number, url = %url, "fetching listing page");
        let fetched = match fetcher.fetch(&url, Intent::Listing) {
            Ok(p) => p,
            Err(e) => return Some(Err(e)),
        };
        let listing = match parse_listing(&fetched.html, &page_url, self.page_number) {
            Ok(l) => l,
            Err(e) => return Some(Err(e.into())),
        };
        if listing.item_count == 0 {
            warn!(url = %url, "no articles on listing page");
            return Some(Err(ScraperError::EmptyListing { url }));
        }

        let current = self.page_number;
        let stubs = match self.scope {
            CrawlScope::FirstPage { limit } => {
                let mut stubs = listing.stubs;
                sort_by_recency(&mut stubs);
                stubs.truncate(limit);
                stubs
            }
            CrawlScope::AllPages { per_page_tail } => {
                if let Some(next) = listing.next {
                    self.page_number = Url::parse(&next)
                        .ok()
                        .and_then(|u| page_number(&u))
                        .unwrap_or(current + 1);
                    self.next_url = Some(next);
                } else {
                    debug!(page = current, "no next page link");
                }
                let skip = listing.stubs.len().saturating_sub(per_page_tail);
                listing.stubs.into_iter().skip(skip).collect()
            }
        };
        debug!(page = current, stubs = stubs.len(), "listing page parsed");
        Some(Ok(ListingBatch {
            page_url: url,
            page_number: current,
            stubs,
        }))
    }
}
