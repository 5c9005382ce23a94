//! Article page extraction: body paragraphs, related instruments, author, and timestamps.
//!
//! Selectors follow the site's current markup and are best effort. Everything except the
//! body is optional; a missing section yields None/empty rather than an error.

use crate::model::{ArticleRecord, ArticleStub, RelatedInstrument};
use crate::scraper::error::ExtractError;
use crate::scraper::fetch::{FetchCoordinator, Intent};
use crate::scraper::page::{PageSource, StaticPage};
use crate::scraper::ScraperError;
use reqwest::Url;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main article container. The class carries a build hash, so match by substring.
pub const ARTICLE_CONTAINER: &str = r#"div[class*="articlePage"]"#;
const SUBSCRIPTION_HOOK: &str = r#"[data-test="contextual-subscription-hook"]"#;
const RELATED_SECTION: &str = r#"div[data-test="related-instruments-section"]"#;
const RELATED_ITEM: &str = "div.relative";
const MAINTENANCE_BANNER: &str = "temporarily down for maintenance";

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Whether the whole site is showing its maintenance page.
pub fn is_maintenance(html: &str) -> bool {
    html.to_lowercase().contains(MAINTENANCE_BANNER)
}

/// Fields extracted from an article page (everything but title and link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleBody {
    pub content: String,
    pub related: Vec<RelatedInstrument>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

impl ArticleBody {
    pub fn into_record(self, stub: &ArticleStub) -> ArticleRecord {
        ArticleRecord {
            title: stub.title.clone(),
            link: stub.link.clone(),
            content: self.content,
            related: self.related,
            author: self.author,
            published: self.published,
            updated: self.updated,
        }
    }
}

/// Body paragraphs, excluding any inside the subscription prompt, joined with `\n`.
pub fn extract_content<'a, P: PageSource<'a>>(page: &P) -> Result<String, ExtractError> {
    let container = page
        .find_all(ARTICLE_CONTAINER)?
        .into_iter()
        .next()
        .ok_or(ExtractError::MissingContainer)?;
    let mut paragraphs = Vec::new();
    for p in page.find_within(container, "p")? {
        if page.has_ancestor(p, SUBSCRIPTION_HOOK)? {
            continue;
        }
        let text = page.text(p);
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }
    if paragraphs.is_empty() {
        return Err(ExtractError::EmptyContent);
    }
    Ok(paragraphs.join("\n"))
}

/// (ticker, url) pairs from the related-instruments box, in document order. Relative
/// hrefs are resolved against `base` when given.
pub fn extract_related<'a, P: PageSource<'a>>(
    page: &P,
    base: Option<&Url>,
) -> Result<Vec<RelatedInstrument>, ExtractError> {
    let Some(section) = page.find_all(RELATED_SECTION)?.into_iter().next() else {
        return Ok(Vec::new());
    };
    let mut related = Vec::new();
    for item in page.find_within(section, RELATED_ITEM)? {
        let href = page
            .find_within(item, "a[href]")?
            .into_iter()
            .next()
            .and_then(|a| page.attr(a, "href"));
        let ticker = page
            .find_within(item, "span")?
            .into_iter()
            .next()
            .map(|s| page.text(s));
        if let (Some(href), Some(ticker)) = (href, ticker) {
            let url = base
                .and_then(|b| b.join(&href).ok())
                .map(|u| u.to_string())
                .unwrap_or(href);
            related.push(RelatedInstrument { ticker, url });
        }
    }
    Ok(related)
}

/// Name in the first link after the `Author` label.
pub fn extract_author<'a, P: PageSource<'a>>(page: &P) -> Result<Option<String>, ExtractError> {
    for span in page.find_all("span")? {
        if page.text(span) != "Author" {
            continue;
        }
        return Ok(page
            .following(span, "a")?
            .map(|a| page.text(a))
            .filter(|s| !s.is_empty()));
    }
    Ok(None)
}

/// Value of a `Published` / `Updated` style label: the nearest later sibling span with text.
/// When the label repeats, the last occurrence with a value wins.
pub fn extract_labeled<'a, P: PageSource<'a>>(
    page: &P,
    label: &str,
) -> Result<Option<String>, ExtractError> {
    let mut found = None;
    for span in page.find_all("span")? {
        if !page.text(span).eq_ignore_ascii_case(label) {
            continue;
        }
        let value = page
            .next_siblings(span, "span")?
            .into_iter()
            .map(|s| page.text(s))
            .find(|t| !t.is_empty());
        if value.is_some() {
            found = value;
        }
    }
    Ok(found)
}

/// Extract every field from article markup.
pub fn extract_article(html: &str, url: &str) -> Result<ArticleBody, ExtractError> {
    let doc = Html::parse_document(html);
    let page = StaticPage::new(&doc);
    let base = Url::parse(url).ok();
    Ok(ArticleBody {
        content: extract_content(&page)?,
        related: extract_related(&page, base.as_ref())?,
        author: extract_author(&page)?,
        published: extract_labeled(&page, "published")?,
        updated: extract_labeled(&page, "updated")?,
    })
}

/// Why an article was not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The site is down for everyone; the caller should pause before the next article.
    SiteMaintenance,
    /// Every attempt failed to fetch or produced no content.
    Exhausted { attempts: u32, last_error: String },
}

/// Outcome of one pipeline stage.
#[derive(Debug)]
pub enum Stage<T> {
    Ok(T),
    Skip(SkipReason),
    Fatal(ScraperError),
}

/// Fetch-and-extract with a bounded number of attempts per article.
#[derive(Debug, Clone, Copy)]
pub struct ArticleExtractor {
    attempts: u32,
    retry_delay: Duration,
}

impl Default for ArticleExtractor {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl ArticleExtractor {
    pub fn new(attempts: u32, retry_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn extract(&self, fetcher: &mut FetchCoordinator, stub: &ArticleStub) -> Stage<ArticleRecord> {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            debug!(attempt, of = self.attempts, link = %stub.link, "reading article");
            match fetcher.fetch(&stub.link, Intent::Article) {
                Ok(page) => {
                    if is_maintenance(&page.html) {
                        warn!(link = %stub.link, "site is down for maintenance");
                        return Stage::Skip(SkipReason::SiteMaintenance);
                    }
                    match extract_article(&page.html, &page.url) {
                        Ok(body) => {
                            info!(
                                link = %stub.link,
                                chars = body.content.len(),
                                related = body.related.len(),
                                "extracted article"
                            );
                            return Stage::Ok(body.into_record(stub));
                        }
                        Err(e @ ExtractError::InvalidSelector { .. }) => {
                            return Stage::Fatal(e.into());
                        }
                        Err(e) => {
                            warn!(attempt, link = %stub.link, error = %e, "no article content");
                            last_error = e.to_string();
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, link = %stub.link, error = %e, "article fetch failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.attempts {
                std::thread::sleep(self.retry_delay);
            }
        }
        Stage::Skip(SkipReason::Exhausted {
            attempts: self.attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::fetch::tests::CannedStrategy;

    const ARTICLE_URL: &str = "https://www.investing.com/news/forex-news/dollar-firms-123";

    fn article_html() -> String {
        r#"<html><body>
<h1>Dollar firms</h1>
<div class="flex"><span>Author</span><div><a href="/members/1">Jane Doe</a></div></div>
<div class="mt-2"><span>Published</span><span></span><span>10/17/2026, 09:15 AM</span></div>
<div class="mt-2"><span>Updated</span><span>10/17/2026, 10:02 AM</span></div>
<div data-test="related-instruments-section">
  <div class="relative"><a href="/currencies/eur-usd"><span>EUR/USD</span></a></div>
  <div class="relative"><a href="https://www.investing.com/currencies/usd-jpy"><span>USD/JPY</span></a></div>
  <div class="relative"><span>No link</span></div>
  <div class="relative"><a href="/indices/us-spx-500"><span>US500</span></a></div>
</div>
<div class="articlePage_container__abc">
  <p>The dollar firmed on Tuesday.</p>
  <div data-test="contextual-subscription-hook"><p>Subscribe to unlock.</p></div>
  <p>   </p>
  <p>Traders now await the Fed.</p>
</div>
</body></html>"#
            .to_string()
    }

    #[test]
    fn full_article_extraction() -> Result<(), ExtractError> {
        let body = extract_article(&article_html(), ARTICLE_URL)?;
        assert_eq!(
            body.content,
            "The dollar firmed on Tuesday.\nTraders now await the Fed."
        );
        assert_eq!(body.author.as_deref(), Some("Jane Doe"));
        assert_eq!(body.published.as_deref(), Some("10/17/2026, 09:15 AM"));
        assert_eq!(body.updated.as_deref(), Some("10/17/2026, 10:02 AM"));
        Ok(())
    }

    #[test]
    fn related_instruments_in_document_order() -> Result<(), ExtractError> {
        let body = extract_article(&article_html(), ARTICLE_URL)?;
        let tickers: Vec<_> = body.related.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, ["EUR/USD", "USD/JPY", "US500"]);
        assert_eq!(
            body.related[0].url,
            "https://www.investing.com/currencies/eur-usd"
        );
        assert_eq!(
            body.related[1].url,
            "https://www.investing.com/currencies/usd-jpy"
        );
        Ok(())
    }

    #[test]
    fn subscription_hook_paragraph_excluded() -> Result<(), ExtractError> {
        let html = r#"<div class="articlePage"><p>Visible text.</p><div data-test="contextual-subscription-hook"><p>Hidden text.</p></div></div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(extract_content(&StaticPage::new(&doc))?, "Visible text.");
        Ok(())
    }

    #[test]
    fn missing_and_empty_container_are_errors() {
        let doc = Html::parse_document("<div><p>Loose paragraph</p></div>");
        assert_eq!(
            extract_content(&StaticPage::new(&doc)),
            Err(ExtractError::MissingContainer)
        );
        let doc = Html::parse_document(
            r#"<div class="articlePage"><div data-test="contextual-subscription-hook"><p>Only hook</p></div></div>"#,
        );
        assert_eq!(
            extract_content(&StaticPage::new(&doc)),
            Err(ExtractError::EmptyContent)
        );
    }

    #[test]
    fn optional_fields_absent_without_error() -> Result<(), ExtractError> {
        let html = r#"<div class="articlePage"><p>Only body.</p></div>"#;
        let body = extract_article(html, ARTICLE_URL)?;
        assert_eq!(body.content, "Only body.");
        assert!(body.related.is_empty());
        assert_eq!(body.author, None);
        assert_eq!(body.published, None);
        assert_eq!(body.updated, None);
        Ok(())
    }

    #[test]
    fn author_label_is_case_sensitive() -> Result<(), ExtractError> {
        let doc = Html::parse_document(r#"<span>author</span><a href="/m">Someone</a>"#);
        assert_eq!(extract_author(&StaticPage::new(&doc))?, None);
        Ok(())
    }

    #[test]
    fn label_without_value_is_none() -> Result<(), ExtractError> {
        let doc = Html::parse_document(r#"<div><span>PUBLISHED</span><span> </span></div>"#);
        assert_eq!(extract_labeled(&StaticPage::new(&doc), "published")?, None);
        Ok(())
    }

    #[test]
    fn repeated_label_takes_last_value() -> Result<(), ExtractError> {
        let doc = Html::parse_document(
            r#"<div><span>Published</span><span>10/16/2026, 08:00 AM</span></div>
               <div><span>Published</span><span>10/17/2026, 09:15 AM</span></div>
               <div><span>Published</span><span></span></div>"#,
        );
        assert_eq!(
            extract_labeled(&StaticPage::new(&doc), "published")?.as_deref(),
            Some("10/17/2026, 09:15 AM")
        );
        Ok(())
    }

    #[test]
    fn relative_related_links_kept_without_base() -> Result<(), ExtractError> {
        let doc = Html::parse_document(
            r#"<div data-test="related-instruments-section"><div class="relative"><a href="/x"><span>X</span></a></div></div>"#,
        );
        let related = extract_related(&StaticPage::new(&doc), None)?;
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].url, "/x");
        Ok(())
    }

    #[test]
    fn maintenance_detection_is_case_insensitive() {
        assert!(is_maintenance(
            "<h1>Investing.com is Temporarily Down for Maintenance</h1>"
        ));
        assert!(!is_maintenance("<p>Maintenance margin rises</p>"));
    }

    fn stub() -> ArticleStub {
        ArticleStub {
            title: "Dollar firms".to_string(),
            link: ARTICLE_URL.to_string(),
            published_at: None,
        }
    }

    #[test]
    fn extractor_returns_record_with_stub_title_and_link() {
        let strategy = CannedStrategy::default().with_page(ARTICLE_URL, &article_html());
        let mut fetcher = FetchCoordinator::single(Box::new(strategy));
        match ArticleExtractor::new(3, Duration::ZERO).extract(&mut fetcher, &stub()) {
            Stage::Ok(record) => {
                assert_eq!(record.title, "Dollar firms");
                assert_eq!(record.link, ARTICLE_URL);
                assert_eq!(record.related.len(), 3);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn extractor_retries_empty_content_then_skips() {
        let strategy =
            CannedStrategy::default().with_page(ARTICLE_URL, r#"<div class="articlePage"></div>"#);
        let calls = strategy.clone();
        let mut fetcher = FetchCoordinator::single(Box::new(strategy));
        match ArticleExtractor::new(3, Duration::ZERO).extract(&mut fetcher, &stub()) {
            Stage::Skip(SkipReason::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhausted skip, got {:?}", other),
        }
        assert_eq!(calls.call_count(), 3);
    }

    #[test]
    fn extractor_signals_maintenance_without_retrying() {
        let strategy = CannedStrategy::default().with_page(
            ARTICLE_URL,
            "<html><body>We are temporarily down for maintenance.</body></html>",
        );
        let calls = strategy.clone();
        let mut fetcher = FetchCoordinator::single(Box::new(strategy));
        let outcome = ArticleExtractor::new(3, Duration::ZERO).extract(&mut fetcher, &stub());
        assert!(matches!(outcome, Stage::Skip(SkipReason::SiteMaintenance)));
        assert_eq!(calls.call_count(), 1);
    }

    #[test]
    fn extractor_skips_after_fetch_failures() {
        let strategy = CannedStrategy::default();
        let calls = strategy.clone();
        let mut fetcher = FetchCoordinator::single(Box::new(strategy));
        let outcome = ArticleExtractor::new(2, Duration::ZERO).extract(&mut fetcher, &stub());
        match outcome {
            Stage::Skip(SkipReason::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("404"));
            }
            other => panic!("expected exhausted skip, got {:?}", other),
        }
        assert_eq!(calls.call_count(), 2);
    }
}
