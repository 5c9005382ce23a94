//! Data model for scraped news.
//!
//! Listings produce [ArticleStub]s; the article extractor turns each stub into an
//! [ArticleRecord], which the CSV sink persists.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A discovered article reference from a listing page, before content extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleStub {
    pub title: String,
    /// Absolute article URL.
    pub link: String,
    /// From the listing's `<time datetime>`; None when missing or unparseable.
    pub published_at: Option<NaiveDateTime>,
}

/// One instrument (stock, index, currency pair) linked from an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedInstrument {
    pub ticker: String,
    pub url: String,
}

/// One fully extracted article. `link` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    /// Paragraphs joined by `\n`.
    pub content: String,
    pub related: Vec<RelatedInstrument>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

impl ArticleRecord {
    /// Related instruments flattened to `TICKER (url); TICKER (url)`.
    pub fn related_flat(&self) -> String {
        self.related
            .iter()
            .map(|r| format!("{} ({})", r.ticker, r.url))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Normalize every text field in place. URLs are left untouched.
    pub fn normalize(&mut self) {
        use crate::normalize::normalize;
        self.title = normalize(&self.title);
        self.content = normalize(&self.content);
        for r in &mut self.related {
            r.ticker = normalize(&r.ticker);
        }
        for field in [&mut self.author, &mut self.published, &mut self.updated] {
            if let Some(s) = field.as_mut() {
                *s = normalize(s);
            }
        }
    }
}
