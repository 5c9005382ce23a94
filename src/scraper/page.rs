//! DOM access used by the listing and article extractors.
//!
//! Extractors are written against [PageSource] so they do not care whether markup came
//! from the HTTP client or from a hydrated browser DOM. [StaticPage] implements it over
//! markup parsed with `scraper`.

use crate::scraper::error::ExtractError;
use scraper::{ElementRef, Html, Selector};

/// Parse a CSS selector or return an extraction error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ExtractError> {
    Selector::parse(sel).map_err(|e| ExtractError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Read-only DOM queries. Selectors are CSS; nodes are returned in document order.
pub trait PageSource<'a> {
    type Node: Copy + 'a;

    /// All elements in the page matching `selector`.
    fn find_all(&self, selector: &str) -> Result<Vec<Self::Node>, ExtractError>;

    /// Descendants of `node` matching `selector`.
    fn find_within(&self, node: Self::Node, selector: &str)
        -> Result<Vec<Self::Node>, ExtractError>;

    /// Concatenated text of `node` and its descendants, trimmed.
    fn text(&self, node: Self::Node) -> String;

    fn attr(&self, node: Self::Node, name: &str) -> Option<String>;

    /// Whether any ancestor of `node` matches `selector`.
    fn has_ancestor(&self, node: Self::Node, selector: &str) -> Result<bool, ExtractError>;

    /// Later siblings of `node` matching `selector`, nearest first.
    fn next_siblings(&self, node: Self::Node, selector: &str)
        -> Result<Vec<Self::Node>, ExtractError>;

    /// First element after the start of `node` in document order (descendants included)
    /// matching `selector`.
    fn following(&self, node: Self::Node, selector: &str)
        -> Result<Option<Self::Node>, ExtractError>;
}

/// [PageSource] over a parsed document.
#[derive(Clone, Copy)]
pub struct StaticPage<'a> {
    doc: &'a Html,
}

impl<'a> StaticPage<'a> {
    pub fn new(doc: &'a Html) -> Self {
        Self { doc }
    }
}

impl<'a> PageSource<'a> for StaticPage<'a> {
    type Node = ElementRef<'a>;

    fn find_all(&self, selector: &str) -> Result<Vec<ElementRef<'a>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(self.doc.select(&sel).collect())
    }

    fn find_within(
        &self,
        node: ElementRef<'a>,
        selector: &str,
    ) -> Result<Vec<ElementRef<'a>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(node.select(&sel).collect())
    }

    fn text(&self, node: ElementRef<'a>) -> String {
        node.text().collect::<String>().trim().to_string()
    }

    fn attr(&self, node: ElementRef<'a>, name: &str) -> Option<String> {
        node.value().attr(name).map(String::from)
    }

    fn has_ancestor(&self, node: ElementRef<'a>, selector: &str) -> Result<bool, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| sel.matches(&a)))
    }

    fn next_siblings(
        &self,
        node: ElementRef<'a>,
        selector: &str,
    ) -> Result<Vec<ElementRef<'a>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(node
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|e| sel.matches(e))
            .collect())
    }

    fn following(
        &self,
        node: ElementRef<'a>,
        selector: &str,
    ) -> Result<Option<ElementRef<'a>>, ExtractError> {
        let sel = parse_selector(selector)?;
        let mut passed = false;
        for n in self.doc.tree.root().descendants() {
            if n.id() == node.id() {
                passed = true;
                continue;
            }
            if !passed {
                continue;
            }
            if let Some(el) = ElementRef::wrap(n) {
                if sel.matches(&el) {
                    return Ok(Some(el));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><body>
<div id="a"><p>one</p><section class="hook"><p>two</p></section></div>
<span>Label</span><span> </span><span>Value</span>
<a href="/x">after</a>
</body></html>"#;

    #[test]
    fn find_text_and_attr() -> Result<(), ExtractError> {
        let doc = Html::parse_document(HTML);
        let page = StaticPage::new(&doc);
        let links = page.find_all("a")?;
        assert_eq!(links.len(), 1);
        assert_eq!(page.text(links[0]), "after");
        assert_eq!(page.attr(links[0], "href").as_deref(), Some("/x"));
        assert_eq!(page.attr(links[0], "title"), None);
        Ok(())
    }

    #[test]
    fn ancestors_and_within() -> Result<(), ExtractError> {
        let doc = Html::parse_document(HTML);
        let page = StaticPage::new(&doc);
        let container = page.find_all("#a")?[0];
        let ps = page.find_within(container, "p")?;
        assert_eq!(ps.len(), 2);
        assert!(!page.has_ancestor(ps[0], ".hook")?);
        assert!(page.has_ancestor(ps[1], ".hook")?);
        Ok(())
    }

    #[test]
    fn siblings_and_following_in_document_order() -> Result<(), ExtractError> {
        let doc = Html::parse_document(HTML);
        let page = StaticPage::new(&doc);
        let label = page.find_all("span")?[0];
        let sibs = page.next_siblings(label, "span")?;
        assert_eq!(sibs.len(), 2);
        assert_eq!(page.text(sibs[0]), "");
        assert_eq!(page.text(sibs[1]), "Value");
        let next_a = page.following(label, "a")?.map(|a| page.text(a));
        assert_eq!(next_a.as_deref(), Some("after"));
        let last = page.find_all("a")?[0];
        assert!(page.following(last, "a")?.is_none());
        Ok(())
    }

    #[test]
    fn invalid_selector_is_error() {
        let doc = Html::parse_document(HTML);
        let page = StaticPage::new(&doc);
        assert!(matches!(
            page.find_all("div[[["),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }
}
