//! Page classification
//!
//! A [`PageSnapshot`] captures the handful of markers the decision needs, then
//! [`classify`] runs the named predicates in a fixed order:
//!
//! 1. content list route: token from the current document
//! 2. loan anchor with a related "my content" link: token from that page
//! 3. loan anchor without the link: an ordinary purchase, not returnable
//! 4. anything else: unsupported

use crate::dom::{Document, Matcher};
use crate::token::{csrf_token_from_document, csrf_token_from_html};
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Marker present on product pages that can show loan state
pub const LOAN_ANCHOR_ID: &str = "ebooksInstantOrderUpdate";

static CONTENT_LIST_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:hz/mycd/myx|mn/dcw/myx\.html)").unwrap());
static CANONICAL_ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/dp/([^/?#]+)").unwrap());

/// Kind of page currently loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Owned content management list
    ContentList,
    /// Detail page of an item currently on loan
    LoanDetail,
    Unsupported,
}

/// Immutable per-load context shared by every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub kind: PageKind,
    pub item_id: Option<String>,
    pub csrf_token: Option<String>,
}

impl PageContext {
    pub fn unsupported() -> Self {
        Self {
            kind: PageKind::Unsupported,
            item_id: None,
            csrf_token: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.kind != PageKind::Unsupported
    }

    /// Token for a supported page, or `None` when augmentation must stop
    pub fn require_token(&self) -> Option<&str> {
        self.csrf_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Markers read from the document before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub url: Url,
    pub has_loan_anchor: bool,
    pub canonical_href: Option<String>,
    pub related_content_href: Option<String>,
    pub document_token: Option<String>,
}

impl PageSnapshot {
    pub fn capture(doc: &Document) -> Self {
        let anchor = doc.element_by_id(LOAN_ANCHOR_ID);
        let canonical_href = doc
            .find(doc.root(), &Matcher::tag("link").attr("rel", "canonical"))
            .and_then(|link| doc.attr(link, "href"))
            .map(str::to_string);
        let related_content_href = anchor
            .and_then(|a| doc.parent(a))
            .and_then(|parent| {
                doc.find(
                    parent,
                    &Matcher::tag("a")
                        .class("a-link-normal")
                        .attr_contains("href", "/mn/dcw/myx.html"),
                )
            })
            .and_then(|link| doc.attr(link, "href"))
            .map(str::to_string);

        Self {
            url: doc.url().clone(),
            has_loan_anchor: anchor.is_some(),
            canonical_href,
            related_content_href,
            document_token: csrf_token_from_document(doc),
        }
    }
}

pub fn is_content_list_route(snapshot: &PageSnapshot) -> bool {
    CONTENT_LIST_ROUTE.is_match(snapshot.url.path())
}

pub fn has_loan_anchor(snapshot: &PageSnapshot) -> bool {
    snapshot.has_loan_anchor
}

/// Absolute URL of the related content page, fragment removed
pub fn related_content_link(snapshot: &PageSnapshot) -> Option<Url> {
    let href = snapshot.related_content_href.as_deref()?;
    let mut url = snapshot.url.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

pub fn item_id_from_canonical(snapshot: &PageSnapshot) -> Option<String> {
    let href = snapshot.canonical_href.as_deref()?;
    CANONICAL_ITEM_ID
        .captures(href)
        .map(|cap| cap[1].to_string())
}

/// Classify the page, fetching the related content page when needed
pub async fn classify(snapshot: &PageSnapshot, http: &reqwest::Client) -> PageContext {
    if is_content_list_route(snapshot) {
        return PageContext {
            kind: PageKind::ContentList,
            item_id: None,
            csrf_token: snapshot.document_token.clone(),
        };
    }

    if !has_loan_anchor(snapshot) {
        return PageContext::unsupported();
    }

    let item_id = item_id_from_canonical(snapshot);
    let Some(content_url) = related_content_link(snapshot) else {
        tracing::debug!("Ordered product page, nothing to return: item={:?}", item_id);
        return PageContext::unsupported();
    };

    let csrf_token = match fetch_page_token(http, &content_url).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to fetch {}: {:#}", content_url, e);
            None
        }
    };

    PageContext {
        kind: PageKind::LoanDetail,
        item_id,
        csrf_token,
    }
}

async fn fetch_page_token(http: &reqwest::Client, url: &Url) -> Result<Option<String>> {
    let response = http
        .get(url.clone())
        .send()
        .await
        .context("Failed to fetch content page")?;

    if !response.status().is_success() {
        bail!("Network response was not ok: {}", response.status());
    }

    let html = response.text().await.context("Failed to read content page")?;
    Ok(csrf_token_from_html(&html))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, html: &str) -> PageSnapshot {
        PageSnapshot::capture(&Document::parse(Url::parse(url).unwrap(), html))
    }

    #[test]
    fn test_content_list_routes() {
        let token = r#"<script>csrfToken = "t";</script>"#;
        assert!(is_content_list_route(&snapshot(
            "https://www.amazon.co.jp/hz/mycd/myx#/home/content/booksAll",
            token
        )));
        assert!(is_content_list_route(&snapshot(
            "https://www.amazon.co.jp/mn/dcw/myx.html",
            token
        )));
        assert!(!is_content_list_route(&snapshot(
            "https://www.amazon.co.jp/dp/B000",
            token
        )));
    }

    #[test]
    fn test_item_id_from_canonical() {
        let s = snapshot(
            "https://www.amazon.co.jp/dp/B0X",
            r#"<html><head><link rel="canonical" href="https://www.amazon.co.jp/Some-Book/dp/B07ABC1234"></head></html>"#,
        );
        assert_eq!(item_id_from_canonical(&s), Some("B07ABC1234".to_string()));
    }

    #[test]
    fn test_related_link_resolved_without_fragment() {
        let s = snapshot(
            "https://www.amazon.co.jp/dp/B0X",
            r#"<div><div id="ebooksInstantOrderUpdate"></div>
               <a class="a-link-normal" href="/mn/dcw/myx.html#/home/content/booksAll">x</a></div>"#,
        );
        assert!(has_loan_anchor(&s));
        assert_eq!(
            related_content_link(&s).unwrap().as_str(),
            "https://www.amazon.co.jp/mn/dcw/myx.html"
        );
    }

    #[test]
    fn test_related_link_must_be_near_anchor() {
        let s = snapshot(
            "https://www.amazon.co.jp/dp/B0X",
            r#"<div><div id="ebooksInstantOrderUpdate"></div></div>
               <div><a class="a-link-normal" href="/mn/dcw/myx.html">x</a></div>"#,
        );
        assert!(related_content_link(&s).is_none());
    }

    #[tokio::test]
    async fn test_classify_list_page_uses_document_token() {
        let s = snapshot(
            "https://www.amazon.co.jp/hz/mycd/myx",
            r#"<script>var csrfToken = "list-token";</script>"#,
        );
        let ctx = classify(&s, &reqwest::Client::new()).await;
        assert_eq!(ctx.kind, PageKind::ContentList);
        assert_eq!(ctx.require_token(), Some("list-token"));
        assert_eq!(ctx.item_id, None);
    }

    #[tokio::test]
    async fn test_classify_without_markers_is_unsupported() {
        let s = snapshot("https://www.amazon.co.jp/gp/cart", "<p>cart</p>");
        let ctx = classify(&s, &reqwest::Client::new()).await;
        assert_eq!(ctx, PageContext::unsupported());
        assert!(!ctx.is_supported());
    }

    #[tokio::test]
    async fn test_classify_ordered_product_is_unsupported() {
        let s = snapshot(
            "https://www.amazon.co.jp/dp/B0X",
            r#"<link rel="canonical" href="https://www.amazon.co.jp/dp/B0X"><div id="ebooksInstantOrderUpdate"></div>"#,
        );
        let ctx = classify(&s, &reqwest::Client::new()).await;
        assert_eq!(ctx.kind, PageKind::Unsupported);
    }
}
