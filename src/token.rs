//! CSRF token extraction from embedded scripts

use crate::dom::Document;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static CSRF_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\s*csrfToken\s*=\s*"(.*?)""#).unwrap());

/// First non-empty `csrfToken = "..."` assignment across script bodies
pub fn find_csrf_token<I, S>(scripts: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scripts.into_iter().find_map(|script| {
        CSRF_TOKEN
            .captures(script.as_ref())
            .map(|cap| cap[1].to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Token from a fetched page
pub fn csrf_token_from_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("script").ok()?;
    find_csrf_token(doc.select(&selector).map(|el| el.text().collect::<String>()))
}

/// Token from the live document
pub fn csrf_token_from_document(doc: &Document) -> Option<String> {
    find_csrf_token(doc.script_texts())
}
