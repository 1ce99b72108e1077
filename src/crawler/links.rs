//! Link extraction from fetched pages
//!
//! Pulls every followable `<a href>` out of a page, resolves it against the
//! page URL and keeps the anchor text alongside it.

use crate::crawler::gateway::RenderedPage;
use crate::crawler::request::Link;
use scraper::{Html, Selector};
use url::Url;

/// Extracts all followable links from a page
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only anchors
/// - Anything that is not HTTP(S) after resolution
///
/// Duplicates are kept; deduplication belongs to the frontier.
///
/// # Example
///
/// ```
/// use storefront_crawler::crawler::{extract_links, RenderedPage};
/// use url::Url;
///
/// let html = r#"<a href="/hoodie-product12.html"> Zip Hoodie </a>"#;
/// let page = RenderedPage::new(Url::parse("https://shop.example.com/page-1.html").unwrap(), html.to_string());
/// let links = extract_links(&page);
/// assert_eq!(links[0].url.as_str(), "https://shop.example.com/hoodie-product12.html");
/// assert_eq!(links[0].anchor_text, "Zip Hoodie");
/// ```
pub fn extract_links(page: &RenderedPage) -> Vec<Link> {
    let document = page.parse();
    links_in(&document, page.source_url())
}

fn links_in(document: &Html, base_url: &Url) -> Vec<Link> {
    let mut links = Vec::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
            let anchor_text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            links.push(Link::new(url, anchor_text));
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url),
        _ => None,
    }
}
