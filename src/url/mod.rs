//! URL handling module for the storefront crawler
//!
//! This module provides URL normalization, allowed-domain matching and the
//! Link Rule Set that classifies discovered URLs into page kinds.

mod domain;
mod matcher;
mod normalize;
mod rules;

use std::fmt;
use url::Url;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_url, NormalizedUrl};
pub use rules::{LinkRule, LinkRuleSet};

/// Page taxonomy of the crawled category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Category listing page; its links are followed
    Listing,
    /// Product detail page; extracted, links not followed
    Product,
}

impl PageKind {
    /// Returns true if links found on this kind of page re-enter the frontier
    pub fn follows_links(&self) -> bool {
        matches!(self, Self::Listing)
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => write!(f, "listing"),
            Self::Product => write!(f, "product"),
        }
    }
}

/// Checks whether a URL's host is covered by the allowed-domain patterns
///
/// # Examples
///
/// ```
/// use url::Url;
/// use storefront_crawler::url::is_allowed_domain;
///
/// let allowed = vec!["*.example.com".to_string()];
/// let url = Url::parse("https://www.example.com/product1.html").unwrap();
/// assert!(is_allowed_domain(&url, &allowed));
/// ```
pub fn is_allowed_domain(url: &Url, allowed: &[String]) -> bool {
    match extract_domain(url) {
        Some(host) => matches_any(allowed, &host),
        None => false,
    }
}
