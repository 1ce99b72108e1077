//! Requests flowing between the frontier and the rendering gateway

use crate::config::compile_selector;
use crate::url::PageKind;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::fmt;
use url::Url;

/// A link found on a rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: Url,
    pub anchor_text: String,
}

impl Link {
    pub fn new(url: Url, anchor_text: impl Into<String>) -> Self {
        Self {
            url,
            anchor_text: anchor_text.into(),
        }
    }
}

/// A CSS selector that must match before a rendered DOM is accepted
#[derive(Clone)]
pub struct WaitCondition {
    source: String,
    selector: Selector,
}

impl WaitCondition {
    /// Compiles a wait condition from a CSS selector
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        let selector = compile_selector(source)?;

        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    /// Returns true if the selector matches at least one element in `html`
    pub fn is_satisfied(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        let matched = document.select(&self.selector).next().is_some();
        matched
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitCondition").field(&self.source).finish()
    }
}

impl PartialEq for WaitCondition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for WaitCondition {}

/// How a page must be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// One plain HTTP GET
    Static,
    /// Load in a JS context and wait for the condition
    Rendered(WaitCondition),
}

impl RenderMode {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }
}

/// A unit of work for the rendering gateway
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    /// Id of the matched link rule; `None` for roots that match no rule
    pub rule_id: Option<usize>,
    pub kind: PageKind,
    pub render_mode: RenderMode,
    pub retry_count: u32,
    /// Roots are the only requests whose failure aborts the run
    pub is_root: bool,
}

impl FetchRequest {
    /// Builds a request for a category root
    pub fn root(url: Url, rule_id: Option<usize>, render_mode: RenderMode) -> Self {
        Self {
            url,
            rule_id,
            kind: PageKind::Listing,
            render_mode,
            retry_count: 0,
            is_root: true,
        }
    }

    /// Builds a static request for an arbitrary URL
    pub fn static_page(url: Url, kind: PageKind) -> Self {
        Self {
            url,
            rule_id: None,
            kind,
            render_mode: RenderMode::Static,
            retry_count: 0,
            is_root: false,
        }
    }

    /// Returns the same request with its retry count bumped
    pub fn retried(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}
