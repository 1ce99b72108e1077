//! Storefront Crawler: a render-aware category crawler
//!
//! This crate crawls a paginated e-commerce category, extracts product records
//! from pages that need client-side rendering, walks the paginated reviews nested
//! inside each product page, and streams finished records into a sink.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for crawl runs
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Root URL {url} unreachable after {attempts} attempts: {source}")]
    RootUnreachable {
        url: String,
        attempts: u32,
        source: FetchError,
    },

    #[error("Crawl task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid link rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Errors reported by the rendering gateway and the transports beneath it
///
/// None of these are retried here; the frontier and the review paginator own
/// the retry policy.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        timeout: bool,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Render wait timed out after {waited_ms}ms for {url}")]
    RenderTimeout { url: String, waited_ms: u64 },

    #[error("Render error for {url}: {message}")]
    Render { url: String, message: String },
}

impl FetchError {
    /// Builds a render timeout error from the elapsed wait
    pub fn render_timeout(url: &str, waited: Duration) -> Self {
        Self::RenderTimeout {
            url: url.to_string(),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// The URL the failed fetch was for
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Status { url, .. }
            | Self::RenderTimeout { url, .. }
            | Self::Render { url, .. } => url,
        }
    }

    /// Returns true if the request may succeed when tried again
    ///
    /// HTTP statuses are only transient when listed in `retry_codes`.
    pub fn is_transient(&self, retry_codes: &[u16]) -> bool {
        match self {
            Self::Transport { .. } | Self::RenderTimeout { .. } | Self::Render { .. } => true,
            Self::Status { status, .. } => retry_codes.contains(status),
        }
    }

    pub fn is_render_timeout(&self) -> bool {
        matches!(self, Self::RenderTimeout { .. })
    }
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, Frontier, ProductExtractor, RenderingGateway, ReviewPaginator};
pub use state::{PaginationCursor, PaginationState};
pub use storage::{ProductRecord, Record, RecordSink, ReviewRecord};
pub use url::{normalize_url, LinkRuleSet, NormalizedUrl, PageKind};
