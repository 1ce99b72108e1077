//! Network I/O beneath the rendering gateway
//!
//! This module defines the seams the gateway talks through:
//! - `Transport` for plain HTTP fetches
//! - `RenderBackend` / `RenderContext` for JS-rendered fetches
//! - `HttpTransport`, the reqwest implementation of `Transport`

use crate::config::UserAgentConfig;
use crate::crawler::request::WaitCondition;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Performs plain HTTP fetches
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a URL and returns the literal response body
    async fn fetch_static(&self, url: &Url) -> Result<String, FetchError>;
}

/// A JS-rendering engine that hands out isolated contexts
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Opens a fresh rendering context
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, FetchError>;
}

/// One isolated rendering context (a browser tab or a renderer session)
///
/// Contexts are never shared between paginators. Whoever opens one must call
/// `close` on every exit path.
#[async_trait]
pub trait RenderContext: Send {
    /// Loads a URL, discarding any previous page state
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError>;

    /// Returns a snapshot of the current DOM
    ///
    /// Backends that render out of process hold the snapshot until `wait`
    /// matches inside their own session, spending at most `budget`. A backend
    /// that gives up reports `FetchError::RenderTimeout`.
    async fn snapshot(
        &mut self,
        wait: &WaitCondition,
        budget: Duration,
    ) -> Result<String, FetchError>;

    /// Activates the first element matching `selector`
    async fn click(&mut self, selector: &str) -> Result<(), FetchError>;

    /// Tears the context down
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use storefront_crawler::config::UserAgentConfig;
/// use storefront_crawler::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "StorefrontCrawler".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a reqwest failure onto the fetch error taxonomy
pub(crate) fn transport_error(url: &str, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else {
        error.to_string()
    };

    FetchError::Transport {
        url: url.to_string(),
        message,
        timeout: error.is_timeout(),
    }
}

/// Plain HTTP transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport with the crawler's user agent
    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_static(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))
    }
}
