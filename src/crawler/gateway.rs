//! The rendering gateway
//!
//! Fronts the two fetch strategies. `Static` requests are a single HTTP GET;
//! `Rendered` requests load the page in a render context and poll the wait
//! condition until it matches or the wait budget runs out.

use crate::config::Config;
use crate::crawler::request::{FetchRequest, RenderMode, WaitCondition};
use crate::crawler::splash::SplashRenderer;
use crate::crawler::transport::{HttpTransport, RenderBackend, RenderContext, Transport};
use crate::{CrawlerError, FetchError};
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// A fetched DOM, scoped to one extraction pass
///
/// The document is kept as text and parsed on demand, since a parsed
/// `scraper::Html` cannot be held across an await point.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    source_url: Url,
    html: String,
}

impl RenderedPage {
    pub fn new(source_url: Url, html: String) -> Self {
        Self { source_url, html }
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parses the DOM for querying
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Abstraction over static and JS-rendered fetching
pub struct RenderingGateway {
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn RenderBackend>,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl RenderingGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn RenderBackend>,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            renderer,
            poll_interval,
            wait_timeout,
        }
    }

    /// Builds the reqwest transport and the Splash renderer from configuration
    pub fn from_config(config: &Config) -> Result<Self, CrawlerError> {
        let timeout = Duration::from_secs(config.render.request_timeout_secs);
        let transport = HttpTransport::from_config(&config.user_agent, timeout)?;
        let renderer = SplashRenderer::from_config(&config.render, &config.user_agent)?;

        Ok(Self::new(
            Arc::new(transport),
            Arc::new(renderer),
            Duration::from_millis(config.render.poll_interval_ms),
            Duration::from_millis(config.render.wait_timeout_ms),
        ))
    }

    /// Fetches a request according to its render mode
    ///
    /// # Returns
    ///
    /// * `Ok(RenderedPage)` - The literal body (static) or a DOM satisfying the wait condition
    /// * `Err(FetchError)` - Transport failure, non-2xx status, render failure or
    ///   `RenderTimeout`; retrying is left to the caller
    pub async fn fetch(&self, request: &FetchRequest) -> Result<RenderedPage, FetchError> {
        match &request.render_mode {
            RenderMode::Static => self.fetch_static(&request.url).await,
            RenderMode::Rendered(wait) => self.fetch_rendered(&request.url, wait).await,
        }
    }

    /// One plain GET
    pub async fn fetch_static(&self, url: &Url) -> Result<RenderedPage, FetchError> {
        let html = self.transport.fetch_static(url).await?;
        Ok(RenderedPage::new(url.clone(), html))
    }

    /// Loads `url` in a fresh context and waits for `wait`
    ///
    /// The context is closed before returning, whatever the outcome.
    pub async fn fetch_rendered(
        &self,
        url: &Url,
        wait: &WaitCondition,
    ) -> Result<RenderedPage, FetchError> {
        let mut ctx = self.open_context().await?;
        let result = self.load(ctx.as_mut(), url, wait).await;
        close_context(ctx).await;
        result
    }

    /// Opens a render context the caller must hand back to `close_context`
    pub async fn open_context(&self) -> Result<Box<dyn RenderContext>, FetchError> {
        self.renderer.new_context().await
    }

    /// Navigates an open context and waits for the condition
    pub async fn load(
        &self,
        ctx: &mut dyn RenderContext,
        url: &Url,
        wait: &WaitCondition,
    ) -> Result<RenderedPage, FetchError> {
        ctx.navigate(url).await?;
        self.wait_for(ctx, url, wait, None).await
    }

    /// Activates a control and waits for the resulting DOM
    ///
    /// The new DOM must both satisfy `wait` and differ from `previous`, so the
    /// pre-click page cannot be mistaken for the next one.
    pub async fn click_and_wait(
        &self,
        ctx: &mut dyn RenderContext,
        url: &Url,
        control: &str,
        wait: &WaitCondition,
        previous: &str,
    ) -> Result<RenderedPage, FetchError> {
        ctx.click(control).await?;
        self.wait_for(ctx, url, wait, Some(previous)).await
    }

    /// Polls the context's DOM until `wait` matches
    ///
    /// Each snapshot is handed the remaining wait budget, so a backend that
    /// renders out of process keeps the page alive while it waits.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The render context to snapshot
    /// * `url` - URL reported as the page source
    /// * `wait` - Condition the DOM must satisfy
    /// * `previous` - If set, a DOM identical to this one is not accepted
    pub async fn wait_for(
        &self,
        ctx: &mut dyn RenderContext,
        url: &Url,
        wait: &WaitCondition,
        previous: Option<&str>,
    ) -> Result<RenderedPage, FetchError> {
        let deadline = Instant::now() + self.wait_timeout;
        let poll = async {
            let mut attempts = 0u32;
            loop {
                let budget = deadline.saturating_duration_since(Instant::now());
                let html = ctx.snapshot(wait, budget).await?;
                attempts += 1;
                let changed = previous.map_or(true, |p| p != html);
                if changed && wait.is_satisfied(&html) {
                    tracing::trace!(url = %url, attempts, "Wait condition satisfied");
                    return Ok::<_, FetchError>(html);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.wait_timeout, poll).await {
            Ok(result) => result.map(|html| RenderedPage::new(url.clone(), html)),
            Err(_) => {
                tracing::debug!(url = %url, selector = wait.as_str(), "Render wait timed out");
                Err(FetchError::render_timeout(url.as_str(), self.wait_timeout))
            }
        }
    }
}

/// Closes a render context, logging rather than propagating teardown errors
pub async fn close_context(ctx: Box<dyn RenderContext>) {
    if let Err(e) = ctx.close().await {
        tracing::warn!("Failed to close render context: {}", e);
    }
}
