//! Splash implementation of the render backend
//!
//! Splash is a stateless JS-rendering service: every request loads a page from
//! scratch. A `SplashContext` therefore keeps the navigated URL and the clicks
//! issued since, and each DOM snapshot replays them inside a Lua script. The
//! script polls for the wait selector within that one Splash session, after
//! loading and after every click, so late client-side rendering is observed.

use crate::config::{RenderConfig, UserAgentConfig};
use crate::crawler::request::WaitCondition;
use crate::crawler::transport::{build_http_client, transport_error, RenderBackend, RenderContext};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

const RENDER_SCRIPT: &str = r#"
function main(splash, args)
  splash.images_enabled = false

  local function settle()
    if args.settle > 0 then
      assert(splash:wait(args.settle))
    end
  end

  local function ready(before)
    local waited = 0
    while true do
      if splash:select(args.wait) and (before == nil or splash:html() ~= before) then
        return true
      end
      if waited >= args.budget then
        return false
      end
      assert(splash:wait(args.poll))
      waited = waited + args.poll
    end
  end

  assert(splash:go(args.url))
  settle()
  if not ready(nil) then
    return {html = splash:html(), ready = false}
  end

  for _, selector in ipairs(args.clicks) do
    local element = splash:select(selector)
    if not element then
      error("control not found: " .. selector)
    end
    local before = splash:html()
    assert(element:mouse_click())
    settle()
    if not ready(before) then
      return {html = splash:html(), ready = false}
    end
  end

  return {html = splash:html(), ready = true}
end
"#;

/// What the render script hands back
#[derive(Debug, Deserialize)]
struct SplashReply {
    html: String,
    ready: bool,
}

/// Render backend talking to a Splash `execute` endpoint
#[derive(Debug, Clone)]
pub struct SplashRenderer {
    client: Client,
    endpoint: Url,
    settle: Duration,
    poll: Duration,
    timeout: Duration,
}

impl SplashRenderer {
    /// Creates a renderer for the Splash instance at `splash_url`
    pub fn new(
        client: Client,
        splash_url: &Url,
        settle: Duration,
        poll: Duration,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let endpoint = splash_url.join("execute")?;
        Ok(Self {
            client,
            endpoint,
            settle,
            poll,
            timeout,
        })
    }

    /// Builds a renderer from the `[render]` and `[user-agent]` tables
    pub fn from_config(
        render: &RenderConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, crate::CrawlerError> {
        let timeout = Duration::from_secs(render.request_timeout_secs);
        // Leave headroom over Splash's own timeout so its error body wins
        let client = build_http_client(user_agent, timeout + Duration::from_secs(10))?;
        let splash_url = Url::parse(&render.splash_url)?;
        Ok(Self::new(
            client,
            &splash_url,
            Duration::from_millis(render.settle_ms),
            Duration::from_millis(render.poll_interval_ms),
            timeout,
        )?)
    }
}

#[async_trait]
impl RenderBackend for SplashRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, FetchError> {
        Ok(Box::new(SplashContext {
            renderer: self.clone(),
            url: None,
            clicks: Vec::new(),
        }))
    }
}

/// A replayable Splash session
#[derive(Debug)]
pub struct SplashContext {
    renderer: SplashRenderer,
    url: Option<Url>,
    clicks: Vec<String>,
}

impl SplashContext {
    fn request_body(
        &self,
        url: &Url,
        wait: &WaitCondition,
        budget: Duration,
    ) -> serde_json::Value {
        json!({
            "lua_source": RENDER_SCRIPT,
            "url": url.as_str(),
            "clicks": self.clicks,
            "wait": wait.as_str(),
            "poll": self.renderer.poll.as_secs_f64(),
            "budget": budget.as_secs_f64(),
            "settle": self.renderer.settle.as_secs_f64(),
            "timeout": self.renderer.timeout.as_secs_f64(),
        })
    }
}

#[async_trait]
impl RenderContext for SplashContext {
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError> {
        self.url = Some(url.clone());
        self.clicks.clear();
        Ok(())
    }

    async fn snapshot(
        &mut self,
        wait: &WaitCondition,
        budget: Duration,
    ) -> Result<String, FetchError> {
        let url = self.url.clone().ok_or_else(|| FetchError::Render {
            url: String::new(),
            message: "no page loaded in render context".to_string(),
        })?;

        let response = self
            .renderer
            .client
            .post(self.renderer.endpoint.clone())
            .json(&self.request_body(&url, wait, budget))
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))?;

        if status.is_success() {
            let reply: SplashReply =
                serde_json::from_str(&body).map_err(|e| FetchError::Render {
                    url: url.to_string(),
                    message: format!("unexpected Splash reply: {}", e),
                })?;
            if !reply.ready {
                tracing::debug!(
                    url = %url,
                    selector = wait.as_str(),
                    clicks = self.clicks.len(),
                    "Splash gave up waiting"
                );
                return Err(FetchError::render_timeout(url.as_str(), budget));
            }
            return Ok(reply.html);
        }

        // Splash reports its own render timeout as 504
        if status.as_u16() == 504 {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: "Splash render timed out".to_string(),
                timeout: true,
            });
        }

        Err(FetchError::Render {
            url: url.to_string(),
            message: format!("Splash returned {}: {}", status.as_u16(), body.trim()),
        })
    }

    async fn click(&mut self, selector: &str) -> Result<(), FetchError> {
        if self.url.is_none() {
            return Err(FetchError::Render {
                url: String::new(),
                message: format!("cannot click '{}' before navigating", selector),
            });
        }
        self.clicks.push(selector.to_string());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        tracing::trace!(url = ?self.url, clicks = self.clicks.len(), "Closing Splash context");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::gateway::RenderingGateway;
    use crate::crawler::testing::FakeTransport;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const PRODUCT: &str = "https://shop.example.com/product7.html";

    fn renderer_with(server: &MockServer, settle: Duration) -> SplashRenderer {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        SplashRenderer::new(
            Client::new(),
            &base,
            settle,
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn renderer(server: &MockServer) -> SplashRenderer {
        renderer_with(server, Duration::from_millis(0))
    }

    fn reply(html: &str, ready: bool) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "html": html, "ready": ready }))
    }

    fn wait(selector: &str) -> WaitCondition {
        WaitCondition::new(selector).unwrap()
    }

    /// A Splash stand-in whose page only shows a price after two seconds of
    /// in-session render time
    struct SlowPrice;

    impl Respond for SlowPrice {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let args: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let in_session = args["settle"].as_f64().unwrap() + args["budget"].as_f64().unwrap();
            if args["wait"] == "span.price" && in_session >= 2.0 {
                reply(r#"<html><span class="price">$20</span></html>"#, true)
            } else {
                reply("<html><span>loading</span></html>", false)
            }
        }
    }

    fn slow_gateway(server: &MockServer, wait_timeout: Duration) -> RenderingGateway {
        RenderingGateway::new(
            Arc::new(FakeTransport::unused()),
            Arc::new(renderer_with(server, Duration::from_secs(1))),
            Duration::from_millis(100),
            wait_timeout,
        )
    }

    #[tokio::test]
    async fn test_snapshot_posts_url_clicks_and_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_partial_json(json!({
                "url": PRODUCT,
                "clicks": ["a.next"],
                "wait": "div.review",
                "poll": 0.1,
            })))
            .respond_with(reply("<html>page 2</html>", true))
            .mount(&server)
            .await;

        let mut ctx = renderer(&server).new_context().await.unwrap();
        ctx.navigate(&Url::parse(PRODUCT).unwrap()).await.unwrap();
        ctx.click("a.next").await.unwrap();
        let html = ctx
            .snapshot(&wait("div.review"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(html, "<html>page 2</html>");
        ctx.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_navigate_resets_clicks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .and(body_partial_json(json!({ "clicks": [] })))
            .respond_with(reply("<html>fresh</html>", true))
            .mount(&server)
            .await;

        let mut ctx = renderer(&server).new_context().await.unwrap();
        let url = Url::parse(PRODUCT).unwrap();
        ctx.navigate(&url).await.unwrap();
        ctx.click("a.next").await.unwrap();
        ctx.navigate(&url).await.unwrap();
        let html = ctx
            .snapshot(&wait("html"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(html, "<html>fresh</html>");
    }

    #[tokio::test]
    async fn test_unready_reply_is_render_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("<html>loading</html>", false))
            .mount(&server)
            .await;

        let mut ctx = renderer(&server).new_context().await.unwrap();
        ctx.navigate(&Url::parse(PRODUCT).unwrap()).await.unwrap();
        let err = ctx
            .snapshot(&wait("span.price"), Duration::from_millis(1500))
            .await
            .unwrap_err();
        assert!(err.is_render_timeout());
        assert!(matches!(err, FetchError::RenderTimeout { waited_ms: 1500, .. }));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>raw</html>"))
            .mount(&server)
            .await;

        let mut ctx = renderer(&server).new_context().await.unwrap();
        ctx.navigate(&Url::parse(PRODUCT).unwrap()).await.unwrap();
        let err = ctx
            .snapshot(&wait("span.price"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Render { .. }));
    }

    #[tokio::test]
    async fn test_lua_error_is_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("control not found: a.next"))
            .mount(&server)
            .await;

        let mut ctx = renderer(&server).new_context().await.unwrap();
        ctx.navigate(&Url::parse(PRODUCT).unwrap()).await.unwrap();
        let err = ctx
            .snapshot(&wait("span.price"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Render { .. }));
        assert!(err.to_string().contains("control not found"));
    }

    #[tokio::test]
    async fn test_snapshot_before_navigate_fails() {
        let server = MockServer::start().await;
        let mut ctx = renderer(&server).new_context().await.unwrap();
        assert!(ctx
            .snapshot(&wait("span.price"), Duration::from_secs(1))
            .await
            .is_err());
        assert!(ctx.click("a.next").await.is_err());
    }

    #[tokio::test]
    async fn test_late_render_is_awaited_in_one_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(SlowPrice)
            .mount(&server)
            .await;

        let gw = slow_gateway(&server, Duration::from_secs(3));
        let page = gw
            .fetch_rendered(&Url::parse(PRODUCT).unwrap(), &wait("span.price"))
            .await
            .unwrap();

        assert!(page.html().contains("$20"));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_render_slower_than_budget_times_out_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/execute"))
            .respond_with(SlowPrice)
            .mount(&server)
            .await;

        let gw = slow_gateway(&server, Duration::from_millis(500));
        let err = gw
            .fetch_rendered(&Url::parse(PRODUCT).unwrap(), &wait("span.price"))
            .await
            .unwrap_err();

        assert!(err.is_render_timeout());
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }
}
