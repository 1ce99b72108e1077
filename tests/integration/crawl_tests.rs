//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up a mock storefront and a mock Splash
//! endpoint, then run the full crawl cycle end-to-end.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use storefront_crawler::config::{load_config_with_hash, Config};
use storefront_crawler::crawler::{Coordinator, RenderingGateway};
use storefront_crawler::output::{write_markdown_summary, DropKind};
use storefront_crawler::storage::{load_stored_counts, MemorySink, RunStatus};
use storefront_crawler::CrawlerError;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches Splash requests for one page URL with a given number of replayed
/// clicks and the selector the script must wait for
struct SplashRequest {
    url: String,
    clicks: usize,
    wait: &'static str,
}

impl Match for SplashRequest {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        body["url"].as_str() == Some(self.url.as_str())
            && body["clicks"].as_array().map(|c| c.len()) == Some(self.clicks)
            && body["wait"].as_str() == Some(self.wait)
    }
}

fn splash_request(url: String, clicks: usize, wait: &'static str) -> SplashRequest {
    SplashRequest { url, clicks, wait }
}

/// A Splash reply whose wait selector was satisfied in-session
fn splash_reply(html: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "html": html, "ready": true }))
}

/// Writes a crawl config for the mock site and loads it back
fn write_config(
    dir: &TempDir,
    site: &str,
    splash: &str,
    strategy: &str,
) -> (Config, String) {
    let db_path = dir.path().join("crawl.db");
    let summary_path = dir.path().join("summary.md");
    let content = format!(
        r##"
[crawler]
max-concurrent-fetches = 4
max-fetch-retries = 1
retry-delay-ms = 10

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[render]
splash-url = "{splash}"
poll-interval-ms = 10
wait-timeout-ms = 2000
settle-ms = 0
render-attempts = 2
request-timeout-secs = 5

[site]
roots = ["{site}/hoodies-c-181-page-1.html"]
allowed-domains = ["127.0.0.1"]

[[rule]]
id = "listing"
kind = "listing"
pattern = 'page-[0-9]+\.html'

[[rule]]
id = "product"
kind = "product"
pattern = 'product(?P<id>[0-9]+)\.html'
render = "rendered"
wait-selector = "span.price"

[selectors.product]
name = "h1.name"
original-price = "span.price"
discount = "span.discount"
attribute-labels = "dl.info dt"
attribute-values = "dl.info dd"
review-count = "#review-count"

[selectors.review]
entry = "div.review"
selected-star = "i.star-on"
timestamp = "span.time"
timestamp-format = "%b,%d %Y %H:%M:%S"
text = "p.body"
size = "span.size"
color = "span.color"

[reviews]
reviews-per-page = 6
max-pages = 10
strategy = "{strategy}"
url-template = "{site}/reviews/{{product_id}}/{{page}}"

[reviews.pager]
control = "a.next"
terminal-label = ">"

[output]
database-path = "{db}"
summary-path = "{summary}"
"##,
        splash = splash,
        site = site,
        strategy = strategy,
        db = db_path.display(),
        summary = summary_path.display(),
    );

    let config_path = dir.path().join("crawl.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    load_config_with_hash(&config_path).expect("Failed to load config")
}

fn reviews_html(entries: usize, page: u32, next: bool) -> String {
    let mut html = String::from("<html><body>");
    for i in 0..entries {
        html.push_str(&format!(
            r#"<div class="review">
                <i class="star-on"></i><i class="star-on"></i><i class="star-on"></i><i class="star-on"></i>
                <span class="time">Mar,14 2019 08:00:00</span>
                <p class="body">Page {} review {}</p>
                <span class="size">Size: L</span>
                <span class="color">Color: Black</span>
            </div>"#,
            page, i
        ));
    }
    if next {
        html.push_str(r#"<a class="next">next</a>"#);
    }
    html.push_str("</body></html>");
    html
}

fn product_html(name: &str, price: &str, review_count: u32, reviews: &str) -> String {
    format!(
        r#"<html><body>
            <h1 class="name">{}</h1>
            <span class="price">{}</span>
            <span class="discount">-10%</span>
            <dl class="info"><dt>Material:</dt><dd></dd><dd>Cotton</dd></dl>
            <span id="review-count">({})</span>
            {}
        </body></html>"#,
        name, price, review_count, reviews
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts the category listings shared by every test
async fn mount_listings(site: &MockServer) {
    let base = site.uri();
    mount_html(
        site,
        "/hoodies-c-181-page-1.html",
        format!(
            r#"<html><body>
            <a href="{base}/zip-hoodie-product4471.html">Zip Hoodie</a>
            <a href="{base}/pullover-product4472.html?color=gray">Pullover</a>
            <a href="{base}/hoodies-c-181-page-2.html">2</a>
            <a href="{base}/help.html">Help</a>
            </body></html>"#,
            base = base
        ),
    )
    .await;
    mount_html(
        site,
        "/hoodies-c-181-page-2.html",
        format!(
            r#"<html><body>
            <a href="{base}/pullover-product4472.html?color=navy">Pullover</a>
            <a href="https://cdn.example.org/logo-product1.html">Logo</a>
            </body></html>"#,
            base = base
        ),
    )
    .await;
}

#[tokio::test]
async fn test_full_crawl_direct_url_reviews() {
    let site = MockServer::start().await;
    let splash = MockServer::start().await;
    let base = site.uri();
    mount_listings(&site).await;

    // Product pages come back from Splash
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(
            format!("{}/zip-hoodie-product4471.html", base),
            0,
            "span.price",
        ))
        .respond_with(splash_reply(product_html("Zip Hoodie", "$30.00", 8, "")))
        .mount(&splash)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(
            format!("{}/pullover-product4472.html?color=gray", base),
            0,
            "span.price",
        ))
        .respond_with(splash_reply(product_html("Pullover", "$20.00", 0, "")))
        .mount(&splash)
        .await;

    // Review pages are plain HTML at a direct URL
    mount_html(&site, "/reviews/4471/1", reviews_html(6, 1, true)).await;
    mount_html(&site, "/reviews/4471/2", reviews_html(2, 2, false)).await;

    let dir = TempDir::new().unwrap();
    let (config, hash) = write_config(&dir, &base, &splash.uri(), "direct-url");
    let db_path = config.output.database_path.clone();
    let summary_path = config.output.summary_path.clone();

    let coordinator = Coordinator::from_config(config, &hash).expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.listing_pages, 2);
    assert_eq!(report.product_pages, 2);
    assert_eq!(report.products_emitted, 2);
    assert_eq!(report.reviews_emitted, 8);
    assert_eq!(report.review_pages, 2);
    assert_eq!(report.drops_of(DropKind::DuplicateLink), 1);
    assert_eq!(report.drops_of(DropKind::UnmatchedLink), 1);
    assert_eq!(report.drops_of(DropKind::OffsiteLink), 1);
    assert!(report.shortfalls.is_empty());

    let counts = load_stored_counts(Path::new(&db_path)).expect("Failed to read database");
    assert_eq!(counts.runs, 1);
    assert_eq!(counts.products, 2);
    assert_eq!(counts.reviews, 8);
    assert_eq!(
        counts.latest_run.map(|(_, status)| status),
        Some("completed".to_string())
    );

    write_markdown_summary(&report, Path::new(&summary_path)).expect("Failed to write summary");
    let summary = std::fs::read_to_string(&summary_path).unwrap();
    assert!(summary.contains("| Reviews emitted | 8 |"));
}

#[tokio::test]
async fn test_full_crawl_drive_control_reviews() {
    let site = MockServer::start().await;
    let splash = MockServer::start().await;
    let base = site.uri();
    mount_listings(&site).await;

    let hoodie_url = format!("{}/zip-hoodie-product4471.html", base);
    let hoodie_page = product_html("Zip Hoodie", "$30.00", 10, &reviews_html(6, 1, true));

    // Page 1 of the reviews is on the product page; page 2 needs one click
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(hoodie_url.clone(), 0, "span.price"))
        .respond_with(splash_reply(hoodie_page.clone()))
        .mount(&splash)
        .await;
    // Advancing replays from a fresh load that waits for the review entries
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(hoodie_url.clone(), 0, "div.review"))
        .respond_with(splash_reply(hoodie_page))
        .mount(&splash)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(hoodie_url.clone(), 1, "div.review"))
        .respond_with(splash_reply(reviews_html(4, 2, false)))
        .mount(&splash)
        .await;
    // The pullover claims 3 reviews but its pager is missing after the first
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(splash_request(
            format!("{}/pullover-product4472.html?color=gray", base),
            0,
            "span.price",
        ))
        .respond_with(splash_reply(product_html(
            "Pullover",
            "$20.00",
            3,
            &reviews_html(1, 1, false),
        )))
        .mount(&splash)
        .await;

    let dir = TempDir::new().unwrap();
    let (config, _) = write_config(&dir, &base, &splash.uri(), "drive-control");
    let gateway = Arc::new(RenderingGateway::from_config(&config).unwrap());
    let sink = Arc::new(MemorySink::new());

    let coordinator = Coordinator::new(config, gateway, sink.clone()).unwrap();
    let report = coordinator.run().await.expect("Crawl failed");

    let products = sink.products();
    let hoodie = products.iter().find(|p| p.name == "Zip Hoodie").unwrap();
    let pullover = products.iter().find(|p| p.name == "Pullover").unwrap();

    assert_eq!(hoodie.original_price, 30.0);
    assert_eq!(hoodie.discount_percent, 10);
    assert_eq!(
        hoodie.attributes,
        vec![("Material:".to_string(), "Cotton".to_string())]
    );

    let hoodie_reviews = sink.reviews_for(hoodie.product_id);
    assert_eq!(hoodie_reviews.len(), 10);
    assert_eq!(hoodie_reviews[9].text, "Page 2 review 3");
    assert!(hoodie_reviews.iter().all(|r| r.rating == 4 && r.size == "L"));
    assert_eq!(hoodie_reviews[0].submitted_at, 1_552_550_400);

    assert_eq!(sink.reviews_for(pullover.product_id).len(), 1);
    assert_eq!(report.drops_of(DropKind::PaginationDesync), 1);
    assert_eq!(report.shortfalls.len(), 1);
    assert_eq!(report.shortfalls[0].missing(), 2);
    assert_eq!(sink.status(), Some(RunStatus::Completed));
}

#[tokio::test]
async fn test_unreachable_root_fails_run() {
    let site = MockServer::start().await;
    let splash = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hoodies-c-181-page-1.html"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&site)
        .await;

    let dir = TempDir::new().unwrap();
    let (config, hash) = write_config(&dir, &site.uri(), &splash.uri(), "direct-url");
    let db_path = config.output.database_path.clone();

    let coordinator = Coordinator::from_config(config, &hash).unwrap();
    let err = coordinator.run().await.unwrap_err();

    assert!(matches!(
        err,
        CrawlerError::RootUnreachable { attempts: 2, .. }
    ));

    let counts = load_stored_counts(Path::new(&db_path)).unwrap();
    assert_eq!(counts.products, 0);
    assert_eq!(
        counts.latest_run.map(|(_, status)| status),
        Some("failed".to_string())
    );
}
