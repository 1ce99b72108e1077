//! Storefront crawler main entry point
//!
//! This is the command-line interface for the storefront crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use storefront_crawler::config::{load_config_with_hash, Config, RenderKind, StrategyKind};
use storefront_crawler::crawler::crawl;
use storefront_crawler::output::{print_report, print_stored_counts, write_markdown_summary};
use storefront_crawler::storage::load_stored_counts;
use tracing_subscriber::EnvFilter;

/// Storefront crawler: products and reviews from a rendered category
///
/// Crawls the listing pages of one e-commerce category, renders product pages
/// that need JavaScript, walks every product's paginated reviews and stores
/// products and reviews in SQLite.
#[derive(Parser, Debug)]
#[command(name = "storefront-crawler")]
#[command(version)]
#[command(about = "A render-aware category crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show stored record counts from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("storefront_crawler=info,warn"),
            1 => EnvFilter::new("storefront_crawler=debug,info"),
            2 => EnvFilter::new("storefront_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows roots, rules and the review strategy
fn handle_dry_run(config: &Config) {
    println!("=== Storefront Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrent fetches: {}", config.crawler.max_concurrent_fetches);
    println!("  Traversal order: {:?}", config.crawler.traversal_order);
    println!("  Max fetch retries: {}", config.crawler.max_fetch_retries);
    println!("  Retry delay: {}ms", config.crawler.retry_delay_ms);

    println!("\nRendering:");
    println!("  Splash: {}", config.render.splash_url);
    println!(
        "  Wait: poll every {}ms, give up after {}ms",
        config.render.poll_interval_ms, config.render.wait_timeout_ms
    );
    println!("  Render attempts: {}", config.render.render_attempts);

    println!("\nRoots ({}):", config.site.roots.len());
    for root in &config.site.roots {
        println!("  - {}", root);
    }

    println!("\nAllowed Domains ({}):", config.site.allowed_domains.len());
    for pattern in &config.site.allowed_domains {
        println!("  - {}", pattern);
    }

    println!("\nLink Rules ({}):", config.rules.len());
    for rule in &config.rules {
        let render = match (&rule.render, &rule.wait_selector) {
            (RenderKind::Rendered, Some(wait)) => format!("rendered, wait for '{}'", wait),
            (RenderKind::Rendered, None) => "rendered".to_string(),
            (RenderKind::Static, _) => "static".to_string(),
        };
        println!("  - {} [{:?}] {} ({})", rule.id, rule.kind, rule.pattern, render);
    }

    println!("\nReviews:");
    match config.reviews.strategy {
        StrategyKind::DirectUrl => println!(
            "  Strategy: direct-url ({})",
            config.reviews.url_template.as_deref().unwrap_or("-")
        ),
        StrategyKind::DriveControl => println!("  Strategy: drive-control"),
    }
    if let Some(pager) = &config.reviews.pager {
        println!("  Pager control: {}", pager.control);
    }
    println!("  Reviews per page: {}", config.reviews.reviews_per_page);
    println!("  Max pages: {}", config.reviews.max_pages);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling from {} root URLs",
        config.site.roots.len()
    );
}

/// Handles the --stats mode: shows stored record counts
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let counts = load_stored_counts(Path::new(&config.output.database_path))
        .context("failed to read stored records")?;
    print_stored_counts(&counts);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Roots: {}, rules: {}, review strategy: {:?}",
        config.site.roots.len(),
        config.rules.len(),
        config.reviews.strategy
    );

    let summary_path = PathBuf::from(&config.output.summary_path);

    let report = match crawl(config, config_hash).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_report(&report);

    write_markdown_summary(&report, &summary_path)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    tracing::info!("Summary written to {}", summary_path.display());

    Ok(())
}
