//! Configuration module for the storefront crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use storefront_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Roots: {:?}", config.site.roots);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, PagerConfig, ProductSelectorConfig, RenderConfig,
    RenderKind, ReviewConfig, ReviewSelectorConfig, RuleEntry, RuleKind, SelectorConfig,
    SiteConfig, StrategyKind, TraversalOrder, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
pub(crate) use validation::compile_selector;

#[cfg(test)]
pub(crate) use parser::{test_config, TEST_CONFIG};
