//! The Link Rule Set
//!
//! An ordered list of URL patterns, each bound to a page kind and a fetch
//! mode. Classification is pure: the first rule whose pattern matches wins and
//! URLs no rule matches are simply not ours to crawl.

use crate::config::{RenderKind, RuleEntry, RuleKind};
use crate::crawler::{RenderMode, WaitCondition};
use crate::url::PageKind;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// A single compiled link rule
#[derive(Debug, Clone)]
pub struct LinkRule {
    /// Position in the rule set; doubles as the rule id carried by requests
    pub id: usize,
    /// Name given to the rule in the configuration
    pub name: String,
    pub kind: PageKind,
    pub pattern: Regex,
    pub render_mode: RenderMode,
    /// Whether the query string is dropped when computing the dedup key
    pub ignore_query: bool,
}

impl LinkRule {
    /// Site-assigned identifier from the rule's `id` capture group, if any
    pub fn site_id(&self, url: &Url) -> Option<String> {
        self.pattern
            .captures(url.as_str())
            .and_then(|caps| caps.name("id"))
            .map(|m| m.as_str().to_string())
    }
}

/// Ordered set of link rules
#[derive(Debug, Clone, Default)]
pub struct LinkRuleSet {
    rules: Vec<LinkRule>,
}

impl LinkRuleSet {
    /// Compiles the configured rules, preserving their order
    ///
    /// # Arguments
    ///
    /// * `entries` - Rule entries from the `[[rule]]` tables
    ///
    /// # Returns
    ///
    /// * `Ok(LinkRuleSet)` - All patterns and wait selectors compiled
    /// * `Err(ConfigError)` - A pattern or selector is invalid
    pub fn from_config(entries: &[RuleEntry]) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(entries.len());

        for (id, entry) in entries.iter().enumerate() {
            let pattern = Regex::new(&entry.pattern).map_err(|e| ConfigError::InvalidRule {
                rule: entry.id.clone(),
                message: e.to_string(),
            })?;

            let render_mode = match entry.render {
                RenderKind::Static => RenderMode::Static,
                RenderKind::Rendered => {
                    let selector = entry.wait_selector.as_deref().ok_or_else(|| {
                        ConfigError::InvalidRule {
                            rule: entry.id.clone(),
                            message: "rendered rules need a wait-selector".to_string(),
                        }
                    })?;
                    RenderMode::Rendered(WaitCondition::new(selector)?)
                }
            };

            let kind = match entry.kind {
                RuleKind::Listing => PageKind::Listing,
                RuleKind::Product => PageKind::Product,
            };

            rules.push(LinkRule {
                id,
                name: entry.id.clone(),
                kind,
                pattern,
                render_mode,
                ignore_query: entry.ignore_query,
            });
        }

        Ok(Self { rules })
    }

    /// Returns the first rule whose pattern matches the URL
    pub fn classify(&self, url: &Url) -> Option<&LinkRule> {
        let candidate = url.as_str();
        self.rules.iter().find(|rule| rule.pattern.is_match(candidate))
    }

    /// Looks a rule up by id
    pub fn get(&self, id: usize) -> Option<&LinkRule> {
        self.rules.get(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkRule> {
        self.rules.iter()
    }
}
