//! The crawl frontier
//!
//! This module handles:
//! - Deduplication of discovered links by normalized URL
//! - Classification of links through the Link Rule Set
//! - The queue of admitted fetch requests, popped FIFO or LIFO
//! - Re-queueing of requests that failed transiently
//!
//! The dedup set is the only state shared between concurrent fetches. The
//! check and the insert happen under a single lock acquisition, so two
//! callers can never both admit the same URL.

use crate::config::{Config, TraversalOrder};
use crate::crawler::request::{FetchRequest, Link, RenderMode};
use crate::url::{is_allowed_domain, normalize_url, LinkRuleSet, NormalizedUrl, PageKind};
use crate::{ConfigError, UrlError};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use url::Url;

/// Outcome of offering a link to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Newly seen; a fetch request was queued
    Admitted,
    /// Already seen under the same normalized URL
    Duplicate,
    /// No rule matched
    Unmatched,
    /// Host outside the allowed domains
    Offsite,
    /// The URL could not be normalized
    Invalid,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

struct FrontierInner {
    seen: HashSet<NormalizedUrl>,
    queue: VecDeque<FetchRequest>,
}

/// Frontier of not-yet-dispatched fetch requests
pub struct Frontier {
    rules: Arc<LinkRuleSet>,
    allowed_domains: Vec<String>,
    order: TraversalOrder,
    max_retries: u32,
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `rules` - The Link Rule Set used to classify links
    /// * `allowed_domains` - Host patterns links must match (empty allows all)
    /// * `order` - FIFO for breadth-first or LIFO for depth-first traversal
    /// * `max_retries` - Ceiling for `retry_count` on re-queued requests
    pub fn new(
        rules: Arc<LinkRuleSet>,
        allowed_domains: Vec<String>,
        order: TraversalOrder,
        max_retries: u32,
    ) -> Self {
        Self {
            rules,
            allowed_domains,
            order,
            max_retries,
            inner: Mutex::new(FrontierInner {
                seen: HashSet::new(),
                queue: VecDeque::new(),
            }),
        }
    }

    /// Builds a frontier from the `[crawler]`, `[site]` and `[[rule]]` tables
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let rules = LinkRuleSet::from_config(&config.rules)?;
        Ok(Self::new(
            Arc::new(rules),
            config.site.allowed_domains.clone(),
            config.crawler.traversal_order,
            config.crawler.max_fetch_retries,
        ))
    }

    pub fn rules(&self) -> &Arc<LinkRuleSet> {
        &self.rules
    }

    /// Queues a category root
    ///
    /// Roots bypass rule matching: a root matching a listing rule takes that
    /// rule's render mode, anything else is fetched statically. Either way it
    /// is treated as a listing page.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The root was queued
    /// * `Ok(false)` - The same root was already seeded
    /// * `Err(UrlError)` - The root is not a valid http(s) URL
    pub fn seed(&self, root: &Url) -> Result<bool, UrlError> {
        let listing_rule = self
            .rules
            .classify(root)
            .filter(|rule| rule.kind == PageKind::Listing);

        let ignore_query = listing_rule.map_or(false, |rule| rule.ignore_query);
        let key = normalize_url(root.as_str(), ignore_query)?;

        let request = match listing_rule {
            Some(rule) => FetchRequest::root(root.clone(), Some(rule.id), rule.render_mode.clone()),
            None => FetchRequest::root(root.clone(), None, RenderMode::Static),
        };

        let mut inner = self.inner.lock().unwrap();
        if !inner.seen.insert(key) {
            return Ok(false);
        }
        inner.queue.push_back(request);
        Ok(true)
    }

    /// Offers a link to the frontier
    ///
    /// The link is checked against the allowed domains, classified, and
    /// normalized with its rule's query handling. The dedup check and insert
    /// are one atomic step.
    pub fn admit(&self, link: &Link) -> Admission {
        if !is_allowed_domain(&link.url, &self.allowed_domains) {
            return Admission::Offsite;
        }

        let Some(rule) = self.rules.classify(&link.url) else {
            return Admission::Unmatched;
        };

        let key = match normalize_url(link.url.as_str(), rule.ignore_query) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Dropping link {}: {}", link.url, e);
                return Admission::Invalid;
            }
        };

        let request = FetchRequest {
            url: link.url.clone(),
            rule_id: Some(rule.id),
            kind: rule.kind,
            render_mode: rule.render_mode.clone(),
            retry_count: 0,
            is_root: false,
        };

        let mut inner = self.inner.lock().unwrap();
        if !inner.seen.insert(key) {
            return Admission::Duplicate;
        }
        inner.queue.push_back(request);
        drop(inner);

        tracing::trace!(url = %link.url, rule = %rule.name, anchor = %link.anchor_text, "Admitted link");
        Admission::Admitted
    }

    /// Returns true if the link was newly admitted
    pub fn enqueue(&self, link: &Link) -> bool {
        self.admit(link).is_admitted()
    }

    /// Pops the next request in the configured traversal order
    pub fn dequeue(&self) -> Option<FetchRequest> {
        let mut inner = self.inner.lock().unwrap();
        match self.order {
            TraversalOrder::Fifo => inner.queue.pop_front(),
            TraversalOrder::Lifo => inner.queue.pop_back(),
        }
    }

    /// Puts a failed request back for another attempt
    ///
    /// Skips the dedup check since the URL is already in the seen set.
    ///
    /// # Returns
    ///
    /// * `true` - The request was re-queued with its retry count bumped
    /// * `false` - The request has used up its retries
    pub fn requeue(&self, request: FetchRequest) -> bool {
        if request.retry_count >= self.max_retries {
            return false;
        }

        let request = request.retried();
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(request);
        true
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct URLs ever admitted
    pub fn seen_count(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }
}
