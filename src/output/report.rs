//! Run report
//!
//! Counts what a crawl run did and, more importantly, what it dropped: every
//! link, page, field and review that did not make it into the sink is tallied
//! under a `DropKind`, and every product whose reviews fell short is listed.

use crate::crawler::{PaginationOutcome, Termination};
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Why something was dropped during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropKind {
    /// Link already seen under the same normalized URL
    DuplicateLink,
    /// Link matched no rule
    UnmatchedLink,
    /// Link outside the allowed domains
    OffsiteLink,
    /// Request abandoned after transport or HTTP failures
    FetchTransportError,
    /// Request abandoned after its wait condition never matched
    RenderTimeout,
    /// A product selector matched nothing and the default was used
    ExtractionFieldMissing,
    /// The pager ran out before the review count was reached
    PaginationDesync,
    /// The page bound cut pagination short
    MaxPageBoundExceeded,
    /// Advancing to a review page failed on every attempt
    PaginationFailed,
    /// The sink refused a record
    SinkRejected,
}

impl DropKind {
    pub const ALL: [DropKind; 10] = [
        DropKind::DuplicateLink,
        DropKind::UnmatchedLink,
        DropKind::OffsiteLink,
        DropKind::FetchTransportError,
        DropKind::RenderTimeout,
        DropKind::ExtractionFieldMissing,
        DropKind::PaginationDesync,
        DropKind::MaxPageBoundExceeded,
        DropKind::PaginationFailed,
        DropKind::SinkRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateLink => "duplicate_link",
            Self::UnmatchedLink => "unmatched_link",
            Self::OffsiteLink => "offsite_link",
            Self::FetchTransportError => "fetch_transport_error",
            Self::RenderTimeout => "render_timeout",
            Self::ExtractionFieldMissing => "extraction_field_missing",
            Self::PaginationDesync => "pagination_desync",
            Self::MaxPageBoundExceeded => "max_page_bound_exceeded",
            Self::PaginationFailed => "pagination_failed",
            Self::SinkRejected => "sink_rejected",
        }
    }

    /// Expected drops that do not indicate lost data
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateLink | Self::UnmatchedLink | Self::OffsiteLink)
    }
}

impl fmt::Display for DropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product whose reviews were not all collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: u64,
    pub product_url: String,
    pub expected: u32,
    pub seen: u32,
    pub reason: String,
}

impl Shortfall {
    pub fn missing(&self) -> u32 {
        self.expected.saturating_sub(self.seen)
    }
}

/// Summary of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub roots: usize,
    pub listing_pages: u64,
    pub product_pages: u64,
    pub products_emitted: u64,
    pub reviews_emitted: u64,
    /// Products whose reviews were paginated
    pub products_paginated: u64,
    pub review_pages: u64,
    /// Re-queued fetches
    pub retries: u64,
    pub drops: BTreeMap<DropKind, u64>,
    pub shortfalls: Vec<Shortfall>,
}

impl Default for CrawlReport {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            roots: 0,
            listing_pages: 0,
            product_pages: 0,
            products_emitted: 0,
            reviews_emitted: 0,
            products_paginated: 0,
            review_pages: 0,
            retries: 0,
            drops: BTreeMap::new(),
            shortfalls: Vec::new(),
        }
    }

    pub fn record_drop(&mut self, kind: DropKind) {
        self.record_drops(kind, 1);
    }

    pub fn record_drops(&mut self, kind: DropKind, count: u64) {
        if count > 0 {
            *self.drops.entry(kind).or_insert(0) += count;
        }
    }

    /// Drops counted under `kind`
    pub fn drops_of(&self, kind: DropKind) -> u64 {
        self.drops.get(&kind).copied().unwrap_or(0)
    }

    /// Drops that lost data, excluding duplicate/unmatched/offsite links
    pub fn data_drops(&self) -> u64 {
        self.drops
            .iter()
            .filter(|(kind, _)| !kind.is_benign())
            .map(|(_, count)| count)
            .sum()
    }

    /// Folds one paginator outcome into the report
    pub fn record_pagination(&mut self, outcome: &PaginationOutcome) {
        self.products_paginated += 1;
        self.review_pages += outcome.pages_visited as u64;
        self.reviews_emitted +=
            (outcome.reviews_seen as u64).saturating_sub(outcome.sink_rejections as u64);
        self.record_drops(DropKind::SinkRejected, outcome.sink_rejections as u64);

        match &outcome.termination {
            Termination::Exhausted => {}
            Termination::NoNextPage | Termination::EmptyPage => {
                if outcome.is_desync() {
                    self.record_drop(DropKind::PaginationDesync);
                }
            }
            Termination::MaxPagesExceeded => self.record_drop(DropKind::MaxPageBoundExceeded),
            Termination::RenderFailed { .. } => self.record_drop(DropKind::PaginationFailed),
        }

        if outcome.shortfall() > 0 {
            self.shortfalls.push(Shortfall {
                product_id: outcome.product_id,
                product_url: outcome.product_url.clone(),
                expected: outcome.total_review_count,
                seen: outcome.reviews_seen,
                reason: outcome.termination.to_string(),
            });
        }
    }

    /// Sum of all review shortfalls
    pub fn total_shortfall(&self) -> u64 {
        self.shortfalls.iter().map(|s| s.missing() as u64).sum()
    }

    /// Stamps the end of the run
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}
