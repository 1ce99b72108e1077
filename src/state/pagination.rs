/// Review pagination state definitions
///
/// This module defines the states a review paginator moves through and the
/// cursor it owns while walking one product's review pages.
use std::fmt;

/// Represents the current state of a review paginator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationState {
    // ===== Active States =====
    /// Cursor initialized, nothing fetched yet
    Start,

    /// Obtaining the current review page
    FetchingPage,

    /// Parsing review entries off the current page
    ExtractingReviews,

    /// Deciding whether and how to move to the next page
    AdvancingPage,

    // ===== Terminal States =====
    /// Loop ended: exhausted, terminal control, desync or page bound
    Done,

    /// Rendering kept failing; the remaining reviews were given up
    Failed,
}

impl PaginationState {
    /// Returns true if the paginator has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// Any active state may fail.
    pub fn can_transition_to(&self, next: PaginationState) -> bool {
        use PaginationState::*;

        match (self, next) {
            (Start, FetchingPage) => true,
            (FetchingPage, ExtractingReviews) => true,
            (ExtractingReviews, AdvancingPage) => true,
            (AdvancingPage, FetchingPage) | (AdvancingPage, Done) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchingPage => "fetching_page",
            Self::ExtractingReviews => "extracting_reviews",
            Self::AdvancingPage => "advancing_page",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaginationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable cursor owned by one paginator invocation
///
/// Never shared and never persisted; it is dropped when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    pub product_id: u64,
    pub product_url: String,
    /// Fixed when the cursor is created
    pub total_review_count: u32,
    pub reviews_seen: u32,
    /// 1-based number of the page being processed
    pub page_number: u32,
}

impl PaginationCursor {
    pub fn new(product_id: u64, product_url: impl Into<String>, total_review_count: u32) -> Self {
        Self {
            product_id,
            product_url: product_url.into(),
            total_review_count,
            reviews_seen: 0,
            page_number: 1,
        }
    }

    /// Reviews still expected
    pub fn remaining(&self) -> u32 {
        self.total_review_count.saturating_sub(self.reviews_seen)
    }

    /// True once every expected review has been seen
    pub fn is_exhausted(&self) -> bool {
        self.reviews_seen >= self.total_review_count
    }

    /// Counts reviews extracted from the current page
    pub fn record(&mut self, extracted: u32) {
        self.reviews_seen += extracted;
    }

    /// Moves to the next page
    pub fn advance(&mut self) {
        self.page_number += 1;
    }

    /// Pages the review count implies at `per_page` reviews each
    pub fn estimated_pages(&self, per_page: u32) -> u32 {
        if per_page == 0 {
            return 0;
        }
        self.total_review_count.div_ceil(per_page)
    }
}
