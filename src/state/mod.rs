//! State module for review pagination
//!
//! # Components
//!
//! - `PaginationState`: The states a review paginator moves through
//! - `PaginationCursor`: Per-product progress owned by one paginator run

mod pagination;

// Re-export main types
pub use pagination::{PaginationCursor, PaginationState};
