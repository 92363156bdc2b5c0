//! Pagination utilities for rvw-admin list endpoints

use serde::Serialize;

/// Rows per page when the client does not ask for a size
pub const DEFAULT_PER_PAGE: i64 = 25;

/// Upper bound on `per_page`
pub const MAX_PER_PAGE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page after clamping
    pub per_page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// `per_page` is clamped to `1..=MAX_PER_PAGE` (default [`DEFAULT_PER_PAGE`]),
/// and `page` to `[1, total_pages]`.
///
/// # Examples
/// ```
/// use rvw_admin::pagination::calculate_pagination;
///
/// // 60 total results at 25 per page = 3 pages (25 + 25 + 10)
/// let p = calculate_pagination(60, Some(2), None);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 25);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(60, Some(99), None);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 50);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: Option<i64>,
    requested_per_page: Option<i64>,
) -> Pagination {
    let per_page = requested_per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let total_pages = (total_results.max(0) + per_page - 1) / per_page;
    let page = requested_page.unwrap_or(1).max(1).min(total_pages.max(1));
    let offset = (page - 1) * per_page;

    Pagination {
        page,
        per_page,
        total_pages,
        offset,
    }
}

/// One page of a list endpoint
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: i64, pagination: Pagination) -> Self {
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total_items,
            total_pages: pagination.total_pages,
        }
    }
}
