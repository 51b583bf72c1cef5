//! Page-by-page collection walker.
//!
//! Drains a paginated GitLab collection into a single ordered `Vec`. Both the
//! `x-total-pages` header and the size of each page decide whether another
//! request is made, so collections whose page count is missing or wrong are
//! still read to the end.

use crate::error::AppError;
use std::future::Future;

/// Upper bound on pages requested in a single walk.
pub const MAX_PAGES: u32 = 10_000;

/// Pagination information from GitLab API response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    /// Current page number.
    pub page: u32,

    /// Number of items per page.
    pub per_page: u32,

    /// Total number of pages; 0 when the source did not say.
    pub total_pages: u32,

    /// Total number of items, when reported.
    pub total: Option<u32>,
}

/// One page of a collection.
#[derive(Debug)]
pub struct PaginatedResponse<T> {
    /// The response data.
    pub data: Vec<T>,

    /// Pagination information.
    pub pagination: PaginationInfo,
}

impl<T> PaginatedResponse<T> {
    /// Build a response from items and an explicit page count.
    pub fn new(data: Vec<T>, page: u32, per_page: u32, total_pages: u32) -> Self {
        Self {
            data,
            pagination: PaginationInfo {
                page,
                per_page,
                total_pages,
                total: None,
            },
        }
    }
}

/// Whether the walk should request `page + 1` after reading `page`.
fn has_more(page: u32, per_page: u32, fetched: usize, total_pages: u32) -> bool {
    if fetched == 0 {
        return false;
    }
    total_pages > page || fetched == per_page as usize
}

/// Fetch every page of a collection, starting at page 1.
///
/// A failed request ends the walk and the items gathered so far are
/// returned; callers treat a short result as possibly incomplete. `label`
/// only appears in log lines.
pub async fn fetch_all_pages<T, F, Fut>(label: &str, per_page: u32, mut fetch: F) -> Vec<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>, AppError>>,
{
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let response = match fetch(page).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    "Fetching page {} of {} failed, keeping {} item(s): {}",
                    page,
                    label,
                    items.len(),
                    e
                );
                break;
            }
        };

        let fetched = response.data.len();
        let total_pages = response.pagination.total_pages;
        items.extend(response.data);

        if !has_more(page, per_page, fetched, total_pages) {
            break;
        }

        if page >= MAX_PAGES {
            log::warn!(
                "{} still returning full pages after {} pages, stopping",
                label,
                MAX_PAGES
            );
            break;
        }

        page += 1;
    }

    log::debug!("Fetched {} item(s) from {} in {} page(s)", items.len(), label, page);
    items
}
