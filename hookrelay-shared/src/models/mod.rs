//! Database models and the task scheduling state machine.
//!
//! - `account`: identity owning tasks, with the secret used by the REST layer
//! - `task`: the user's declaration plus live scheduling state
//! - `attempt`: one concrete delivery opportunity of a task
//! - `retry`: exponential backoff policy embedded in a task

pub mod account;
pub mod attempt;
pub mod retry;
pub mod task;

use thiserror::Error;

/// Errors surfaced by model operations
///
/// Validation failures (bad cron, unknown status filter) are distinguished
/// from store faults so the REST layer can map them to 4xx vs 5xx.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Underlying store error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid cron expression in a task declaration
    #[error(transparent)]
    Cron(#[from] crate::cron::CronError),

    /// Unknown task status in a list filter
    #[error("unknown task status: {0:?}")]
    UnknownStatus(String),
}

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy)]
pub struct ListParams {
    /// 1-based page number
    pub page: i64,

    /// Items per page
    pub per_page: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListParams {
    /// Row offset for the current page
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.per_page
    }
}

/// One page of a list operation, with totals for the REST envelope
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// Total matching rows across all pages
    pub total: i64,

    /// 1-based page number
    pub page: i64,

    /// Total number of pages
    pub pages: i64,

    /// Whether more pages follow this one
    pub has_more: bool,
}

impl<T> ListPage<T> {
    /// Assembles a page from the fetched items and the total row count.
    pub fn new(items: Vec<T>, total: i64, params: ListParams) -> Self {
        let page = params.page.max(1);
        let pages = if total == 0 {
            0
        } else {
            (total + params.per_page - 1) / params.per_page
        };
        Self {
            items,
            total,
            page,
            pages,
            has_more: page < pages,
        }
    }

    /// Number of items on this page
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_offset() {
        let params = ListParams::default();
        assert_eq!(params.offset(), 0);

        let params = ListParams { page: 3, per_page: 20 };
        assert_eq!(params.offset(), 40);

        // Page 0 is treated as page 1
        let params = ListParams { page: 0, per_page: 20 };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_list_page_totals() {
        let params = ListParams { page: 1, per_page: 10 };
        let page = ListPage::new(vec![1, 2, 3], 25, params);
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
        assert_eq!(page.count(), 3);
        assert!(page.has_more);

        let params = ListParams { page: 3, per_page: 10 };
        let page = ListPage::new(vec![1], 25, params);
        assert!(!page.has_more);
    }

    #[test]
    fn test_list_page_empty() {
        let page: ListPage<i32> = ListPage::new(vec![], 0, ListParams::default());
        assert_eq!(page.total, 0);
        assert_eq!(page.pages, 0);
        assert!(!page.has_more);
    }
}
