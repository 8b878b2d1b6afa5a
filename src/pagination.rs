//! Page-number pagination for list views.

use serde::Serialize;

/// Position of one page within a result set of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub number: i64,
    pub per_page: i64,
    pub total: i64,
    pub num_pages: i64,
}

impl PageInfo {
    /// Resolve a raw `?page=` value. Anything unparsable selects the first page;
    /// any number outside `1..=num_pages`, zero and negatives included, selects
    /// the last page.
    pub fn resolve(raw: Option<&str>, total: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total = total.max(0);
        let num_pages = ((total + per_page - 1) / per_page).max(1);

        let number = match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
            None => 1,
            Some(n) if (1..=num_pages).contains(&n) => n,
            Some(_) => num_pages,
        };

        Self {
            number,
            per_page,
            total,
            num_pages,
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }
}

/// One page of items plus where it sits.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, info: PageInfo) -> Self {
        Self { items, info }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
