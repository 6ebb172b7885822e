use serde::{Deserialize, Serialize};

/// Page-based pagination parameters (1-indexed pages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Create pagination with page number and per-page count.
    ///
    /// Page 0 is treated as page 1 and a zero page size as 1; callers that
    /// must reject such input validate before constructing.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Rows to skip before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// Ceiling division, never less than 1
    pub fn total_pages(&self, total_entries: u64) -> u64 {
        total_entries.div_ceil(self.limit()).max(1)
    }

    /// Check if there's a next page
    pub fn has_next_page(&self, total_entries: u64) -> bool {
        self.offset() + self.limit() < total_entries
    }

    /// Check if there's a previous page
    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }

    /// Response block for a page of `total_entries` matches
    pub fn info(&self, total_entries: u64) -> PaginationInfo {
        PaginationInfo {
            page: self.page,
            page_size: self.page_size,
            total_entries,
            total_pages: self.total_pages(total_entries),
        }
    }
}

/// Pagination block returned with every listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_entries: u64,
    pub total_pages: u64,
}
