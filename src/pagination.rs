use mongodb::options::FindOptions;
use mongodb::bson::Document;
use serde::Serialize;

pub const DEFAULT_LIMIT: u64 = 12;
pub const MAX_LIMIT: u64 = 100;

/// Page/limit after defaults and clamping. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Pagination {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    /// Saturates at `i64::MAX`, the largest skip the server accepts.
    pub fn skip(&self) -> u64 {
        (self.page - 1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }

    pub fn find_options(&self, sort: Document) -> FindOptions {
        FindOptions::builder()
            .sort(sort)
            .skip(self.skip())
            .limit(self.limit as i64)
            .build()
    }

    pub fn page_of<T>(&self, items: Vec<T>, total_count: u64) -> Page<T> {
        Page {
            items,
            current_page: self.page,
            total_pages: total_pages(total_count, self.limit),
            total_count,
        }
    }
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u64,
    pub total_pages: u64,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: DEFAULT_LIMIT });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, limit: 1 });
        assert_eq!(Pagination::new(Some(3), Some(1000)).limit, MAX_LIMIT);
        assert_eq!(Pagination::new(Some(3), Some(20)).skip(), 40);
    }

    #[test]
    fn huge_pages_do_not_overflow_skip() {
        assert_eq!(Pagination::new(Some(u64::MAX), Some(MAX_LIMIT)).skip(), i64::MAX as u64);
        assert_eq!(Pagination::new(Some(u64::MAX), None).page, u64::MAX);
    }

    #[test]
    fn total_pages_is_ceiling() {
        assert_eq!(total_pages(0, 12), 0);
        assert_eq!(total_pages(12, 12), 1);
        assert_eq!(total_pages(13, 12), 2);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(250, 25), 10);
    }

    #[test]
    fn page_envelope_uses_camel_case() {
        let page = Pagination::new(Some(2), Some(5)).page_of(vec![1, 2], 7);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["currentPage"], 2);
        assert_eq!(value["totalPages"], 2);
        assert_eq!(value["totalCount"], 7);
        assert_eq!(value["items"], serde_json::json!([1, 2]));
    }
}
