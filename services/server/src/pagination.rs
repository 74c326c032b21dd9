use serde::Deserialize;
use std::collections::HashMap;

/// Cap used by `Context::get_pagination` when a handler doesn't specify
/// its own upper bound.
pub const DEFAULT_MAX_PAGE_SIZE: i64 = 100;

/// Mirrors the original's `Page`: the raw pagination request fragment a
/// handler expects to find under the `page` key of a request's params.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub current: i64,
    #[serde(default, rename = "pageSize")]
    pub page_size: i64,
}

/// A resolved pagination window: clamped current/pageSize plus the
/// derived offset/limit a store query uses directly.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub current: i64,
    pub page_size: i64,
    pub offset: i64,
    pub limit: i64,
    pub ex_data: HashMap<String, serde_json::Value>,
}

impl Pagination {
    /// `current <= 1` clamps to 1; `pageSize <= 0` defaults to 10;
    /// `pageSize > max_size` clamps to `max_size` (when `max_size > 0`).
    pub fn init(page: &Page, max_size: i64) -> Self {
        let current = if page.current <= 1 { 1 } else { page.current };

        let mut page_size = if page.page_size <= 0 {
            10
        } else {
            page.page_size
        };

        if max_size > 0 && page_size > max_size {
            page_size = max_size;
        }

        Self {
            current,
            page_size,
            offset: (current - 1) * page_size,
            limit: page_size,
            ex_data: HashMap::new(),
        }
    }

    pub fn add_ex_data(&mut self, key: impl Into<String>, value: impl serde::Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.ex_data.insert(key.into(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_zero_clamps_to_one() {
        let p = Pagination::init(&Page { current: 0, page_size: 10 }, 100);
        assert_eq!(p.current, 1);
    }

    #[test]
    fn page_size_zero_defaults_to_ten() {
        let p = Pagination::init(&Page { current: 1, page_size: 0 }, 100);
        assert_eq!(p.page_size, 10);
    }

    #[test]
    fn page_size_above_cap_clamps_to_cap() {
        let p = Pagination::init(&Page { current: 1, page_size: 500 }, 100);
        assert_eq!(p.page_size, 100);
    }

    #[test]
    fn offset_and_limit_are_derived() {
        let p = Pagination::init(&Page { current: 3, page_size: 20 }, 100);
        assert_eq!(p.offset, 40);
        assert_eq!(p.limit, 20);
    }
}
