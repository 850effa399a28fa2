//! Pagination utilities for dioptra-restapi
//!
//! List endpoints take `index` (offset of the first row) and `pageLength`,
//! and answer with a [`Page`] whose `first`/`next`/`prev` links repeat the
//! query's filters.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Page length used when the request does not name one
pub const DEFAULT_PAGE_LENGTH: i64 = 10;

/// Largest accepted page length
pub const MAX_PAGE_LENGTH: i64 = 100;

/// Everything but RFC 3986 unreserved characters is escaped in query values
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Query parameters shared by all list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub index: Option<i64>,
    pub page_length: Option<i64>,
    pub search: Option<String>,
    pub group_id: Option<i64>,
}

/// Validated offset and limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// Offset for SQL LIMIT/OFFSET query
    pub index: i64,
    /// Limit for SQL LIMIT/OFFSET query
    pub page_length: i64,
}

impl PageQuery {
    /// Validate paging parameters
    ///
    /// # Examples
    /// ```
    /// use dioptra_restapi::pagination::PageQuery;
    ///
    /// let paging = PageQuery::default().paging().unwrap();
    /// assert_eq!(paging.index, 0);
    /// assert_eq!(paging.page_length, 10);
    ///
    /// let query = PageQuery { page_length: Some(500), ..Default::default() };
    /// assert!(query.paging().is_err());
    /// ```
    pub fn paging(&self) -> Result<Paging, String> {
        let index = self.index.unwrap_or(0);
        let page_length = self.page_length.unwrap_or(DEFAULT_PAGE_LENGTH);

        if index < 0 {
            return Err("index must be a non-negative integer".to_string());
        }
        if !(1..=MAX_PAGE_LENGTH).contains(&page_length) {
            return Err(format!(
                "pageLength must be between 1 and {}",
                MAX_PAGE_LENGTH
            ));
        }

        Ok(Paging { index, page_length })
    }

    /// Search term with surrounding whitespace removed, if non-empty
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub index: i64,
    pub is_complete: bool,
    pub total_num_results: i64,
    pub first: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Assemble a page and its navigation links
    ///
    /// `route` is the path of the list endpoint, e.g. `/api/v1/queues`.
    pub fn new(route: &str, query: &PageQuery, paging: Paging, data: Vec<T>, total: i64) -> Self {
        let Paging { index, page_length } = paging;

        let next = (index + (data.len() as i64) < total)
            .then(|| page_url(route, query, index + page_length, page_length));
        let prev = (index > 0)
            .then(|| page_url(route, query, (index - page_length).max(0), page_length));

        Self {
            index,
            is_complete: next.is_none(),
            total_num_results: total,
            first: page_url(route, query, 0, page_length),
            next,
            prev,
            data,
        }
    }
}

fn page_url(route: &str, query: &PageQuery, index: i64, page_length: i64) -> String {
    let mut url = format!("{}?index={}&pageLength={}", route, index, page_length);
    if let Some(search) = query.search_term() {
        url.push_str("&search=");
        url.extend(utf8_percent_encode(search, QUERY_VALUE));
    }
    if let Some(group_id) = query.group_id {
        url.push_str(&format!("&groupId={}", group_id));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paging(index: i64, page_length: i64) -> Paging {
        Paging { index, page_length }
    }

    #[test]
    fn test_paging_rejects_out_of_range() {
        let negative = PageQuery {
            index: Some(-1),
            ..Default::default()
        };
        assert!(negative.paging().is_err());

        let zero = PageQuery {
            page_length: Some(0),
            ..Default::default()
        };
        assert!(zero.paging().is_err());

        let max = PageQuery {
            page_length: Some(100),
            ..Default::default()
        };
        assert_eq!(max.paging().unwrap().page_length, 100);
    }

    #[test]
    fn test_first_page_of_many() {
        let page = Page::new("/api/v1/queues", &PageQuery::default(), paging(0, 2), vec![1, 2], 5);
        assert!(!page.is_complete);
        assert_eq!(page.first, "/api/v1/queues?index=0&pageLength=2");
        assert_eq!(page.next.as_deref(), Some("/api/v1/queues?index=2&pageLength=2"));
        assert!(page.prev.is_none());
    }

    #[test]
    fn test_last_page() {
        let page = Page::new("/api/v1/queues", &PageQuery::default(), paging(4, 2), vec![5], 5);
        assert!(page.is_complete);
        assert!(page.next.is_none());
        assert_eq!(page.prev.as_deref(), Some("/api/v1/queues?index=2&pageLength=2"));
    }

    #[test]
    fn test_prev_clamped_to_zero() {
        let page = Page::new("/api/v1/tags", &PageQuery::default(), paging(1, 10), vec![2], 2);
        assert_eq!(page.prev.as_deref(), Some("/api/v1/tags?index=0&pageLength=10"));
    }

    #[test]
    fn test_empty_result() {
        let page: Page<i32> = Page::new("/api/v1/jobs", &PageQuery::default(), paging(0, 10), vec![], 0);
        assert!(page.is_complete);
        assert_eq!(page.total_num_results, 0);
    }

    #[test]
    fn test_links_carry_filters() {
        let query = PageQuery {
            search: Some(" my queue ".to_string()),
            group_id: Some(3),
            ..Default::default()
        };
        let page = Page::new("/api/v1/queues", &query, paging(0, 10), vec![1], 1);
        assert_eq!(
            page.first,
            "/api/v1/queues?index=0&pageLength=10&search=my%20queue&groupId=3"
        );
    }

    #[test]
    fn test_search_escaped_in_links() {
        let query = PageQuery {
            search: Some("a&b=c/é~x".to_string()),
            ..Default::default()
        };
        let page = Page::new("/api/v1/queues", &query, paging(0, 10), vec![1], 1);
        assert_eq!(
            page.first,
            "/api/v1/queues?index=0&pageLength=10&search=a%26b%3Dc%2F%C3%A9~x"
        );
    }
}
