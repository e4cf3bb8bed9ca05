//! List query parameters and the paginated response envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

/// Filters, search term and pagination of one list request.
///
/// The same parameters identify the cached result set and build the query
/// string sent to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: BTreeMap<String, String>,
    pub search: Option<String>,
    pub pagination: Option<Pagination>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Blank terms are ignored.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into().trim().to_string();
        self.search = (!term.is_empty()).then_some(term);
        self
    }

    pub fn paginate(mut self, page: usize, per_page: usize) -> Self {
        self.pagination = Some(Pagination {
            page: page.max(1),
            per_page,
        });
        self
    }

    /// Flattened parameters, in a stable order.
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = self.filters.clone();
        if let Some(term) = &self.search {
            params.insert("search".to_string(), term.clone());
        }
        if let Some(pagination) = &self.pagination {
            params.insert("page".to_string(), pagination.page.to_string());
            params.insert("page_size".to_string(), pagination.per_page.to_string());
        }
        params
    }
}

/// Paginated list body returned for client lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope<T> {
    pub count: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}
