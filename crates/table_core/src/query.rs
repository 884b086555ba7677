use std::collections::BTreeMap;

use serde_json::Value;
use shared::query::{clean_filters, is_reserved_key, QueryParams, SortDirection};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Pagination, single-column sort, free-text search and advanced filters for
/// one table. Changing the page size keeps the page index; changing search or
/// filters goes back to the first page.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryController {
    page_index: usize,
    page_size: usize,
    sort: Option<SortSpec>,
    search: String,
    filters: BTreeMap<String, Value>,
}

impl QueryController {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            sort: None,
            search: String::new(),
            filters: BTreeMap::new(),
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn filters(&self) -> &BTreeMap<String, Value> {
        &self.filters
    }

    pub fn set_page(&mut self, page_index: usize) {
        self.page_index = page_index;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn set_sort(&mut self, field: impl Into<String>, direction: SortDirection) {
        self.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    /// Header-click cycle: asc, desc, unsorted. A different column starts at asc.
    pub fn toggle_sort(&mut self, field: &str) {
        self.sort = match self.sort.take() {
            Some(SortSpec {
                field: current,
                direction: SortDirection::Asc,
            }) if current == field => Some(SortSpec {
                field: current,
                direction: SortDirection::Desc,
            }),
            Some(SortSpec {
                field: current,
                direction: SortDirection::Desc,
            }) if current == field => None,
            _ => Some(SortSpec {
                field: field.to_string(),
                direction: SortDirection::Asc,
            }),
        };
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
        self.page_index = 0;
    }

    /// Filters may not reuse a paging, sort or search parameter name; such a
    /// filter is refused and `false` returned.
    pub fn set_filter(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if is_reserved_key(&key) {
            warn!(%key, "query: filter name is reserved");
            return false;
        }
        self.filters.insert(key, value);
        self.page_index = 0;
        true
    }

    pub fn remove_filter(&mut self, key: &str) {
        if self.filters.remove(key).is_some() {
            self.page_index = 0;
        }
    }

    pub fn clear_filters(&mut self) {
        if !self.filters.is_empty() {
            self.filters.clear();
            self.page_index = 0;
        }
    }

    pub fn params(&self) -> QueryParams {
        let search = self.search.trim();
        QueryParams {
            page: self.page_index,
            page_size: self.page_size,
            sort_field: self.sort.as_ref().map(|sort| sort.field.clone()),
            sort_direction: self.sort.as_ref().map(|sort| sort.direction),
            search: (!search.is_empty()).then(|| search.to_string()),
            filters: clean_filters(&self.filters),
        }
    }
}
