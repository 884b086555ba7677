use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiException, ErrorCode};

pub const PAGE_KEY: &str = "page";
pub const PAGE_SIZE_KEY: &str = "pageSize";
pub const SORT_FIELD_KEY: &str = "sortField";
pub const SORT_DIRECTION_KEY: &str = "sortDirection";
pub const SEARCH_KEY: &str = "search";

/// Keys taken by the paging, sort and search parameters; never usable as
/// filter names.
pub const RESERVED_KEYS: [&str; 5] = [
    PAGE_KEY,
    PAGE_SIZE_KEY,
    SORT_FIELD_KEY,
    SORT_DIRECTION_KEY,
    SEARCH_KEY,
];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Parameters of one page request. `filters` never holds empty values once
/// built through [`clean_filters`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    pub page: usize,
    pub page_size: usize,
    pub sort_field: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub search: Option<String>,
    pub filters: BTreeMap<String, Value>,
}

/// `""`, `null`, and `[]` count as "no constraint".
pub fn is_empty_filter_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

pub fn clean_filters(filters: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    filters
        .iter()
        .filter(|(_, value)| !is_empty_filter_value(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn filter_value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(filter_value_text)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

impl QueryParams {
    /// Flattens the params into URL query pairs, dropping empty filters.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (PAGE_KEY.to_string(), self.page.to_string()),
            (PAGE_SIZE_KEY.to_string(), self.page_size.to_string()),
        ];
        if let Some(field) = &self.sort_field {
            pairs.push((SORT_FIELD_KEY.to_string(), field.clone()));
            if let Some(direction) = self.sort_direction {
                pairs.push((SORT_DIRECTION_KEY.to_string(), direction.as_str().to_string()));
            }
        }
        if let Some(search) = self.search.as_deref().filter(|search| !search.is_empty()) {
            pairs.push((SEARCH_KEY.to_string(), search.to_string()));
        }
        for (key, value) in clean_filters(&self.filters) {
            if is_reserved_key(&key) {
                continue;
            }
            pairs.push((key, filter_value_text(&value)));
        }
        pairs
    }

    /// Server-side inverse of [`QueryParams::to_query_pairs`]. Unknown keys
    /// become string filters.
    pub fn from_query_pairs<I>(pairs: I) -> Result<Self, ApiException>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = QueryParams {
            page_size: 10,
            ..Default::default()
        };
        for (key, value) in pairs {
            match key.as_str() {
                PAGE_KEY => params.page = parse_usize(&key, &value)?,
                PAGE_SIZE_KEY => params.page_size = parse_usize(&key, &value)?,
                SORT_FIELD_KEY => params.sort_field = Some(value),
                SORT_DIRECTION_KEY => {
                    params.sort_direction = Some(match value.as_str() {
                        "asc" => SortDirection::Asc,
                        "desc" => SortDirection::Desc,
                        _ => {
                            return Err(ApiException::new(
                                ErrorCode::Validation,
                                format!("invalid sort direction '{value}'"),
                            ))
                        }
                    })
                }
                SEARCH_KEY => params.search = Some(value).filter(|search| !search.is_empty()),
                _ if value.is_empty() => {}
                _ => {
                    params.filters.insert(key, Value::String(value));
                }
            }
        }
        if params.page_size == 0 {
            return Err(ApiException::new(
                ErrorCode::Validation,
                "pageSize must be greater than zero",
            ));
        }
        Ok(params)
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ApiException> {
    value.parse::<usize>().map_err(|_| {
        ApiException::new(
            ErrorCode::Validation,
            format!("{key} must be a non-negative integer, got '{value}'"),
        )
    })
}
