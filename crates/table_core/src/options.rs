use serde::Deserialize;
use shared::{domain::Resource, protocol::DELETE_SUCCESS_STATUS};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Push room the table joins while mounted.
    pub topic: String,
    pub page_size: usize,
    /// Status a delete must return to be treated as confirmed.
    pub delete_success_status: u16,
    pub event_buffer: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            topic: String::new(),
            page_size: 10,
            delete_success_status: DELETE_SUCCESS_STATUS,
            event_buffer: 256,
        }
    }
}

impl TableOptions {
    pub fn for_resource<T: Resource>() -> Self {
        Self {
            topic: T::COLLECTION.to_string(),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}
