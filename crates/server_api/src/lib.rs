//! Transport-free collection store behind the dev server: search, filter,
//! sort and paginate over in-memory hotel collections, plus CRUD.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde_json::{Map, Value};
use shared::{
    domain::{Call, CleaningTask, Department, Employee, EntityId, RecurringCall, Resource},
    error::{ApiError, ErrorCode},
    protocol::Page,
    query::{QueryParams, SortDirection},
};
use tokio::sync::RwLock;
use tracing::{debug, info};

mod demo;

type Normalizer = fn(Value) -> Result<Value, ApiError>;

/// Collections the store serves, each with the entity type its rows must
/// decode as.
const COLLECTIONS: [(&str, Normalizer); 5] = [
    (Department::COLLECTION, normalize_as::<Department>),
    (Employee::COLLECTION, normalize_as::<Employee>),
    (Call::COLLECTION, normalize_as::<Call>),
    (RecurringCall::COLLECTION, normalize_as::<RecurringCall>),
    (CleaningTask::COLLECTION, normalize_as::<CleaningTask>),
];

/// Round-trips `value` through `T` so stored rows always carry every field.
fn normalize_as<T: Resource>(value: Value) -> Result<Value, ApiError> {
    let entity: T = serde_json::from_value(value).map_err(|e| {
        ApiError::new(
            ErrorCode::Validation,
            format!("invalid {} payload: {e}", T::COLLECTION),
        )
    })?;
    serde_json::to_value(entity).map_err(internal)
}

fn internal(error: impl std::fmt::Display) -> ApiError {
    ApiError::new(ErrorCode::Internal, error.to_string())
}

#[derive(Default)]
struct Collection {
    rows: Vec<Value>,
    next_id: i64,
}

impl Collection {
    fn position(&self, id: &EntityId) -> Option<usize> {
        let id = id.to_string();
        self.rows
            .iter()
            .position(|row| row.get("id").map(value_text).as_deref() == Some(id.as_str()))
    }

    fn insert(
        &mut self,
        mut row: Map<String, Value>,
        normalize: Normalizer,
    ) -> Result<Value, ApiError> {
        let id = self.next_id + 1;
        row.insert("id".to_string(), Value::from(id));
        let row = normalize(Value::Object(row))?;
        self.next_id = id;
        self.rows.push(row.clone());
        Ok(row)
    }
}

#[derive(Clone)]
pub struct CollectionStore {
    collections: Arc<RwLock<BTreeMap<&'static str, Collection>>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        let collections = COLLECTIONS
            .iter()
            .map(|(name, _)| (*name, Collection::default()))
            .collect();
        Self {
            collections: Arc::new(RwLock::new(collections)),
        }
    }

    /// Store pre-filled with a small hotel: departments, staff, open calls,
    /// recurring calls and cleaning tasks.
    pub async fn with_demo_data() -> Result<Self, ApiError> {
        let store = Self::new();
        for (collection, rows) in demo::rows()? {
            for row in rows {
                store.create(collection, row).await?;
            }
        }
        info!("collection store seeded with demo data");
        Ok(store)
    }

    pub async fn list(
        &self,
        collection: &str,
        params: &QueryParams,
    ) -> Result<Page<Value>, ApiError> {
        let collections = self.collections.read().await;
        let rows = &lookup(&collections, collection)?.rows;

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(str::to_lowercase);
        let mut matching: Vec<&Value> = rows
            .iter()
            .filter(|row| {
                search
                    .as_deref()
                    .map_or(true, |search| matches_search(row, search))
            })
            .filter(|row| {
                params
                    .filters
                    .iter()
                    .all(|(field, expected)| matches_filter(row, field, expected))
            })
            .collect();

        if let Some(field) = params.sort_field.as_deref() {
            let direction = params.sort_direction.unwrap_or(SortDirection::Asc);
            matching.sort_by(|left, right| {
                let ordering = compare_field(left.get(field), right.get(field));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let total_count = matching.len();
        let data = matching
            .into_iter()
            .skip(params.page.saturating_mul(params.page_size))
            .take(params.page_size)
            .cloned()
            .collect();
        debug!(collection, total_count, page = params.page, "listed collection page");
        Ok(Page::new(data, total_count))
    }

    /// Stores `draft` under the next numeric id; any id in the draft is ignored.
    pub async fn create(&self, collection: &str, draft: Value) -> Result<Value, ApiError> {
        let normalize = normalizer(collection)?;
        let Value::Object(mut draft) = draft else {
            return Err(ApiError::new(ErrorCode::Validation, "expected a JSON object"));
        };
        draft.remove("id");
        let mut collections = self.collections.write().await;
        let created = lookup_mut(&mut collections, collection)?.insert(draft, normalize)?;
        debug!(collection, id = ?created.get("id"), "created row");
        Ok(created)
    }

    /// Replaces the stored row; the path identity wins over any id in the body.
    pub async fn update(
        &self,
        collection: &str,
        id: &EntityId,
        entity: Value,
    ) -> Result<Value, ApiError> {
        let normalize = normalizer(collection)?;
        let Value::Object(mut entity) = entity else {
            return Err(ApiError::new(ErrorCode::Validation, "expected a JSON object"));
        };
        let mut collections = self.collections.write().await;
        let stored = lookup_mut(&mut collections, collection)?;
        let index = stored.position(id).ok_or_else(|| not_found(collection, id))?;
        let stored_id = stored.rows[index].get("id").cloned().unwrap_or(Value::Null);
        entity.insert("id".to_string(), stored_id);
        let updated = normalize(Value::Object(entity))?;
        stored.rows[index] = updated.clone();
        debug!(collection, %id, "updated row");
        Ok(updated)
    }

    pub async fn delete(&self, collection: &str, id: &EntityId) -> Result<(), ApiError> {
        let mut collections = self.collections.write().await;
        let stored = lookup_mut(&mut collections, collection)?;
        let index = stored.position(id).ok_or_else(|| not_found(collection, id))?;
        stored.rows.remove(index);
        debug!(collection, %id, "deleted row");
        Ok(())
    }
}

/// Path segment to identity: numeric when it parses, text otherwise.
pub fn parse_id(raw: &str) -> EntityId {
    raw.parse::<i64>()
        .map(EntityId::Num)
        .unwrap_or_else(|_| EntityId::Text(raw.to_string()))
}

fn normalizer(collection: &str) -> Result<Normalizer, ApiError> {
    COLLECTIONS
        .iter()
        .find(|(name, _)| *name == collection)
        .map(|(_, normalize)| *normalize)
        .ok_or_else(|| unknown_collection(collection))
}

fn unknown_collection(collection: &str) -> ApiError {
    ApiError::new(
        ErrorCode::NotFound,
        format!("unknown collection '{collection}'"),
    )
}

fn not_found(collection: &str, id: &EntityId) -> ApiError {
    ApiError::new(
        ErrorCode::NotFound,
        format!("{collection} row {id} not found"),
    )
}

fn lookup<'a>(
    collections: &'a BTreeMap<&'static str, Collection>,
    collection: &str,
) -> Result<&'a Collection, ApiError> {
    collections
        .get(collection)
        .ok_or_else(|| unknown_collection(collection))
}

fn lookup_mut<'a>(
    collections: &'a mut BTreeMap<&'static str, Collection>,
    collection: &str,
) -> Result<&'a mut Collection, ApiError> {
    collections
        .get_mut(collection)
        .ok_or_else(|| unknown_collection(collection))
}

/// Textual form used for filter equality: strings as-is, null as empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn matches_search(row: &Value, needle: &str) -> bool {
    row.as_object().is_some_and(|fields| {
        fields.values().any(|value| {
            value
                .as_str()
                .is_some_and(|text| text.to_lowercase().contains(needle))
        })
    })
}

fn matches_filter(row: &Value, field: &str, expected: &Value) -> bool {
    row.get(field)
        .is_some_and(|actual| value_text(actual) == value_text(expected))
}

fn compare_field(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(left)), Some(Value::Number(right))) => {
            let left = left.as_f64().unwrap_or_default();
            let right = right.as_f64().unwrap_or_default();
            left.partial_cmp(&right).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(left), Some(right)) => value_text(left).cmp(&value_text(right)),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
