use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use shared::domain::EntityId;

/// Source of identities for rows whose create is still in flight.
pub trait TempIdGenerator: Send + Sync {
    fn next_temp_id(&self) -> EntityId;
}

/// `temp-<unix millis>`, bumped past the previous value when two creates land
/// in the same millisecond.
#[derive(Default)]
pub struct TimestampTempIds {
    last: AtomicI64,
}

impl TempIdGenerator for TimestampTempIds {
    fn next_temp_id(&self) -> EntityId {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        EntityId::temporary(now.max(previous + 1))
    }
}

/// `temp-1`, `temp-2`, ... for deterministic callers.
pub struct SequentialTempIds {
    next: AtomicU64,
}

impl SequentialTempIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialTempIds {
    fn default() -> Self {
        Self::new()
    }
}

impl TempIdGenerator for SequentialTempIds {
    fn next_temp_id(&self) -> EntityId {
        EntityId::temporary(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
