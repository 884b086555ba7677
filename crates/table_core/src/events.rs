use shared::domain::EntityId;

use crate::error::{FailureKind, TableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Failure(FailureKind),
}

/// User-facing feedback for one settled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub operation: Operation,
    pub level: NoticeLevel,
    pub id: Option<EntityId>,
    pub message: String,
}

impl Notice {
    pub fn success(operation: Operation, id: Option<EntityId>) -> Self {
        let message = match (&operation, &id) {
            (Operation::Create, Some(id)) => format!("created {id}"),
            (Operation::Update, Some(id)) => format!("saved {id}"),
            (Operation::Delete, Some(id)) => format!("deleted {id}"),
            _ => "done".to_string(),
        };
        Self {
            operation,
            level: NoticeLevel::Success,
            id,
            message,
        }
    }

    pub fn failure(operation: Operation, id: Option<EntityId>, error: &TableError) -> Self {
        Self {
            operation,
            level: NoticeLevel::Failure(error.kind()),
            id,
            message: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.level, NoticeLevel::Failure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    /// The snapshot changed; `version` increases with every applied action.
    StateChanged { version: u64 },
    Notice(Notice),
}
