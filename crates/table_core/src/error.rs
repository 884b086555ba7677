use shared::domain::EntityId;
use thiserror::Error;

/// Coarse failure class used for user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Validation,
    Conflict,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("row {id} no longer exists on the server")]
    Conflict { id: EntityId },
    #[error("row {id} is not part of the current page")]
    UnknownRow { id: EntityId },
    #[error("row {id} has not been persisted yet")]
    NotPersisted { id: EntityId },
    #[error("update payload is missing the identity field")]
    MissingIdentity,
    #[error("server reported success without returning the entity")]
    MissingData,
}

impl TableError {
    pub fn transport(err: &anyhow::Error) -> Self {
        TableError::Transport(format!("{err:#}"))
    }

    /// Maps a non-success status, treating 404/409 as the row having vanished.
    pub fn from_status(id: Option<&EntityId>, status: u16, message: Option<String>) -> Self {
        match (id, status) {
            (Some(id), 404 | 409) => TableError::Conflict { id: id.clone() },
            _ => TableError::Rejected {
                status,
                message: message.unwrap_or_else(|| "no error message".to_string()),
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TableError::Transport(_) | TableError::Rejected { .. } => FailureKind::Transport,
            TableError::Conflict { .. } | TableError::UnknownRow { .. } => FailureKind::Conflict,
            TableError::NotPersisted { .. }
            | TableError::MissingIdentity
            | TableError::MissingData => FailureKind::Validation,
        }
    }
}
