//! Client-side engine that keeps a paginated, filtered table in sync with a
//! remote collection: page loads, optimistic mutations with rollback, row
//! lifecycle, and pushed snapshots merged by identity.

pub mod error;
pub mod events;
mod fetch;
pub mod ids;
mod live;
mod mutator;
pub mod options;
mod orchestrator;
pub mod query;
pub mod rest;
pub mod rows;
pub mod service;
pub mod state;
pub mod ws;

pub use error::{FailureKind, TableError};
pub use events::{Notice, NoticeLevel, Operation, TableEvent};
pub use fetch::LoadOutcome;
pub use ids::{SequentialTempIds, TempIdGenerator, TimestampTempIds};
pub use mutator::MutationOutcome;
pub use options::TableOptions;
pub use orchestrator::TableOrchestrator;
pub use query::{QueryController, SortSpec};
pub use rest::RestEntityService;
pub use rows::{RowKey, RowMode, RowTransition};
pub use service::{EntityService, MissingPushChannel, PushChannel, Subscription};
pub use state::{MutationKind, Row, TableSnapshot};
pub use ws::WsPushConnection;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
