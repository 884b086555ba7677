//! Optimistic create/update/delete with rollback. Nothing here returns an
//! error to the caller: every failure becomes a rollback plus a notice, and the
//! returned [`MutationOutcome`] only reports what happened.

use shared::{
    domain::{Entity, EntityId},
    protocol::MutationResponse,
};
use tracing::{info, warn};

use crate::{
    error::TableError,
    events::{Notice, Operation},
    orchestrator::TableOrchestrator,
    rows::{RowMode, RowTransition},
    state::{MutationKind, PendingMutation, Placement, TableAction},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed(EntityId),
    /// The server refused or never answered; optimistic state was undone.
    RolledBack(TableError),
    /// Refused before anything was sent.
    Rejected(TableError),
    /// A newer mutation on the same identity owns the row now.
    Superseded,
    Cancelled,
}

impl MutationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed(_))
    }
}

fn settle<T>(
    id: &EntityId,
    result: anyhow::Result<MutationResponse<T>>,
) -> Result<Option<T>, TableError> {
    match result {
        Ok(response) if response.is_success() => Ok(response.data),
        Ok(response) => Err(TableError::from_status(
            Some(id),
            response.status,
            response.error,
        )),
        Err(err) => Err(TableError::transport(&err)),
    }
}

impl<T: Entity> TableOrchestrator<T> {
    /// Inserts a draft row under a temporary identity, then swaps in the
    /// server's entity. Success also closes the add form and leaves the new
    /// row collapsed.
    pub async fn add(&self, draft: T::Patch) -> MutationOutcome {
        if self.is_unmounted() {
            return MutationOutcome::Cancelled;
        }
        let temp_id = self.temp_ids.next_temp_id();
        {
            let mut inner = self.inner.lock().await;
            let seq = inner.state.next_seq();
            self.reduce_all(
                &mut inner,
                [
                    TableAction::BeginMutation {
                        id: temp_id.clone(),
                        pending: PendingMutation {
                            kind: MutationKind::Create,
                            seq,
                            baseline: None,
                        },
                    },
                    TableAction::Insert {
                        entity: T::draft(temp_id.clone(), &draft),
                    },
                ],
            );
        }

        let Some(result) = self.guarded(self.service.create(&draft)).await else {
            return MutationOutcome::Cancelled;
        };

        let seq = match self.inner.lock().await.state.pending(&temp_id) {
            Some(pending) => pending.seq,
            None => return MutationOutcome::Superseded,
        };
        match settle(&temp_id, result).and_then(|data| data.ok_or(TableError::MissingData)) {
            Ok(entity) => {
                let id = entity.id().clone();
                self.dispatch([
                    TableAction::Replace {
                        id: temp_id.clone(),
                        entity,
                        mode: Some(RowMode::Collapsed),
                    },
                    TableAction::EndMutation { id: temp_id, seq },
                    TableAction::SetAddSentinel(false),
                ])
                .await;
                info!(topic = %self.options.topic, %id, "table: create confirmed");
                self.notify(Notice::success(Operation::Create, Some(id.clone())));
                MutationOutcome::Confirmed(id)
            }
            Err(error) => {
                warn!(
                    topic = %self.options.topic, %temp_id, %error,
                    "table: create failed, removing draft"
                );
                self.dispatch([
                    TableAction::Remove {
                        id: temp_id.clone(),
                    },
                    TableAction::EndMutation { id: temp_id, seq },
                ])
                .await;
                self.notify(Notice::failure(Operation::Create, None, &error));
                MutationOutcome::RolledBack(error)
            }
        }
    }

    /// Shallow-merges `patch` into its row immediately and sends the merged
    /// entity. A failure restores the last confirmed row if it is still shown.
    pub async fn update(&self, patch: T::Patch) -> MutationOutcome {
        if self.is_unmounted() {
            return MutationOutcome::Cancelled;
        }
        let Some(id) = T::patch_id(&patch).cloned() else {
            return self.reject(Operation::Update, None, TableError::MissingIdentity);
        };
        if id.is_temporary() {
            let error = TableError::NotPersisted { id: id.clone() };
            return self.reject(Operation::Update, Some(id), error);
        }

        let (seq, merged) = {
            let mut inner = self.inner.lock().await;
            let Some(current) = inner.state.row(&id).cloned() else {
                drop(inner);
                let error = TableError::UnknownRow { id: id.clone() };
                return self.reject(Operation::Update, Some(id), error);
            };
            let baseline = match inner.state.pending(&id) {
                Some(pending) => pending.baseline.clone(),
                None => Some(current),
            };
            let seq = inner.state.next_seq();
            self.reduce_all(
                &mut inner,
                [
                    TableAction::BeginMutation {
                        id: id.clone(),
                        pending: PendingMutation {
                            kind: MutationKind::Update,
                            seq,
                            baseline,
                        },
                    },
                    TableAction::ApplyPatch {
                        id: id.clone(),
                        patch,
                    },
                ],
            );
            let merged = inner
                .state
                .row(&id)
                .map(|row| row.entity.as_ref().clone());
            (seq, merged)
        };
        let Some(merged) = merged else {
            return MutationOutcome::Superseded;
        };

        let Some(result) = self.guarded(self.service.update(&merged)).await else {
            return MutationOutcome::Cancelled;
        };

        let outcome = settle(&id, result);
        let mut inner = self.inner.lock().await;
        if !inner.state.is_latest_mutation(&id, seq) {
            if let Ok(Some(entity)) = &outcome {
                self.reduce_all(
                    &mut inner,
                    [TableAction::Rebase {
                        id: id.clone(),
                        entity: entity.clone(),
                    }],
                );
            }
            drop(inner);
            match outcome {
                Ok(_) => self.notify(Notice::success(Operation::Update, Some(id))),
                Err(error) => self.notify(Notice::failure(Operation::Update, Some(id), &error)),
            }
            return MutationOutcome::Superseded;
        }

        match outcome {
            Ok(data) => {
                let mut actions = Vec::with_capacity(2);
                if let Some(entity) = data {
                    actions.push(TableAction::Replace {
                        id: id.clone(),
                        entity,
                        mode: None,
                    });
                }
                actions.push(TableAction::EndMutation { id: id.clone(), seq });
                self.reduce_all(&mut inner, actions);
                drop(inner);
                self.notify(Notice::success(Operation::Update, Some(id.clone())));
                MutationOutcome::Confirmed(id)
            }
            Err(error) => {
                let baseline = inner
                    .state
                    .pending(&id)
                    .and_then(|pending| pending.baseline.clone());
                let mut actions = Vec::with_capacity(2);
                match baseline {
                    Some(row) => actions.push(TableAction::Restore {
                        row,
                        placement: Placement::InPlace,
                    }),
                    None => warn!(%id, "table: no snapshot to roll back to"),
                }
                actions.push(TableAction::EndMutation { id: id.clone(), seq });
                self.reduce_all(&mut inner, actions);
                drop(inner);
                warn!(topic = %self.options.topic, %id, %error, "table: update rolled back");
                self.notify(Notice::failure(Operation::Update, Some(id), &error));
                MutationOutcome::RolledBack(error)
            }
        }
    }

    /// Edit-form save: update, then collapse the row on success. A failed
    /// save leaves the form open.
    pub async fn save_row(&self, patch: T::Patch) -> MutationOutcome {
        let id = T::patch_id(&patch).cloned();
        let outcome = self.update(patch).await;
        if let Some(id) = id {
            let transition = if outcome.is_confirmed() {
                RowTransition::SaveSucceeded
            } else {
                RowTransition::SaveFailed
            };
            self.transition_row(&id, transition).await;
        }
        outcome
    }

    /// Removes the row immediately; a failed delete puts the last confirmed
    /// row back at the end of the page. `total_count` is never touched.
    pub async fn remove(&self, id: EntityId) -> MutationOutcome {
        if self.is_unmounted() {
            return MutationOutcome::Cancelled;
        }
        if id.is_temporary() {
            let error = TableError::NotPersisted { id: id.clone() };
            return self.reject(Operation::Delete, Some(id), error);
        }

        let (seq, backup) = {
            let mut inner = self.inner.lock().await;
            let Some(backup) = inner.state.row(&id).cloned() else {
                drop(inner);
                let error = TableError::UnknownRow { id: id.clone() };
                return self.reject(Operation::Delete, Some(id), error);
            };
            let baseline = match inner.state.pending(&id) {
                Some(pending) => pending.baseline.clone(),
                None => Some(backup.clone()),
            };
            let seq = inner.state.next_seq();
            self.reduce_all(
                &mut inner,
                [
                    TableAction::BeginMutation {
                        id: id.clone(),
                        pending: PendingMutation {
                            kind: MutationKind::Delete,
                            seq,
                            baseline,
                        },
                    },
                    TableAction::Remove { id: id.clone() },
                ],
            );
            (seq, backup)
        };

        let Some(result) = self.guarded(self.service.delete(&id)).await else {
            return MutationOutcome::Cancelled;
        };

        let outcome = match result {
            Ok(response) if response.status == self.options.delete_success_status => Ok(()),
            Ok(response) => Err(TableError::from_status(
                Some(&id),
                response.status,
                response.error,
            )),
            Err(err) => Err(TableError::transport(&err)),
        };

        let mut inner = self.inner.lock().await;
        if !inner.state.is_latest_mutation(&id, seq) {
            drop(inner);
            match &outcome {
                Ok(()) => self.notify(Notice::success(Operation::Delete, Some(id))),
                Err(error) => self.notify(Notice::failure(Operation::Delete, Some(id), error)),
            }
            return MutationOutcome::Superseded;
        }

        match outcome {
            Ok(()) => {
                self.reduce_all(
                    &mut inner,
                    [TableAction::EndMutation {
                        id: id.clone(),
                        seq,
                    }],
                );
                drop(inner);
                info!(topic = %self.options.topic, %id, "table: delete confirmed");
                self.notify(Notice::success(Operation::Delete, Some(id.clone())));
                MutationOutcome::Confirmed(id)
            }
            Err(error) => {
                let row = inner
                    .state
                    .pending(&id)
                    .and_then(|pending| pending.baseline.clone())
                    .unwrap_or(backup);
                self.reduce_all(
                    &mut inner,
                    [
                        TableAction::Restore {
                            row,
                            placement: Placement::End,
                        },
                        TableAction::EndMutation { id: id.clone(), seq },
                    ],
                );
                drop(inner);
                warn!(topic = %self.options.topic, %id, %error, "table: delete rolled back");
                self.notify(Notice::failure(Operation::Delete, Some(id), &error));
                MutationOutcome::RolledBack(error)
            }
        }
    }

    fn reject(
        &self,
        operation: Operation,
        id: Option<EntityId>,
        error: TableError,
    ) -> MutationOutcome {
        warn!(topic = %self.options.topic, ?operation, %error, "table: mutation rejected");
        self.notify(Notice::failure(operation, id, &error));
        MutationOutcome::Rejected(error)
    }
}

#[cfg(test)]
#[path = "tests/mutator_tests.rs"]
mod tests;
