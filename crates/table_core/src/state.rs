//! Table state and the single reducer every row change goes through.

use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{Entity, EntityId},
    protocol::Page,
};

use crate::rows::{RowKey, RowMode};

/// Domain data plus its UI mode, kept apart so entities never carry view state.
#[derive(Debug, Clone)]
pub struct Row<T> {
    pub entity: Arc<T>,
    pub mode: RowMode,
}

impl<T: Entity> Row<T> {
    pub fn new(entity: T) -> Self {
        Self {
            entity: Arc::new(entity),
            mode: RowMode::Collapsed,
        }
    }

    pub fn id(&self) -> &EntityId {
        self.entity.id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// In-flight optimistic change for one identity. `baseline` is the last
/// confirmed row, inherited when a newer mutation supersedes this one.
#[derive(Debug, Clone)]
pub struct PendingMutation<T> {
    pub kind: MutationKind,
    pub seq: u64,
    pub baseline: Option<Row<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Overwrite the row's entity where it sits; skipped if the row is gone.
    InPlace,
    /// Overwrite if present, otherwise append.
    End,
}

#[derive(Debug)]
pub enum TableAction<T: Entity> {
    LoadStarted { generation: u64 },
    PageLoaded { generation: u64, page: Page<T> },
    LoadFailed { generation: u64 },
    Insert { entity: T },
    ApplyPatch { id: EntityId, patch: T::Patch },
    Replace {
        id: EntityId,
        entity: T,
        mode: Option<RowMode>,
    },
    Remove { id: EntityId },
    Restore { row: Row<T>, placement: Placement },
    Upsert { entity: T },
    SetMode { id: EntityId, mode: RowMode },
    SetAddSentinel(bool),
    BeginMutation {
        id: EntityId,
        pending: PendingMutation<T>,
    },
    EndMutation { id: EntityId, seq: u64 },
    /// A superseded mutation was confirmed: its entity becomes the row the
    /// pending mutation on `id` rolls back to.
    Rebase { id: EntityId, entity: T },
}

#[derive(Debug)]
pub struct TableState<T: Entity> {
    rows: Vec<Row<T>>,
    total_count: usize,
    is_loading: bool,
    add_open: bool,
    pending: BTreeMap<EntityId, PendingMutation<T>>,
    load_generation: u64,
    mutation_seq: u64,
    version: u64,
}

impl<T: Entity> Default for TableState<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total_count: 0,
            is_loading: false,
            add_open: false,
            pending: BTreeMap::new(),
            load_generation: 0,
            mutation_seq: 0,
            version: 0,
        }
    }
}

impl<T: Entity> TableState<T> {
    pub fn rows(&self) -> &[Row<T>] {
        &self.rows
    }

    pub fn row(&self, id: &EntityId) -> Option<&Row<T>> {
        self.rows.iter().find(|row| row.id() == id)
    }

    fn position(&self, id: &EntityId) -> Option<usize> {
        self.rows.iter().position(|row| row.id() == id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn next_generation(&mut self) -> u64 {
        self.load_generation += 1;
        self.load_generation
    }

    pub fn next_seq(&mut self) -> u64 {
        self.mutation_seq += 1;
        self.mutation_seq
    }

    pub fn is_latest_mutation(&self, id: &EntityId, seq: u64) -> bool {
        self.pending.get(id).is_some_and(|pending| pending.seq == seq)
    }

    pub fn pending(&self, id: &EntityId) -> Option<&PendingMutation<T>> {
        self.pending.get(id)
    }

    /// Applies `action`; returns whether anything observable changed.
    pub fn reduce(&mut self, action: TableAction<T>) -> bool {
        let changed = match action {
            TableAction::LoadStarted { generation } => {
                self.load_generation = self.load_generation.max(generation);
                self.is_loading = true;
                true
            }
            TableAction::PageLoaded { generation, page } => {
                if generation != self.load_generation {
                    return false;
                }
                self.rows = page.data.into_iter().map(Row::new).collect();
                self.total_count = page.total_count;
                self.is_loading = false;
                true
            }
            TableAction::LoadFailed { generation } => {
                if generation != self.load_generation {
                    return false;
                }
                self.is_loading = false;
                true
            }
            TableAction::Insert { entity } => {
                self.rows.push(Row::new(entity));
                true
            }
            TableAction::ApplyPatch { id, patch } => match self.position(&id) {
                Some(index) => {
                    let row = &mut self.rows[index];
                    let mut entity = (*row.entity).clone();
                    entity.apply(&patch);
                    row.entity = Arc::new(entity);
                    true
                }
                None => false,
            },
            TableAction::Replace { id, entity, mode } => self.replace(&id, entity, mode),
            TableAction::Remove { id } => match self.position(&id) {
                Some(index) => {
                    self.rows.remove(index);
                    true
                }
                None => false,
            },
            TableAction::Restore { row, placement } => match self.position(row.id()) {
                Some(index) => {
                    self.rows[index].entity = row.entity;
                    true
                }
                None if placement == Placement::End => {
                    self.rows.push(row);
                    true
                }
                None => false,
            },
            TableAction::Upsert { entity } => match self.position(entity.id()) {
                Some(index) => {
                    self.rows[index].entity = Arc::new(entity);
                    true
                }
                None => {
                    self.rows.push(Row::new(entity));
                    true
                }
            },
            TableAction::SetMode { id, mode } => match self.position(&id) {
                Some(index) if self.rows[index].mode != mode => {
                    self.rows[index].mode = mode;
                    true
                }
                _ => false,
            },
            TableAction::SetAddSentinel(open) => {
                let changed = self.add_open != open;
                self.add_open = open;
                changed
            }
            TableAction::BeginMutation { id, pending } => {
                self.pending.insert(id, pending);
                true
            }
            TableAction::EndMutation { id, seq } => {
                if self.is_latest_mutation(&id, seq) {
                    self.pending.remove(&id);
                    true
                } else {
                    false
                }
            }
            // Baselines are not part of the snapshot.
            TableAction::Rebase { id, entity } => {
                if let Some(pending) = self.pending.get_mut(&id) {
                    let mode = pending
                        .baseline
                        .as_ref()
                        .map_or(RowMode::Collapsed, |row| row.mode);
                    pending.baseline = Some(Row {
                        entity: Arc::new(entity),
                        mode,
                    });
                }
                false
            }
        };
        if changed {
            self.version += 1;
        }
        changed
    }

    /// Swaps the row keyed `id` for `entity`. When the entity's own identity is
    /// already present elsewhere (a push beat the confirmation), that row is
    /// overwritten and the `id` row dropped so no identity appears twice.
    fn replace(&mut self, id: &EntityId, entity: T, mode: Option<RowMode>) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let new_id = entity.id().clone();
        let target = match self.position(&new_id) {
            Some(existing) if existing != index => {
                self.rows.remove(index);
                if existing > index {
                    existing - 1
                } else {
                    existing
                }
            }
            _ => index,
        };
        let row = &mut self.rows[target];
        row.entity = Arc::new(entity);
        if let Some(mode) = mode {
            row.mode = mode;
        }
        true
    }

    pub fn snapshot(&self) -> TableSnapshot<T> {
        TableSnapshot {
            rows: self.rows.clone(),
            total_count: self.total_count,
            is_loading: self.is_loading,
            add_sentinel: self.add_open,
            pending: self
                .pending
                .iter()
                .map(|(id, pending)| (id.clone(), pending.kind))
                .collect(),
            version: self.version,
        }
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct TableSnapshot<T> {
    pub rows: Vec<Row<T>>,
    pub total_count: usize,
    pub is_loading: bool,
    pub add_sentinel: bool,
    pub pending: BTreeMap<EntityId, MutationKind>,
    pub version: u64,
}

impl<T: Entity> TableSnapshot<T> {
    pub fn row(&self, id: &EntityId) -> Option<&Row<T>> {
        self.rows.iter().find(|row| row.id() == id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.rows.iter().map(|row| row.id().clone()).collect()
    }

    pub fn entities(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|row| row.entity.as_ref())
    }

    pub fn mode(&self, key: &RowKey) -> Option<RowMode> {
        match key {
            RowKey::Existing(id) => self.row(id).map(|row| row.mode),
            RowKey::New => self.add_sentinel.then_some(RowMode::AddSentinel),
        }
    }

    pub fn row_modes(&self) -> BTreeMap<EntityId, RowMode> {
        self.rows
            .iter()
            .map(|row| (row.id().clone(), row.mode))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
