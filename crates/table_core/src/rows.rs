//! Per-row UI lifecycle: collapsed, expanded for reading, expanded for editing,
//! plus the single "new row" sentinel used by the add form.

use shared::domain::EntityId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowMode {
    #[default]
    Collapsed,
    ExpandedView,
    ExpandedEdit,
    /// Only ever reported for [`RowKey::New`].
    AddSentinel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTransition {
    Expand,
    Collapse,
    ToggleEdit,
    Cancel,
    SaveSucceeded,
    SaveFailed,
}

/// Addresses either a persisted row or the add-form sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Existing(EntityId),
    New,
}

impl From<EntityId> for RowKey {
    fn from(id: EntityId) -> Self {
        RowKey::Existing(id)
    }
}

impl RowMode {
    pub fn next(self, transition: RowTransition) -> RowMode {
        use RowMode::*;
        use RowTransition::*;

        match (self, transition) {
            (_, Collapse) => Collapsed,
            (Collapsed, Expand) => ExpandedView,
            (ExpandedView, ToggleEdit) => ExpandedEdit,
            (ExpandedEdit, ToggleEdit) => ExpandedView,
            (ExpandedEdit, SaveSucceeded) => Collapsed,
            // Cancel and failed saves keep the form open for a retry.
            (mode, Expand | ToggleEdit | Cancel | SaveSucceeded | SaveFailed) => mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RowMode; 3] = [
        RowMode::Collapsed,
        RowMode::ExpandedView,
        RowMode::ExpandedEdit,
    ];

    #[test]
    fn toggling_edit_twice_is_identity() {
        for mode in ALL {
            assert_eq!(
                mode.next(RowTransition::ToggleEdit)
                    .next(RowTransition::ToggleEdit),
                mode
            );
        }
    }

    #[test]
    fn edit_lifecycle_follows_expand_edit_save() {
        let mode = RowMode::Collapsed
            .next(RowTransition::Expand)
            .next(RowTransition::ToggleEdit);
        assert_eq!(mode, RowMode::ExpandedEdit);
        assert_eq!(mode.next(RowTransition::Cancel), RowMode::ExpandedEdit);
        assert_eq!(mode.next(RowTransition::SaveFailed), RowMode::ExpandedEdit);
        assert_eq!(mode.next(RowTransition::SaveSucceeded), RowMode::Collapsed);
    }

    #[test]
    fn collapse_wins_from_any_mode() {
        for mode in ALL {
            assert_eq!(mode.next(RowTransition::Collapse), RowMode::Collapsed);
        }
    }

    #[test]
    fn toggling_a_collapsed_row_does_nothing() {
        assert_eq!(
            RowMode::Collapsed.next(RowTransition::ToggleEdit),
            RowMode::Collapsed
        );
    }
}
