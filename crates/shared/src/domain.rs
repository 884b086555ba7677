use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const TEMP_ID_PREFIX: &str = "temp-";

/// Value of an entity's identity field: a number for persisted rows, a string
/// for collections keyed by text and for optimistic rows awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Num(i64),
    Text(String),
}

impl EntityId {
    pub fn temporary(suffix: impl fmt::Display) -> Self {
        EntityId::Text(format!("{TEMP_ID_PREFIX}{suffix}"))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, EntityId::Text(text) if text.starts_with(TEMP_ID_PREFIX))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Num(value) => write!(f, "{value}"),
            EntityId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Num(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

/// A record the table engine can key, patch, and optimistically draft.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Sparse field set: every `Some` field overwrites, every `None` is left alone.
    type Patch: Clone + fmt::Debug + Default + Send + Sync + 'static;

    fn id(&self) -> &EntityId;

    fn patch_id(patch: &Self::Patch) -> Option<&EntityId>;

    /// Shallow merge of `patch` into `self`.
    fn apply(&mut self, patch: &Self::Patch);

    /// Builds the row shown while a create is in flight.
    fn draft(id: EntityId, patch: &Self::Patch) -> Self;
}

/// An entity served from a named REST collection and push room.
pub trait Resource: Entity + Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
}

macro_rules! hotel_entity {
    (
        $(#[$meta:meta])*
        $name:ident / $patch:ident in $collection:literal {
            $($field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub id: EntityId,
            $(
                #[serde(default)]
                pub $field: $ty,
            )*
        }

        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $patch {
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub id: Option<EntityId>,
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl Entity for $name {
            type Patch = $patch;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn patch_id(patch: &Self::Patch) -> Option<&EntityId> {
                patch.id.as_ref()
            }

            fn apply(&mut self, patch: &Self::Patch) {
                if let Some(id) = &patch.id {
                    self.id = id.clone();
                }
                $(
                    if let Some(value) = &patch.$field {
                        self.$field = value.clone();
                    }
                )*
            }

            fn draft(id: EntityId, patch: &Self::Patch) -> Self {
                Self {
                    id,
                    $($field: patch.$field.clone().unwrap_or_default(),)*
                }
            }
        }

        impl Resource for $name {
            const COLLECTION: &'static str = $collection;
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Open,
    InProgress,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStatus {
    #[default]
    Dirty,
    InProgress,
    Clean,
    Inspected,
}

hotel_entity!(Department / DepartmentPatch in "departments" {
    name: String,
    description: String,
    manager_id: Option<i64>,
});

hotel_entity!(Employee / EmployeePatch in "employees" {
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    department_id: Option<i64>,
    role: String,
    active: bool,
});

hotel_entity!(
    /// A guest or staff service request routed to a department.
    Call / CallPatch in "calls" {
        room_number: String,
        department_id: Option<i64>,
        description: String,
        status: CallStatus,
        priority: u8,
        created_at: Option<DateTime<Utc>>,
    }
);

hotel_entity!(
    /// A call template re-issued every `interval_days`.
    RecurringCall / RecurringCallPatch in "recurring_calls" {
        room_number: String,
        department_id: Option<i64>,
        description: String,
        interval_days: u32,
        next_run: Option<DateTime<Utc>>,
        active: bool,
    }
);

hotel_entity!(CleaningTask / CleaningTaskPatch in "cleaning" {
    room_number: String,
    status: CleaningStatus,
    assigned_employee_id: Option<i64>,
    notes: String,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_text_ids_round_trip_untagged() {
        let num: EntityId = serde_json::from_str("42").expect("num");
        assert_eq!(num, EntityId::Num(42));
        let text: EntityId = serde_json::from_str("\"temp-7\"").expect("text");
        assert!(text.is_temporary());
        assert_eq!(text.to_string(), "temp-7");
    }

    #[test]
    fn apply_overwrites_only_present_fields() {
        let mut department = Department {
            id: EntityId::Num(5),
            name: "A".into(),
            description: "front desk".into(),
            manager_id: Some(3),
        };
        department.apply(&DepartmentPatch {
            id: Some(EntityId::Num(5)),
            name: Some("Y".into()),
            ..Default::default()
        });
        assert_eq!(department.name, "Y");
        assert_eq!(department.description, "front desk");
        assert_eq!(department.manager_id, Some(3));
    }

    #[test]
    fn patch_omits_absent_fields_on_the_wire() {
        let patch = CallPatch {
            room_number: Some("101".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).expect("json");
        assert_eq!(value, serde_json::json!({ "roomNumber": "101" }));
    }

    #[test]
    fn draft_fills_missing_fields_with_defaults() {
        let draft = CleaningTask::draft(
            EntityId::temporary(1),
            &CleaningTaskPatch {
                room_number: Some("204".into()),
                ..Default::default()
            },
        );
        assert_eq!(draft.id, EntityId::Text("temp-1".into()));
        assert_eq!(draft.room_number, "204");
        assert_eq!(draft.status, CleaningStatus::Dirty);
        assert!(draft.notes.is_empty());
    }
}
