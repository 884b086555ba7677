use chrono::{Duration, Utc};
use serde_json::Value;
use shared::{
    domain::{
        Call, CallStatus, CleaningStatus, CleaningTask, Department, Employee, EntityId,
        RecurringCall, Resource,
    },
    error::ApiError,
};

use crate::internal;

fn encode<T: Resource>(rows: Vec<T>) -> Result<(&'static str, Vec<Value>), ApiError> {
    let rows = rows
        .into_iter()
        .map(|row| serde_json::to_value(row).map_err(internal))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((T::COLLECTION, rows))
}

// Ids are assigned on insert in list order: department 1 is the front desk,
// employee 4 is Tomasz Nowak.
fn placeholder() -> EntityId {
    EntityId::Num(0)
}

fn departments() -> Vec<Department> {
    [
        ("Front desk", "Check-in, check-out and guest requests", Some(1)),
        ("Housekeeping", "Room cleaning and linen", Some(3)),
        ("Maintenance", "Repairs and technical issues", Some(5)),
        ("Kitchen", "Room service and restaurant", None),
        ("Spa", "Wellness area", None),
    ]
    .into_iter()
    .map(|(name, description, manager_id)| Department {
        id: placeholder(),
        name: name.to_string(),
        description: description.to_string(),
        manager_id,
    })
    .collect()
}

fn employees() -> Vec<Employee> {
    [
        ("Anna", "Berg", 1, "manager", true),
        ("Jonas", "Keller", 1, "receptionist", true),
        ("Maria", "Lopez", 2, "manager", true),
        ("Tomasz", "Nowak", 2, "room attendant", true),
        ("Ole", "Hansen", 3, "manager", true),
        ("Priya", "Shah", 3, "technician", false),
    ]
    .into_iter()
    .map(|(first_name, last_name, department_id, role, active)| Employee {
        id: placeholder(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: format!(
            "{}.{}@hotel.example",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        ),
        phone: String::new(),
        department_id: Some(department_id),
        role: role.to_string(),
        active,
    })
    .collect()
}

fn calls() -> Vec<Call> {
    let now = Utc::now();
    [
        ("101", 3, "Leaking tap in bathroom", CallStatus::Open, 2),
        ("204", 2, "Extra towels", CallStatus::InProgress, 1),
        ("312", 4, "Breakfast to the room at 7:00", CallStatus::Open, 1),
        ("118", 3, "Air conditioning too loud", CallStatus::Done, 3),
        ("207", 1, "Late check-out request", CallStatus::Cancelled, 1),
    ]
    .into_iter()
    .enumerate()
    .map(|(age, (room, department_id, description, status, priority))| Call {
        id: placeholder(),
        room_number: room.to_string(),
        department_id: Some(department_id),
        description: description.to_string(),
        status,
        priority,
        created_at: Some(now - Duration::hours(age as i64)),
    })
    .collect()
}

fn recurring_calls() -> Vec<RecurringCall> {
    let now = Utc::now();
    [
        ("101", 3, "Check smoke detector", 30, true),
        ("Lobby", 2, "Deep-clean carpets", 7, true),
        ("Pool", 5, "Water quality test", 1, false),
    ]
    .into_iter()
    .map(
        |(room, department_id, description, interval_days, active)| RecurringCall {
            id: placeholder(),
            room_number: room.to_string(),
            department_id: Some(department_id),
            description: description.to_string(),
            interval_days,
            next_run: Some(now + Duration::days(i64::from(interval_days))),
            active,
        },
    )
    .collect()
}

fn cleaning_tasks() -> Vec<CleaningTask> {
    [
        ("101", CleaningStatus::Dirty, Some(4), ""),
        ("102", CleaningStatus::Clean, Some(4), "Guest allergic to feathers"),
        ("204", CleaningStatus::InProgress, Some(4), ""),
        ("312", CleaningStatus::Inspected, None, "VIP arrival"),
    ]
    .into_iter()
    .map(|(room, status, assigned_employee_id, notes)| CleaningTask {
        id: placeholder(),
        room_number: room.to_string(),
        status,
        assigned_employee_id,
        notes: notes.to_string(),
    })
    .collect()
}

pub(crate) fn rows() -> Result<Vec<(&'static str, Vec<Value>)>, ApiError> {
    Ok(vec![
        encode(departments())?,
        encode(employees())?,
        encode(calls())?,
        encode(recurring_calls())?,
        encode(cleaning_tasks())?,
    ])
}
