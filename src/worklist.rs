//! Read-side views for the doctor's dashboard and the guest's own list.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::repository::{self, count_in_state, first_in_state, get_appointment, list_active_pool};
use crate::db::DatabaseError;
use crate::lifecycle::{BookingError, BookingService};
use crate::models::{Appointment, AppointmentState, ProcessingPoolEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub urged: u32,
    pub unresponded: u32,
    /// Responded and waiting, urged ones excluded.
    pub unprocessed: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolItem {
    pub entry: ProcessingPoolEntry,
    pub appointment: Appointment,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuestAppointmentView {
    pub appointment: Appointment,
    pub queue_position: Option<usize>,
    pub can_edit_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuestOverview {
    pub appointments: Vec<GuestAppointmentView>,
    pub urges_left: u32,
}

/// Oldest appointment still waiting for a first response.
pub fn next_unresponded(conn: &Connection) -> Result<Option<Appointment>, DatabaseError> {
    first_in_state(conn, AppointmentState::Created)
}

/// Oldest open urge. Independent of the processing queue.
pub fn next_urged(conn: &Connection) -> Result<Option<Appointment>, DatabaseError> {
    first_in_state(conn, AppointmentState::Urged)
}

pub fn dashboard_counts(conn: &Connection) -> Result<DashboardCounts, DatabaseError> {
    Ok(DashboardCounts {
        urged: count_in_state(conn, AppointmentState::Urged)?,
        unresponded: count_in_state(conn, AppointmentState::Created)?,
        unprocessed: count_in_state(conn, AppointmentState::Responded)?,
    })
}

/// Processed appointments still shown in the doctor's pool, newest first.
pub fn processing_pool(conn: &Connection) -> Result<Vec<PoolItem>, DatabaseError> {
    let mut items = Vec::new();
    for entry in list_active_pool(conn)? {
        match get_appointment(conn, entry.appointment_id)? {
            Some(appointment) => items.push(PoolItem { entry, appointment }),
            None => tracing::warn!(
                appointment_id = entry.appointment_id,
                "Pool entry without appointment"
            ),
        }
    }
    Ok(items)
}

/// Hide an appointment from the pool. Returns whether anything was removed.
pub fn remove_from_pool(conn: &Connection, appointment_id: i64) -> Result<bool, DatabaseError> {
    let removed = repository::remove_from_pool(conn, appointment_id)?;
    tracing::debug!(appointment_id, removed, "Removed from processing pool");
    Ok(removed > 0)
}

pub fn guest_overview(
    service: &BookingService,
    conn: &Connection,
    guest_id: i64,
) -> Result<GuestOverview, BookingError> {
    let mut appointments = Vec::new();
    for appointment in repository::list_guest_appointments(conn, guest_id)? {
        let queue_position = service.queue().get_queue_position(conn, &appointment)?;
        let can_edit_today = service.can_edit_today(&appointment);
        appointments.push(GuestAppointmentView {
            appointment,
            queue_position,
            can_edit_today,
        });
    }
    Ok(GuestOverview {
        appointments,
        urges_left: service.urges_left(conn, guest_id)?,
    })
}
