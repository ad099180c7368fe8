//! Appointment lifecycle: every state change a guest or the doctor can make.
//!
//! Each operation runs in its own immediate transaction, commits, then
//! signals the queue and sends any guest notification. Notification failures
//! are logged and never roll back the committed change.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{day_start, week_start, Clock};
use crate::config::BookingConfig;
use crate::db::repository::{
    add_to_pool, count_creations_on, count_open_for_guest, count_urges_since, get_appointment,
    insert_appointment, purge_deleted_before, record_creation, record_urge, update_appointment,
};
use crate::db::DatabaseError;
use crate::models::{
    Appointment, AppointmentState, NewAppointment, NotificationKind, Priority, Transition,
};
use crate::notify::{notify_silently, Notifier};
use crate::queue::{QueueError, QueueManager};

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Appointment {0} not found")]
    NotFound(i64),

    #[error("Appointment {appointment_id} does not belong to guest {guest_id}")]
    NotOwner { appointment_id: i64, guest_id: i64 },

    #[error("Cannot {action} an appointment in state {from}")]
    IllegalTransition {
        from: AppointmentState,
        action: Transition,
    },

    #[error("Daily limit of {limit} new appointments reached")]
    DailyCreationLimit { limit: u32 },

    #[error("Limit of {limit} open appointments reached")]
    OpenAppointmentLimit { limit: u32 },

    #[error("Weekly urge quota of {limit} used up")]
    WeeklyUrgeQuota { limit: u32 },

    #[error("Appointment already edited {limit} time(s) today")]
    DailyEditLimit { limit: u32 },
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

/// Doctor input when responding to, or resolving an urge on, an appointment.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorResponse {
    pub annotation: Option<String>,
    pub note: Option<String>,
    pub priority: Option<Priority>,
}

/// Fields a guest may change on their own appointment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuestEdit {
    pub demand: Option<String>,
    pub wechat_id: Option<String>,
}

pub struct BookingService {
    queue: Arc<QueueManager>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        queue: Arc<QueueManager>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: BookingConfig,
    ) -> Self {
        Self {
            queue,
            clock,
            notifier,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    // ── Guest operations ────────────────────────────────────

    pub fn create_appointment(
        &self,
        conn: &Connection,
        new: &NewAppointment,
    ) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let now = self.clock.now();

        let limit = self.config.max_daily_creations;
        if count_creations_on(&tx, new.guest_id, now.date())? >= limit {
            return Err(BookingError::DailyCreationLimit { limit });
        }
        let limit = self.config.max_open_appointments;
        if count_open_for_guest(&tx, new.guest_id)? >= limit {
            return Err(BookingError::OpenAppointmentLimit { limit });
        }

        let id = insert_appointment(&tx, new, &now)?;
        record_creation(&tx, new.guest_id, &now)?;
        let appointment = load(&tx, id)?;
        tx.commit()?;

        tracing::info!(
            appointment_id = id,
            guest_id = new.guest_id,
            priority = new.priority.level(),
            "Appointment created"
        );
        self.after_commit(&appointment, None)?;
        Ok(appointment)
    }

    /// Ask the doctor to look again. Does not move the appointment in the queue.
    pub fn urge(&self, conn: &Connection, guest_id: i64, id: i64) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let now = self.clock.now();
        let mut appointment = load_owned(&tx, id, guest_id)?;
        advance(&mut appointment, Transition::Urge)?;

        let limit = self.config.weekly_urge_quota;
        if count_urges_since(&tx, guest_id, &week_start(now))? >= limit {
            return Err(BookingError::WeeklyUrgeQuota { limit });
        }

        appointment.urged_at = Some(now);
        update_appointment(&tx, &appointment)?;
        record_urge(&tx, guest_id, id, &now)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, guest_id, "Appointment urged");
        self.after_commit(&appointment, None)?;
        Ok(appointment)
    }

    /// Urges left for `guest_id` in the current Monday-based week.
    pub fn urges_left(&self, conn: &Connection, guest_id: i64) -> Result<u32, BookingError> {
        let used = count_urges_since(conn, guest_id, &week_start(self.clock.now()))?;
        Ok(self.config.weekly_urge_quota.saturating_sub(used))
    }

    pub fn delete(&self, conn: &Connection, guest_id: i64, id: i64) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let mut appointment = load_owned(&tx, id, guest_id)?;
        advance(&mut appointment, Transition::Delete)?;
        appointment.deleted_at = Some(self.clock.now());
        update_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, guest_id, "Appointment deleted");
        self.after_commit(&appointment, None)?;
        Ok(appointment)
    }

    pub fn edit(
        &self,
        conn: &Connection,
        guest_id: i64,
        id: i64,
        edit: &GuestEdit,
    ) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let now = self.clock.now();
        let mut appointment = load_owned(&tx, id, guest_id)?;
        advance(&mut appointment, Transition::Edit)?;

        let count_today = edits_on(&appointment, now.date());
        let limit = self.config.daily_edit_quota;
        if count_today >= limit {
            return Err(BookingError::DailyEditLimit { limit });
        }

        if let Some(demand) = &edit.demand {
            appointment.demand = demand.clone();
        }
        if let Some(wechat_id) = &edit.wechat_id {
            appointment.wechat_id = wechat_id.clone();
        }
        appointment.today_modified_count = count_today + 1;
        appointment.last_modified_at = Some(now);
        update_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, guest_id, "Appointment edited");
        self.after_commit(&appointment, None)?;
        Ok(appointment)
    }

    /// Whether the owner could edit `appointment` right now.
    pub fn can_edit_today(&self, appointment: &Appointment) -> bool {
        appointment.state.apply(Transition::Edit).is_some()
            && edits_on(appointment, self.clock.today()) < self.config.daily_edit_quota
    }

    // ── Doctor operations ───────────────────────────────────

    pub fn respond(
        &self,
        conn: &Connection,
        id: i64,
        response: &DoctorResponse,
    ) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let mut appointment = load(&tx, id)?;
        advance(&mut appointment, Transition::Respond)?;
        appointment.responded_at = Some(self.clock.now());
        apply_response(&mut appointment, response);
        update_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, priority = appointment.priority.level(), "Appointment responded");
        self.after_commit(&appointment, Some(NotificationKind::Responded))?;
        Ok(appointment)
    }

    /// Acknowledge an urge. The urge still counts against the guest's weekly quota.
    pub fn resolve_urge(
        &self,
        conn: &Connection,
        id: i64,
        response: &DoctorResponse,
    ) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let mut appointment = load(&tx, id)?;
        advance(&mut appointment, Transition::ResolveUrge)?;
        apply_response(&mut appointment, response);
        update_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, "Urge resolved");
        self.after_commit(&appointment, Some(NotificationKind::UrgeProcessed))?;
        Ok(appointment)
    }

    pub fn set_priority(
        &self,
        conn: &Connection,
        id: i64,
        priority: Priority,
    ) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let mut appointment = load(&tx, id)?;
        advance(&mut appointment, Transition::SetPriority)?;
        appointment.priority = priority;
        update_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, priority = priority.level(), "Priority changed");
        self.after_commit(&appointment, None)?;
        Ok(appointment)
    }

    /// Mark an appointment done, record it in the processing pool and advance
    /// the round-robin cursor (critical work leaves the cursor alone).
    pub fn process(&self, conn: &Connection, id: i64) -> Result<Appointment, BookingError> {
        let tx = begin(conn)?;
        let now = self.clock.now();
        let mut appointment = load(&tx, id)?;
        advance(&mut appointment, Transition::Process)?;
        appointment.responded_at.get_or_insert(now);
        appointment.processed_at = Some(now);
        update_appointment(&tx, &appointment)?;
        add_to_pool(&tx, id, &now)?;
        self.queue
            .update_last_processed_priority(&tx, appointment.priority)?;
        tx.commit()?;

        tracing::info!(appointment_id = id, priority = appointment.priority.level(), "Appointment processed");
        self.after_commit(&appointment, Some(NotificationKind::Processed))?;
        Ok(appointment)
    }

    // ── Maintenance ─────────────────────────────────────────

    /// Physically remove appointments soft-deleted before today.
    pub fn purge_expired_deleted(&self, conn: &Connection) -> Result<usize, BookingError> {
        let cutoff = day_start(self.clock.now());
        let removed = purge_deleted_before(conn, &cutoff)?;
        tracing::info!(removed, cutoff = %cutoff, "Purged deleted appointments");
        Ok(removed)
    }

    fn after_commit(
        &self,
        appointment: &Appointment,
        kind: Option<NotificationKind>,
    ) -> Result<(), BookingError> {
        self.queue.handle_appointment_change(appointment)?;
        if let Some(kind) = kind {
            notify_silently(self.notifier.as_ref(), appointment, kind);
        }
        Ok(())
    }
}

fn begin(conn: &Connection) -> Result<Transaction<'_>, BookingError> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn load(conn: &Connection, id: i64) -> Result<Appointment, BookingError> {
    get_appointment(conn, id)?.ok_or(BookingError::NotFound(id))
}

fn load_owned(conn: &Connection, id: i64, guest_id: i64) -> Result<Appointment, BookingError> {
    let appointment = load(conn, id)?;
    if appointment.guest_id != guest_id {
        return Err(BookingError::NotOwner {
            appointment_id: id,
            guest_id,
        });
    }
    Ok(appointment)
}

fn advance(appointment: &mut Appointment, action: Transition) -> Result<(), BookingError> {
    let from = appointment.state;
    appointment.state = from
        .apply(action)
        .ok_or(BookingError::IllegalTransition { from, action })?;
    Ok(())
}

/// The stored counter only applies to the day of the last edit.
fn edits_on(appointment: &Appointment, day: NaiveDate) -> u32 {
    match appointment.last_modified_at {
        Some(at) if at.date() == day => appointment.today_modified_count,
        _ => 0,
    }
}

fn apply_response(appointment: &mut Appointment, response: &DoctorResponse) {
    if let Some(annotation) = &response.annotation {
        appointment.annotation = annotation.clone();
    }
    if let Some(note) = &response.note {
        appointment.note = note.clone();
    }
    if let Some(priority) = response.priority {
        appointment.priority = priority;
    }
}
