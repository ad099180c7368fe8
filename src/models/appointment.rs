use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::AppointmentState;
use crate::db::DatabaseError;

/// Triage priority. Critical appointments bypass the round-robin entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: i64) -> Result<Self, DatabaseError> {
        match level {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            other => Err(DatabaseError::InvalidEnum {
                field: "Priority".into(),
                value: other.to_string(),
            }),
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.level()
    }
}

impl TryFrom<u8> for Priority {
    type Error = DatabaseError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(i64::from(level))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub guest_id: i64,
    pub patient_name: String,
    pub demand: String,
    pub wechat_id: String,
    pub priority: Priority,
    pub state: AppointmentState,
    /// Doctor's remark, visible to the guest.
    pub annotation: String,
    /// Doctor-only note.
    pub note: String,
    pub today_modified_count: u32,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
    pub urged_at: Option<NaiveDateTime>,
    pub processed_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
    pub last_modified_at: Option<NaiveDateTime>,
}

impl Appointment {
    pub fn is_responded(&self) -> bool {
        self.responded_at.is_some()
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn is_urged(&self) -> bool {
        self.state == AppointmentState::Urged
    }

    pub fn is_deleted(&self) -> bool {
        self.state == AppointmentState::Deleted
    }

    /// Responded, not processed, not deleted.
    pub fn is_eligible(&self) -> bool {
        self.state.is_eligible()
    }

    /// Reject rows whose state tag contradicts the recorded timestamps.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        let violation = match self.state {
            AppointmentState::Created if self.responded_at.is_some() || self.processed_at.is_some() => {
                Some("created appointment carries response or processing time")
            }
            AppointmentState::Responded | AppointmentState::Urged if self.responded_at.is_none() => {
                Some("responded appointment without responded_at")
            }
            AppointmentState::Responded | AppointmentState::Urged if self.processed_at.is_some() => {
                Some("queued appointment carries processed_at")
            }
            AppointmentState::Urged if self.urged_at.is_none() => Some("urged appointment without urged_at"),
            AppointmentState::Processed if self.processed_at.is_none() || self.responded_at.is_none() => {
                Some("processed appointment without processed_at or responded_at")
            }
            AppointmentState::Deleted if self.deleted_at.is_none() => Some("deleted appointment without deleted_at"),
            _ => None,
        };

        match violation {
            Some(reason) => Err(DatabaseError::ConstraintViolation(format!(
                "appointment {}: {reason}",
                self.id
            ))),
            None => Ok(()),
        }
    }
}

/// Guest-submitted request before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub guest_id: i64,
    pub patient_name: String,
    pub demand: String,
    pub wechat_id: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Minimal projection the queue builder works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub priority: Priority,
}

impl QueueEntry {
    pub fn new(id: i64, priority: Priority) -> Self {
        Self { id, priority }
    }
}
