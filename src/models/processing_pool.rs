use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Audit marker written when the doctor processes an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingPoolEntry {
    pub id: i64,
    pub appointment_id: i64,
    pub added_at: NaiveDateTime,
    pub is_removed: bool,
}
