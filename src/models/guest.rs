use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Guest account owning appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: i64,
    pub email: String,
    pub created_at: NaiveDateTime,
}
