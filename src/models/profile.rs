use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::RecordType;

/// Doctor-kept patient profile, optionally linked to a guest account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub guest_id: Option<i64>,
    pub wechat_id: String,
    pub notes: String,
    /// Doctor-only summary, never shown to the guest.
    pub overview: String,
    /// The guest is waiting for a doctor reply.
    pub is_urged: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    /// Copy safe to hand to the linked guest.
    pub fn guest_view(&self) -> Self {
        Self {
            overview: String::new(),
            ..self.clone()
        }
    }
}

/// Editable profile fields, used both on create and on edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFields {
    pub name: String,
    #[serde(default)]
    pub guest_id: Option<i64>,
    #[serde(default)]
    pub wechat_id: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: i64,
    pub profile_id: i64,
    pub content: String,
    pub record_type: RecordType,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: NaiveDateTime,
}

/// Counters for the doctor's profile overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_profiles: u32,
    pub linked_profiles: u32,
    pub total_records: u32,
    pub urged_profiles: u32,
}
