//! Patient profiles: a doctor-kept file per patient with a trail of records.
//!
//! Guests see their linked profiles without the doctor's overview or private
//! notes, may add their own records, and may flag a profile as waiting for a
//! reply. A public doctor reply clears that flag and notifies the guest.

use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::db::repository::{
    count_visible_records, delete_profile, delete_record, get_profile, get_record, insert_profile,
    insert_record, latest_record_type, list_profiles_for_guest, list_profiles_urged_first,
    list_records, profile_stats, set_profile_urged, touch_profile, update_profile_fields,
};
use crate::db::DatabaseError;
use crate::models::{NotificationKind, Profile, ProfileFields, ProfileRecord, ProfileStats, RecordType};
use crate::notify::{notify_profile_silently, Notifier};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Profile {0} not found")]
    NotFound(i64),

    #[error("Profile record {0} not found")]
    RecordNotFound(i64),

    #[error("Profile {profile_id} does not belong to guest {guest_id}")]
    NotOwner { profile_id: i64, guest_id: i64 },

    #[error("Profile name must not be empty")]
    EmptyName,

    #[error("Record content must not be empty")]
    EmptyContent,

    #[error("Doctor records must be public or private")]
    GuestRecordType,

    #[error("Profile {0} has no guest record awaiting a reply")]
    NothingToUrge(i64),
}

impl From<rusqlite::Error> for ProfileError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

/// A profile with the records its reader may see, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDetail {
    pub profile: Profile,
    pub records: Vec<ProfileRecord>,
    /// Newest record is the guest's own, so a reply can be requested.
    pub can_urge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub profile: Profile,
    pub visible_records: u32,
}

pub struct ProfileService {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl ProfileService {
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { clock, notifier }
    }

    // ── Guest operations ────────────────────────────────────

    /// The guest's linked profiles, most recently updated first.
    pub fn guest_profiles(
        &self,
        conn: &Connection,
        guest_id: i64,
    ) -> Result<Vec<ProfileSummary>, ProfileError> {
        list_profiles_for_guest(conn, guest_id)?
            .into_iter()
            .map(|profile| -> Result<ProfileSummary, ProfileError> {
                Ok(ProfileSummary {
                    visible_records: count_visible_records(conn, profile.id)?,
                    profile: profile.guest_view(),
                })
            })
            .collect()
    }

    pub fn guest_profile_detail(
        &self,
        conn: &Connection,
        guest_id: i64,
        profile_id: i64,
    ) -> Result<ProfileDetail, ProfileError> {
        let profile = load_owned(conn, profile_id, guest_id)?;
        Ok(ProfileDetail {
            records: list_records(conn, profile_id, true)?,
            can_urge: awaits_reply(conn, profile_id)?,
            profile: profile.guest_view(),
        })
    }

    pub fn add_guest_record(
        &self,
        conn: &Connection,
        guest_id: i64,
        profile_id: i64,
        content: &str,
    ) -> Result<ProfileRecord, ProfileError> {
        let content = non_empty(content)?;
        let tx = begin(conn)?;
        load_owned(&tx, profile_id, guest_id)?;
        let record = self.append_record(&tx, profile_id, content, RecordType::User)?;
        tx.commit()?;

        tracing::info!(profile_id, guest_id, record_id = record.id, "Guest added profile record");
        Ok(record)
    }

    /// Flag or unflag the profile as waiting for a doctor reply. Flagging
    /// requires the newest record to be the guest's own.
    pub fn set_urged(
        &self,
        conn: &Connection,
        guest_id: i64,
        profile_id: i64,
        urged: bool,
    ) -> Result<Profile, ProfileError> {
        let tx = begin(conn)?;
        load_owned(&tx, profile_id, guest_id)?;
        if urged && !awaits_reply(&tx, profile_id)? {
            return Err(ProfileError::NothingToUrge(profile_id));
        }
        set_profile_urged(&tx, profile_id, urged, &self.clock.now())?;
        let profile = load(&tx, profile_id)?;
        tx.commit()?;

        tracing::info!(profile_id, guest_id, urged, "Profile urge flag changed");
        Ok(profile.guest_view())
    }

    // ── Doctor operations ───────────────────────────────────

    pub fn create_profile(
        &self,
        conn: &Connection,
        fields: &ProfileFields,
        initial_record: Option<&str>,
    ) -> Result<Profile, ProfileError> {
        if fields.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let tx = begin(conn)?;
        let now = self.clock.now();
        let id = insert_profile(&tx, fields, &now)?;
        if let Some(content) = initial_record.map(str::trim).filter(|c| !c.is_empty()) {
            insert_record(&tx, id, content, RecordType::DoctorPrivate, &now)?;
        }
        let profile = load(&tx, id)?;
        tx.commit()?;

        tracing::info!(profile_id = id, guest_id = ?fields.guest_id, "Profile created");
        Ok(profile)
    }

    pub fn edit_profile(
        &self,
        conn: &Connection,
        profile_id: i64,
        fields: &ProfileFields,
    ) -> Result<Profile, ProfileError> {
        if fields.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let tx = begin(conn)?;
        load(&tx, profile_id)?;
        update_profile_fields(&tx, profile_id, fields, &self.clock.now())?;
        let profile = load(&tx, profile_id)?;
        tx.commit()?;
        Ok(profile)
    }

    pub fn delete_profile(&self, conn: &Connection, profile_id: i64) -> Result<(), ProfileError> {
        if !delete_profile(conn, profile_id)? {
            return Err(ProfileError::NotFound(profile_id));
        }
        tracing::info!(profile_id, "Profile deleted");
        Ok(())
    }

    /// Every profile, those awaiting a reply first.
    pub fn doctor_profiles(&self, conn: &Connection) -> Result<Vec<Profile>, ProfileError> {
        Ok(list_profiles_urged_first(conn)?)
    }

    pub fn doctor_profile_detail(
        &self,
        conn: &Connection,
        profile_id: i64,
    ) -> Result<ProfileDetail, ProfileError> {
        let profile = load(conn, profile_id)?;
        Ok(ProfileDetail {
            records: list_records(conn, profile_id, false)?,
            can_urge: awaits_reply(conn, profile_id)?,
            profile,
        })
    }

    /// Add a doctor record. A public reply on a linked profile clears the
    /// urge flag and notifies the guest after commit.
    pub fn add_doctor_record(
        &self,
        conn: &Connection,
        profile_id: i64,
        content: &str,
        record_type: RecordType,
    ) -> Result<ProfileRecord, ProfileError> {
        if record_type == RecordType::User {
            return Err(ProfileError::GuestRecordType);
        }
        let content = non_empty(content)?;
        let tx = begin(conn)?;
        let profile = load(&tx, profile_id)?;
        let record = self.append_record(&tx, profile_id, content, record_type)?;

        let reply_to_guest = record_type == RecordType::DoctorPublic && profile.guest_id.is_some();
        if reply_to_guest {
            set_profile_urged(&tx, profile_id, false, &record.created_at)?;
        }
        let profile = load(&tx, profile_id)?;
        tx.commit()?;

        tracing::info!(profile_id, record_id = record.id, record_type = %record_type, "Doctor added profile record");
        if reply_to_guest {
            notify_profile_silently(self.notifier.as_ref(), &profile, NotificationKind::ProfileReplied);
        }
        Ok(record)
    }

    pub fn delete_record(&self, conn: &Connection, record_id: i64) -> Result<(), ProfileError> {
        if !delete_record(conn, record_id)? {
            return Err(ProfileError::RecordNotFound(record_id));
        }
        Ok(())
    }

    pub fn stats(&self, conn: &Connection) -> Result<ProfileStats, ProfileError> {
        Ok(profile_stats(conn)?)
    }

    fn append_record(
        &self,
        tx: &Transaction<'_>,
        profile_id: i64,
        content: &str,
        record_type: RecordType,
    ) -> Result<ProfileRecord, ProfileError> {
        let now = self.clock.now();
        let id = insert_record(tx, profile_id, content, record_type, &now)?;
        touch_profile(tx, profile_id, &now)?;
        get_record(tx, id)?.ok_or(ProfileError::RecordNotFound(id))
    }
}

fn begin(conn: &Connection) -> Result<Transaction<'_>, ProfileError> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn load(conn: &Connection, id: i64) -> Result<Profile, ProfileError> {
    get_profile(conn, id)?.ok_or(ProfileError::NotFound(id))
}

fn load_owned(conn: &Connection, profile_id: i64, guest_id: i64) -> Result<Profile, ProfileError> {
    let profile = load(conn, profile_id)?;
    if profile.guest_id != Some(guest_id) {
        return Err(ProfileError::NotOwner {
            profile_id,
            guest_id,
        });
    }
    Ok(profile)
}

fn awaits_reply(conn: &Connection, profile_id: i64) -> Result<bool, ProfileError> {
    Ok(latest_record_type(conn, profile_id)? == Some(RecordType::User))
}

fn non_empty(content: &str) -> Result<&str, ProfileError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ProfileError::EmptyContent);
    }
    Ok(content)
}
