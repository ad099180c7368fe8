//! Clinic announcements with a per-guest read marker.

use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::db::repository::{
    count_announcements, count_announcements_after, delete_announcement,
    delete_oldest_announcement, get_announcement_view_time, insert_announcement,
    list_announcements, set_announcement_view_time,
};
use crate::db::DatabaseError;
use crate::models::Announcement;

#[derive(Error, Debug)]
pub enum AnnouncementError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Announcement {0} not found")]
    NotFound(i64),

    #[error("Guest {0} not found")]
    GuestNotFound(i64),

    #[error("Announcement title must not be empty")]
    EmptyTitle,
}

impl From<rusqlite::Error> for AnnouncementError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementView {
    pub announcement: Announcement,
    /// Published after the guest last opened the list.
    pub unread: bool,
}

pub struct AnnouncementBoard {
    clock: Arc<dyn Clock>,
    max_kept: u32,
}

impl AnnouncementBoard {
    pub fn new(clock: Arc<dyn Clock>, max_kept: u32) -> Self {
        Self {
            clock,
            max_kept: max_kept.max(1),
        }
    }

    /// Publish a new announcement, dropping the oldest ones past the cap.
    pub fn publish(
        &self,
        conn: &Connection,
        title: &str,
        content: &str,
    ) -> Result<Announcement, AnnouncementError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AnnouncementError::EmptyTitle);
        }
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        while count_announcements(&tx)? >= self.max_kept {
            if let Some(dropped) = delete_oldest_announcement(&tx)? {
                tracing::info!(announcement_id = dropped, "Dropped oldest announcement");
            }
        }
        let now = self.clock.now();
        let id = insert_announcement(&tx, title, content, &now)?;
        tx.commit()?;

        tracing::info!(announcement_id = id, "Announcement published");
        Ok(Announcement {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    pub fn delete(&self, conn: &Connection, id: i64) -> Result<(), AnnouncementError> {
        if !delete_announcement(conn, id)? {
            return Err(AnnouncementError::NotFound(id));
        }
        Ok(())
    }

    pub fn list(&self, conn: &Connection) -> Result<Vec<Announcement>, AnnouncementError> {
        Ok(list_announcements(conn)?)
    }

    /// Announcements published since the guest last opened the list.
    pub fn unread_count(&self, conn: &Connection, guest_id: i64) -> Result<u32, AnnouncementError> {
        let seen = get_announcement_view_time(conn, guest_id)?
            .ok_or(AnnouncementError::GuestNotFound(guest_id))?;
        Ok(count_announcements_after(conn, &seen)?)
    }

    /// List announcements for a guest, flag the unread ones, then mark all read.
    pub fn open_for_guest(
        &self,
        conn: &Connection,
        guest_id: i64,
    ) -> Result<Vec<AnnouncementView>, AnnouncementError> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let seen = get_announcement_view_time(&tx, guest_id)?
            .ok_or(AnnouncementError::GuestNotFound(guest_id))?;
        let views = list_announcements(&tx)?
            .into_iter()
            .map(|announcement| AnnouncementView {
                unread: announcement.created_at > seen,
                announcement,
            })
            .collect();
        set_announcement_view_time(&tx, guest_id, &self.clock.now())?;
        tx.commit()?;
        Ok(views)
    }
}
