//! Queue facade.
//!
//! The only entry point other modules use to read the processing order or to
//! signal that an appointment changed. Methods take the caller's
//! `&Connection` (or open transaction) so the manager itself holds no
//! database handle and can be shared across request threads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use rusqlite::Connection;
use serde::Serialize;

use super::builder::build_queue;
use super::cache::{MemoryQueueCache, QueueCache, QueueSnapshot};
use super::error::QueueError;
use crate::clock::Clock;
use crate::db::repository::{
    get_appointment, get_priorities, get_scheduler_cursor, list_eligible_entries,
    set_scheduler_cursor,
};
use crate::models::{Appointment, Priority};

/// Cursor assumed when the scheduler row is missing or corrupt.
pub const DEFAULT_CURSOR: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    /// Keyed by priority level 1-4, every level present.
    pub priority_counts: BTreeMap<u8, usize>,
}

pub struct QueueManager {
    cache: Arc<dyn QueueCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    rebuilds: AtomicU64,
}

impl QueueManager {
    pub fn new(cache: Arc<dyn QueueCache>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            cache,
            clock,
            ttl,
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Manager over a fresh in-process cache.
    pub fn in_memory(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryQueueCache::new()), clock, ttl)
    }

    /// Number of times the builder has run since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Current processing order, rebuilding when the snapshot is absent or stale.
    pub fn get_queue(&self, conn: &Connection) -> Result<Vec<i64>, QueueError> {
        if let Some(snapshot) = self.cache.load()? {
            if !snapshot.is_stale(self.clock.now(), self.ttl) {
                return Ok(snapshot.ids);
            }
            tracing::debug!(generated_at = %snapshot.generated_at, "Queue snapshot expired");
        }
        self.rebuild(conn)
    }

    /// Force a rebuild and return the new order.
    pub fn refresh_queue(&self, conn: &Connection) -> Result<Vec<i64>, QueueError> {
        self.cache.invalidate()?;
        self.rebuild(conn)
    }

    fn rebuild(&self, conn: &Connection) -> Result<Vec<i64>, QueueError> {
        let epoch = self.cache.epoch()?;
        let cursor = self.get_last_processed_priority(conn)?;
        let entries = list_eligible_entries(conn)?;
        let ids = build_queue(&entries, i64::from(cursor));
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        let stored = self
            .cache
            .store(QueueSnapshot::new(ids.clone(), self.clock.now()), epoch)?;
        tracing::debug!(len = ids.len(), cursor, stored, "Rebuilt processing queue");
        Ok(ids)
    }

    /// Head of the queue, if it still resolves to an eligible appointment.
    ///
    /// A head that was processed or deleted behind the cache's back triggers
    /// one invalidation and one retry; after that the answer is `None`.
    pub fn get_next_appointment(&self, conn: &Connection) -> Result<Option<Appointment>, QueueError> {
        for attempt in 0..2 {
            let ids = self.get_queue(conn)?;
            let Some(&head) = ids.first() else {
                return Ok(None);
            };
            match get_appointment(conn, head)? {
                Some(appointment) if appointment.is_eligible() => return Ok(Some(appointment)),
                _ => {
                    tracing::debug!(appointment_id = head, attempt, "Queue head no longer eligible");
                    self.cache.invalidate()?;
                }
            }
        }
        Ok(None)
    }

    /// 1-based position of `appointment` in the processing order.
    pub fn get_queue_position(
        &self,
        conn: &Connection,
        appointment: &Appointment,
    ) -> Result<Option<usize>, QueueError> {
        if !appointment.is_eligible() {
            return Ok(None);
        }
        for attempt in 0..2 {
            let ids = self.get_queue(conn)?;
            if let Some(index) = ids.iter().position(|id| *id == appointment.id) {
                return Ok(Some(index + 1));
            }
            if attempt == 0 {
                tracing::debug!(appointment_id = appointment.id, "Eligible appointment missing from snapshot");
                self.cache.invalidate()?;
            }
        }
        Ok(None)
    }

    pub fn invalidate_queue(&self) -> Result<(), QueueError> {
        self.cache.invalidate()
    }

    /// Call after every committed write to an appointment.
    pub fn handle_appointment_change(&self, appointment: &Appointment) -> Result<(), QueueError> {
        if appointment.state.is_queue_relevant() {
            tracing::debug!(
                appointment_id = appointment.id,
                state = %appointment.state,
                "Invalidating queue after appointment change"
            );
            self.cache.invalidate()?;
        }
        Ok(())
    }

    /// Queue length plus a breakdown by live priority.
    pub fn get_queue_stats(&self, conn: &Connection) -> Result<QueueStats, QueueError> {
        let ids = self.get_queue(conn)?;
        let mut priority_counts: BTreeMap<u8, usize> =
            Priority::ALL.iter().map(|p| (p.level(), 0)).collect();
        for priority in get_priorities(conn, &ids)? {
            *priority_counts.entry(priority.level()).or_insert(0) += 1;
        }
        Ok(QueueStats {
            total: ids.len(),
            priority_counts,
        })
    }

    /// Last served round-robin tier, always within 1..=3.
    pub fn get_last_processed_priority(&self, conn: &Connection) -> Result<u8, QueueError> {
        match get_scheduler_cursor(conn)? {
            Some(level @ 1..=3) => Ok(level as u8),
            Some(level) => {
                tracing::warn!(level, "Scheduler cursor out of range, using {DEFAULT_CURSOR}");
                Ok(DEFAULT_CURSOR)
            }
            None => {
                tracing::warn!("Scheduler state missing, using cursor {DEFAULT_CURSOR}");
                Ok(DEFAULT_CURSOR)
            }
        }
    }

    /// Record the tier just served. Critical work does not advance the cycle.
    pub fn update_last_processed_priority(
        &self,
        conn: &Connection,
        priority: Priority,
    ) -> Result<(), QueueError> {
        if priority == Priority::Critical {
            return Ok(());
        }
        set_scheduler_cursor(conn, priority.level(), &self.clock.now())?;
        self.cache.invalidate()
    }
}
