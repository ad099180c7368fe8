//! Queue snapshot cache.
//!
//! One slot holding the last built order plus its build time. Invalidation
//! clears the whole slot; there is no partial update. Each invalidation also
//! bumps an epoch so a rebuild that started before the invalidation cannot
//! overwrite the empty slot with an order computed from stale rows.

use std::sync::RwLock;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::error::QueueError;

/// A built processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub ids: Vec<i64>,
    pub generated_at: NaiveDateTime,
}

impl QueueSnapshot {
    pub fn new(ids: Vec<i64>, generated_at: NaiveDateTime) -> Self {
        Self { ids, generated_at }
    }

    /// Stale once strictly older than `ttl`.
    pub fn is_stale(&self, now: NaiveDateTime, ttl: Duration) -> bool {
        now - self.generated_at > ttl
    }

    pub fn position_of(&self, id: i64) -> Option<usize> {
        self.ids.iter().position(|candidate| *candidate == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════
// QueueCache trait
// ═══════════════════════════════════════════════════════════

/// Storage for the single queue snapshot.
///
/// Implementations must be safe to share across threads; the manager holds
/// them behind `Arc<dyn QueueCache>`.
pub trait QueueCache: Send + Sync {
    /// Current snapshot, fresh or not. The caller judges staleness.
    fn load(&self) -> Result<Option<QueueSnapshot>, QueueError>;

    /// Invalidation counter. Read before a rebuild, passed back to `store`.
    fn epoch(&self) -> Result<u64, QueueError>;

    /// Store `snapshot` if no invalidation happened since `epoch` was read.
    /// Returns whether the snapshot was kept.
    fn store(&self, snapshot: QueueSnapshot, epoch: u64) -> Result<bool, QueueError>;

    /// Drop the snapshot. Idempotent.
    fn invalidate(&self) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct Slot {
    snapshot: Option<QueueSnapshot>,
    epoch: u64,
}

/// In-process cache backed by an `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryQueueCache {
    slot: RwLock<Slot>,
}

impl MemoryQueueCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueCache for MemoryQueueCache {
    fn load(&self) -> Result<Option<QueueSnapshot>, QueueError> {
        let slot = self.slot.read().map_err(|_| QueueError::LockPoisoned)?;
        Ok(slot.snapshot.clone())
    }

    fn epoch(&self) -> Result<u64, QueueError> {
        let slot = self.slot.read().map_err(|_| QueueError::LockPoisoned)?;
        Ok(slot.epoch)
    }

    fn store(&self, snapshot: QueueSnapshot, epoch: u64) -> Result<bool, QueueError> {
        let mut slot = self.slot.write().map_err(|_| QueueError::LockPoisoned)?;
        if slot.epoch != epoch {
            tracing::debug!(
                expected = epoch,
                current = slot.epoch,
                "Discarding queue snapshot built before an invalidation"
            );
            return Ok(false);
        }
        slot.snapshot = Some(snapshot);
        Ok(true)
    }

    fn invalidate(&self) -> Result<(), QueueError> {
        let mut slot = self.slot.write().map_err(|_| QueueError::LockPoisoned)?;
        slot.snapshot = None;
        slot.epoch = slot.epoch.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn empty_cache_loads_none() {
        let cache = MemoryQueueCache::new();
        assert!(cache.load().unwrap().is_none());
        assert_eq!(cache.epoch().unwrap(), 0);
    }

    #[test]
    fn store_then_load() {
        let cache = MemoryQueueCache::new();
        let snapshot = QueueSnapshot::new(vec![3, 1, 2], at("2026-03-02 09:00:00"));
        assert!(cache.store(snapshot.clone(), 0).unwrap());
        assert_eq!(cache.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = MemoryQueueCache::new();
        cache
            .store(QueueSnapshot::new(vec![1], at("2026-03-02 09:00:00")), 0)
            .unwrap();
        cache.invalidate().unwrap();
        cache.invalidate().unwrap();
        assert!(cache.load().unwrap().is_none());
        assert_eq!(cache.epoch().unwrap(), 2);
    }

    #[test]
    fn store_with_outdated_epoch_is_discarded() {
        let cache = MemoryQueueCache::new();
        let epoch = cache.epoch().unwrap();
        cache.invalidate().unwrap();

        let kept = cache
            .store(QueueSnapshot::new(vec![1, 2], at("2026-03-02 09:00:00")), epoch)
            .unwrap();
        assert!(!kept);
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn staleness_is_strictly_greater_than_ttl() {
        let snapshot = QueueSnapshot::new(vec![], at("2026-03-02 09:00:00"));
        let ttl = Duration::minutes(5);
        assert!(!snapshot.is_stale(at("2026-03-02 09:05:00"), ttl));
        assert!(snapshot.is_stale(at("2026-03-02 09:05:01"), ttl));
    }

    #[test]
    fn position_lookup() {
        let snapshot = QueueSnapshot::new(vec![5, 9, 2], at("2026-03-02 09:00:00"));
        assert_eq!(snapshot.position_of(9), Some(1));
        assert_eq!(snapshot.position_of(4), None);
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.is_empty());
    }
}
