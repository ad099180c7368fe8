//! Appointment processing queue.
//!
//! Decides which single appointment the doctor should work on next:
//! - `builder`: pure ordering (critical first, then round-robin over tiers 3/2/1)
//! - `cache`: one snapshot slot with TTL and whole-slot invalidation
//! - `manager`: the facade every other module goes through
//!
//! Every id in a snapshot was eligible (responded, not processed, not
//! deleted) when the snapshot was built. Writers keep it that way by
//! invalidating through `QueueManager::handle_appointment_change`.

pub mod builder;
pub mod cache;
pub mod error;
pub mod manager;

pub use builder::{build_queue, start_index, TIER_CYCLE};
pub use cache::{MemoryQueueCache, QueueCache, QueueSnapshot};
pub use error::QueueError;
pub use manager::{QueueManager, QueueStats, DEFAULT_CURSOR};
