//! The [`CheckpointStore`] trait — the storage backend a node's checkpoint
//! marker is persisted through.
//!
//! A store holds at most **one** opaque marker string per node identity.
//! There is no history, no versioning, no query surface: the barrier
//! protocol in `fabric-core` only ever needs "what did this node last
//! persist" and "persist this now". Anything richer (time-travel, audit
//! trails) belongs to a downstream node implementation, not the core.
//!
//! # Load is a one-shot handoff
//!
//! [`CheckpointStore::load`] deletes the persisted entry after reading it.
//! This models recovery as a single disk-to-memory handoff: the node keeps
//! the marker in `last_checkpoint` from then on, and the next barrier
//! completion calls [`CheckpointStore::store`] again, which is the only
//! thing that writes the entry back.

use async_trait::async_trait;

use crate::error::Result;

/// Persists and recovers a single checkpoint marker per node identity.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the marker for `name`, deleting the persisted entry afterwards.
    ///
    /// Returns `Ok(None)` if no marker was ever stored for `name` — this is
    /// the benign "missing prior checkpoint on boot" case, not an error.
    async fn load(&self, name: &str) -> Result<Option<String>>;

    /// Atomically replace the marker for `name`.
    ///
    /// A future `load` call (in this process or a restarted one, for a
    /// disk-backed store) observes this value.
    async fn store(&self, name: &str, marker: &str) -> Result<()>;
}
