use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ═══════════════════════════════════════════════════════════════
//  ShardRegistry
// ═══════════════════════════════════════════════════════════════

/// Set of shard IDs that currently have a live consumer.
///
/// Acquire and release are linearizable: at any instant at most one
/// caller owns a given shard ID. The poller acquires, and only the
/// owning consumer releases (through its `ShardLease`).
#[derive(Debug, Default)]
pub struct ShardRegistry {
    owned: Mutex<HashSet<String>>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section is a single set operation, a poisoned
    // lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the caller now owns `shard_id`, `false` if
    /// someone already does.
    pub fn try_acquire(&self, shard_id: &str) -> bool {
        self.lock().insert(shard_id.to_string())
    }

    /// Drop ownership of `shard_id`. Returns `false` if it was not owned.
    pub fn release(&self, shard_id: &str) -> bool {
        self.lock().remove(shard_id)
    }

    /// Acquire `shard_id` and tie its release to the returned lease.
    pub fn lease(self: &Arc<Self>, shard_id: &str) -> Option<ShardLease> {
        if !self.try_acquire(shard_id) {
            return None;
        }
        Some(ShardLease {
            registry: Arc::clone(self),
            shard_id: shard_id.to_string(),
        })
    }

    pub fn contains(&self, shard_id: &str) -> bool {
        self.lock().contains(shard_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Owned shard IDs, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }
}

// ═══════════════════════════════════════════════════════════════
//  ShardLease
// ═══════════════════════════════════════════════════════════════

/// Ownership of one registry entry. Released when dropped, so a consumer
/// task gives its shard back on every exit path, panics included.
#[derive(Debug)]
pub struct ShardLease {
    registry: Arc<ShardRegistry>,
    shard_id: String,
}

impl ShardLease {
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }
}

impl Drop for ShardLease {
    fn drop(&mut self) {
        self.registry.release(&self.shard_id);
    }
}
