use crate::models::types::ChestId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<ChestId, Arc<Mutex<()>>>;

/// Per-chest mutual exclusion for load-modify-save sequences.
///
/// Writers on different chests never contend; writers on the same chest queue up.
/// An entry only lives while someone holds or waits for it.
#[derive(Default)]
pub struct ChestLocks {
    locks: Arc<LockMap>,
}

/// Held for the duration of a mutation; releases every lock on drop.
pub struct ChestGuard {
    locks: Arc<LockMap>,
    ids: Vec<ChestId>,
    held: Vec<OwnedMutexGuard<()>>,
}

impl Drop for ChestGuard {
    fn drop(&mut self) {
        self.held.clear();
        for id in &self.ids {
            // the map's own handle is the last one: nobody holds or waits for this chest
            self.locks.remove_if(id, |_, m| Arc::strong_count(m) == 1);
        }
    }
}

impl ChestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: ChestId) -> Arc<Mutex<()>> {
        // The map shard guard must be released before awaiting on the mutex
        self.locks.entry(id).or_default().value().clone()
    }

    pub async fn acquire(&self, id: ChestId) -> ChestGuard {
        let held = self.lock_for(id).lock_owned().await;
        ChestGuard {
            locks: self.locks.clone(),
            ids: vec![id],
            held: vec![held],
        }
    }

    /// Locks two distinct chests, always in ascending id order.
    pub async fn acquire_pair(&self, a: ChestId, b: ChestId) -> ChestGuard {
        if a == b {
            return self.acquire(a).await;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };

        let first_lock = self.lock_for(first);
        let second_lock = self.lock_for(second);
        let g1 = first_lock.lock_owned().await;
        let g2 = second_lock.lock_owned().await;
        ChestGuard {
            locks: self.locks.clone(),
            ids: vec![first, second],
            held: vec![g1, g2],
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
