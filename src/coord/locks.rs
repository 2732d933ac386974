//! Per-resource lock table.
//!
//! At most one holder per key, and a FIFO wait list per key so that requests
//! touching the same resource run in admission order regardless of priority.
//! Mutated only inside the scheduler task, so no interior locking is needed.

use crate::coord::types::{LockEntry, RequestId, ResourceKey};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct LockTable {
    holders: HashMap<ResourceKey, RequestId>,
    waiters: HashMap<ResourceKey, VecDeque<RequestId>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the wait list of every key at admission time. Wait-list position
    /// is what serializes same-resource requests in admission order, with
    /// one exception: `ahead_of` lists requests that depend on this one, and
    /// the new entry is inserted before the first of them so that wait-list
    /// order never contradicts the dependency graph.
    pub fn register(&mut self, keys: &[ResourceKey], id: RequestId, ahead_of: &[RequestId]) {
        for key in keys {
            let queue = self.waiters.entry(key.clone()).or_default();
            let position = queue
                .iter()
                .position(|waiting| ahead_of.contains(waiting))
                .unwrap_or(queue.len());
            queue.insert(position, id);
        }
    }

    /// Acquire every key for `id`, all-or-nothing: each key must be unheld
    /// (or already held by `id`) and `id` must be at the front of its wait
    /// list. Keys are expected in canonical sorted order (enforced by
    /// `HookRequest::from_spec`).
    pub fn try_acquire_all(&mut self, keys: &[ResourceKey], id: RequestId) -> bool {
        let blocked = keys.iter().any(|k| {
            if self.holders.get(k).is_some_and(|&h| h != id) {
                return true;
            }
            self.waiters
                .get(k)
                .and_then(|q| q.front())
                .is_some_and(|&front| front != id)
        });
        if blocked {
            return false;
        }
        for key in keys {
            self.holders.insert(key.clone(), id);
            if let Some(queue) = self.waiters.get_mut(key) {
                if queue.front() == Some(&id) {
                    queue.pop_front();
                }
                if queue.is_empty() {
                    self.waiters.remove(key);
                }
            }
        }
        true
    }

    /// Release every key held by `id`.
    pub fn release_all(&mut self, id: RequestId) {
        self.holders.retain(|_, holder| *holder != id);
    }

    /// Drop `id` from every wait list. Needed when a registered request
    /// terminates without ever acquiring (rejection at shutdown, reset).
    pub fn forget(&mut self, id: RequestId) {
        self.waiters.retain(|_, queue| {
            queue.retain(|&waiting| waiting != id);
            !queue.is_empty()
        });
    }

    pub fn holder(&self, key: &ResourceKey) -> Option<RequestId> {
        self.holders.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn clear(&mut self) {
        self.holders.clear();
        self.waiters.clear();
    }

    pub fn snapshot(&self) -> Vec<LockEntry> {
        let mut entries: Vec<LockEntry> = self
            .holders
            .iter()
            .map(|(key, &holder)| LockEntry {
                resource: key.to_string(),
                holder,
            })
            .collect();
        entries.sort_by(|a, b| a.resource.cmp(&b.resource));
        entries
    }
}
