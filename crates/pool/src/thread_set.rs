//! Rendezvous requiring one visit from each of N distinct threads.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Barrier that opens once `required_count` distinct tokens have visited.
///
/// Visiting twice with the same token is a contract violation and panics.
pub struct ThreadSet<K = ThreadId> {
    required: usize,
    visited: Mutex<HashSet<K>>,
    complete: Condvar,
}

impl<K: Eq + Hash> ThreadSet<K> {
    pub fn new(required: usize) -> Self {
        Self {
            required,
            visited: Mutex::new(HashSet::with_capacity(required)),
            complete: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<K>> {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a visit by `token` and return its 1-based arrival index.
    ///
    /// # Panics
    ///
    /// If `token` already visited.
    pub fn visit(&self, token: K) -> usize {
        let mut visited = self.lock();
        let fresh = visited.insert(token);
        let arrived = visited.len();
        drop(visited);

        assert!(fresh, "thread set visited twice by the same token");
        if arrived >= self.required {
            self.complete.notify_all();
        }
        arrived
    }

    /// Block until `required_count` distinct tokens have visited.
    pub fn wait(&self) {
        let mut visited = self.lock();
        while visited.len() < self.required {
            visited = self
                .complete
                .wait(visited)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn required_count(&self) -> usize {
        self.required
    }

    /// Tokens that have visited so far.
    pub fn arrived(&self) -> usize {
        self.lock().len()
    }
}

impl ThreadSet<ThreadId> {
    /// Visit with the calling thread's id.
    pub fn visit_current(&self) -> usize {
        self.visit(thread::current().id())
    }
}

impl<K> fmt::Debug for ThreadSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrived = self
            .visited
            .lock()
            .map(|v| v.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());
        f.debug_struct("ThreadSet")
            .field("required", &self.required)
            .field("arrived", &arrived)
            .finish()
    }
}
