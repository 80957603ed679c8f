/*!
 * FD Registry
 * Process-wide set of descriptors owned by the async backend
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

use crate::core::types::Fd;

/// Thread-safe set of backend-owned file descriptors.
///
/// A descriptor is a member iff the most recent bridged open that
/// produced it has not yet been matched by a successful bridged close.
/// Only those two completions mutate membership; every FD-routed call
/// reads it to decide between backend and fallback.
pub struct FdRegistry {
    fds: Arc<DashMap<Fd, (), RandomState>>,
}

impl FdRegistry {
    pub fn new() -> Self {
        Self {
            fds: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Mark a descriptor as backend-owned
    pub fn insert(&self, fd: Fd) {
        self.fds.insert(fd, ());
    }

    /// Forget a descriptor; no-op if absent
    pub fn remove(&self, fd: Fd) {
        self.fds.remove(&fd);
    }

    /// Membership test used to route FD-based calls
    pub fn contains(&self, fd: Fd) -> bool {
        self.fds.contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}

impl Default for FdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FdRegistry {
    fn clone(&self) -> Self {
        Self {
            fds: Arc::clone(&self.fds),
        }
    }
}
