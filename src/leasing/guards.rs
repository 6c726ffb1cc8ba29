//! Per-lease operation guards.
//!
//! Operations on the same lease are serialized in-process by a keyed async
//! mutex. Explicit operations (renew, revoke) register their intent before
//! waiting for the lock; passive expiry never waits and backs off whenever an
//! explicit operation is queued or running, so a caller's revoke always beats
//! the sweeper. The version check in the lease store covers other processes.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::LeaseId;

#[derive(Debug, Default)]
pub struct LeaseGuards {
    locks: DashMap<LeaseId, Arc<Mutex<()>>>,
    pending_explicit: DashMap<LeaseId, usize>,
}

/// Held for the duration of one lease operation
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    guards: &'a LeaseGuards,
    lease_id: LeaseId,
    permit: Option<OwnedMutexGuard<()>>,
    _intent: Option<ExplicitIntent<'a>>,
}

/// Marks an explicit operation as pending until dropped
#[derive(Debug)]
struct ExplicitIntent<'a> {
    guards: &'a LeaseGuards,
    lease_id: LeaseId,
}

impl LeaseGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, lease_id: &LeaseId) -> Arc<Mutex<()>> {
        self.locks.entry(lease_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Wait for exclusive access on behalf of a caller
    pub async fn explicit(&self, lease_id: &LeaseId) -> LeaseGuard<'_> {
        *self.pending_explicit.entry(lease_id.clone()).or_insert(0) += 1;
        let intent = ExplicitIntent { guards: self, lease_id: lease_id.clone() };

        let permit = self.lock_for(lease_id).lock_owned().await;
        LeaseGuard { guards: self, lease_id: lease_id.clone(), permit: Some(permit), _intent: Some(intent) }
    }

    /// Take exclusive access for passive expiry, or `None` if anyone else wants the lease
    pub fn try_passive(&self, lease_id: &LeaseId) -> Option<LeaseGuard<'_>> {
        if self.explicit_pending(lease_id) {
            return None;
        }
        let permit = self.lock_for(lease_id).try_lock_owned().ok();
        let guard = LeaseGuard { guards: self, lease_id: lease_id.clone(), permit, _intent: None };
        guard.permit.is_some().then_some(guard)
    }

    /// Whether an explicit operation is waiting for or holding this lease
    pub fn explicit_pending(&self, lease_id: &LeaseId) -> bool {
        self.pending_explicit.get(lease_id).map(|count| *count > 0).unwrap_or(false)
    }

    /// Number of leases with live lock entries
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    fn release_intent(&self, lease_id: &LeaseId) {
        if let Entry::Occupied(mut entry) = self.pending_explicit.entry(lease_id.clone()) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    fn release_lock(&self, lease_id: &LeaseId) {
        // Only the map holds the mutex once every guard for it is gone
        self.locks.remove_if(lease_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        self.guards.release_lock(&self.lease_id);
    }
}

impl Drop for ExplicitIntent<'_> {
    fn drop(&mut self) {
        self.guards.release_intent(&self.lease_id);
    }
}
