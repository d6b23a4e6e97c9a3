//! In-memory per-connector leases.
//!
//! A lease prevents two syncs of the same account from running at once.
//! Leases expire after a TTL so a lost guard cannot block an account forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use jobsync_entity::sync::ConnectorKey;

#[derive(Debug, Clone, Copy)]
struct Lease {
    acquired_at: Instant,
    token: u64,
}

/// Table of held leases keyed by account connector key.
#[derive(Debug)]
pub struct LeaseTable {
    leases: DashMap<ConnectorKey, Lease>,
    ttl: Duration,
    next_token: AtomicU64,
}

impl LeaseTable {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            leases: DashMap::new(),
            ttl,
            next_token: AtomicU64::new(1),
        })
    }

    /// Take the lease for `key`, or `None` if a live lease is held.
    ///
    /// An expired lease is taken over.
    pub fn try_acquire(self: &Arc<Self>, key: &ConnectorKey) -> Option<LeaseGuard> {
        let lease = Lease {
            acquired_at: Instant::now(),
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
        };
        match self.leases.entry(key.clone()) {
            Entry::Occupied(mut held) => {
                if held.get().acquired_at.elapsed() < self.ttl {
                    return None;
                }
                tracing::warn!(connector = %key, "Taking over expired sync lease");
                held.insert(lease);
            }
            Entry::Vacant(slot) => {
                slot.insert(lease);
            }
        }
        Some(LeaseGuard {
            table: Arc::clone(self),
            key: key.clone(),
            token: lease.token,
        })
    }

    /// Whether a live lease is held for `key`.
    pub fn is_held(&self, key: &ConnectorKey) -> bool {
        self.leases
            .get(key)
            .is_some_and(|lease| lease.acquired_at.elapsed() < self.ttl)
    }
}

/// Releases its lease on drop.
#[derive(Debug)]
pub struct LeaseGuard {
    table: Arc<LeaseTable>,
    key: ConnectorKey,
    token: u64,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        // Leave a lease that was taken over by someone else alone.
        self.table
            .leases
            .remove_if(&self.key, |_, lease| lease.token == self.token);
    }
}
