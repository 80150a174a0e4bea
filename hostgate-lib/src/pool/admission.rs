use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pool::{HostKey, Limit, PoolConfig};
use crate::types::Rejection;

/// Decides whether a new connection may be opened.
///
/// The controller keeps one counter per host and one across all hosts.
/// Admission is a non-blocking check: when a ceiling is reached the caller is
/// told so immediately and nothing is queued.
///
/// # Architecture
///
/// - Per-host counts live in a [`DashMap`] and only change while that host's
///   entry is locked. The global count is an atomic updated with
///   compare-and-swap, so concurrent admissions never overshoot a ceiling.
/// - The per-host ceiling is checked first, then the global one is reserved,
///   both under the host's entry lock. The host count is only raised once
///   both succeed, so a failed global check is never visible as a full host.
/// - Hosts without leased slots are removed from the map.
/// - An [`AdmissionPermit`] owns one slot of both counters and hands it back
///   when dropped
#[derive(Debug)]
pub struct AdmissionController {
    total: AtomicUsize,
    per_host: DashMap<HostKey, usize>,
    total_limit: Limit,
    config: Arc<PoolConfig>,
}

impl AdmissionController {
    /// Create a controller enforcing the ceilings of `config`
    #[must_use]
    pub fn new(config: Arc<PoolConfig>) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicUsize::new(0),
            per_host: DashMap::new(),
            total_limit: config.total_limit(),
            config,
        })
    }

    /// Try to reserve a connection slot for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::TooManyConnectionsPerHost`] if the host's ceiling
    /// is reached, or [`Rejection::TooManyConnections`] if the global one is.
    /// A rejected call leaves every counter unchanged.
    pub fn try_admit(self: &Arc<Self>, key: &HostKey) -> Result<AdmissionPermit, Rejection> {
        let host_limit = self.config.host_limit(key);

        let entry = self.per_host.entry(key.clone());
        let leased = match &entry {
            Entry::Occupied(occupied) => *occupied.get(),
            Entry::Vacant(_) => 0,
        };

        if !host_limit.allows(leased) {
            return Err(Rejection::TooManyConnectionsPerHost);
        }

        if !try_increment(&self.total, self.total_limit) {
            return Err(Rejection::TooManyConnections);
        }

        *entry.or_insert(0) += 1;

        Ok(AdmissionPermit {
            controller: Arc::clone(self),
            key: key.clone(),
        })
    }

    /// Number of slots currently leased for `key`
    #[must_use]
    pub fn leased(&self, key: &HostKey) -> usize {
        self.per_host.get(key).map_or(0, |leased| *leased)
    }

    /// Number of slots currently leased across all hosts
    #[must_use]
    pub fn total_leased(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// A point-in-time copy of all counters
    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let per_host = self
            .per_host
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        AdmissionSnapshot {
            total: self.total_leased(),
            per_host,
        }
    }

    /// Number of hosts with at least one leased slot
    #[must_use]
    pub fn tracked_hosts(&self) -> usize {
        self.per_host.len()
    }

    fn release(&self, key: &HostKey) {
        match self.per_host.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > 1 {
                    *occupied.get_mut() -= 1;
                } else {
                    occupied.remove();
                }
                decrement(&self.total, key);
            }
            Entry::Vacant(_) => underflow(key),
        }
    }
}

/// Increment `counter` unless that would exceed `limit`
fn try_increment(counter: &AtomicUsize, limit: Limit) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            limit.allows(current).then(|| current + 1)
        })
        .is_ok()
}

/// Decrement `counter`, refusing to wrap below zero
fn decrement(counter: &AtomicUsize, key: &HostKey) {
    let result = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        current.checked_sub(1)
    });

    if result.is_err() {
        underflow(key);
    }
}

fn underflow(key: &HostKey) {
    debug_assert!(false, "admission counter underflow for {key}");
    log::error!("Admission counter underflow for {key}; released more slots than leased");
}

/// One leased connection slot.
///
/// The slot is returned to the [`AdmissionController`] exactly once, when the
/// permit is dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    key: HostKey,
}

impl AdmissionPermit {
    /// The host this slot was leased for
    #[must_use]
    pub const fn key(&self) -> &HostKey {
        &self.key
    }

    /// Return the slot now. Equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release(&self.key);
    }
}

/// Counter values taken by [`AdmissionController::snapshot`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionSnapshot {
    /// Leased slots across all hosts
    pub total: usize,
    /// Leased slots per host. Hosts without leases are omitted.
    pub per_host: HashMap<HostKey, usize>,
}

impl AdmissionSnapshot {
    /// The global counter equals the sum of the per-host counters.
    ///
    /// Only meaningful while no admissions or releases are in flight.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.per_host.values().sum::<usize>() == self.total
    }
}
