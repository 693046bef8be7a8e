//! Session-local cache of decryption grants.
//!
//! One slot per (identity, location, handle) triple. Each slot has its own
//! async mutex, so a caller can hold a slot across a signing round-trip
//! without blocking any other triple. The outer map lock is synchronous and
//! never held across an await.
//!
//! Expiry is lazy: an expired grant stays in its slot and is reported as
//! [`CacheLookup::Stale`] until it is replaced. A slot left empty is removed
//! from the map once its last holder lets go of it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::grant::{DecryptionGrant, GrantKey};

/// A cache slot: the current grant for one triple, if any.
pub type GrantSlot = Arc<AsyncMutex<Option<DecryptionGrant>>>;

/// Outcome of looking up a triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A grant that may be used right now.
    Fresh(DecryptionGrant),
    /// A grant exists but has expired.
    Stale,
    /// No grant was ever stored for this triple.
    Missing,
}

impl CacheLookup {
    /// Classify a slot's contents at `now`.
    pub fn classify(entry: Option<&DecryptionGrant>, now: i64) -> Self {
        match entry {
            Some(grant) if grant.is_expired(now) => CacheLookup::Stale,
            Some(grant) => CacheLookup::Fresh(grant.clone()),
            None => CacheLookup::Missing,
        }
    }
}

/// A slot checked out of the cache.
///
/// Dropping the lease removes the slot from the cache if it is empty and no
/// one else holds it.
pub struct SlotLease<'a> {
    cache: &'a AuthorizationCache,
    key: GrantKey,
    slot: GrantSlot,
}

impl SlotLease<'_> {
    /// Wait for exclusive access to the slot's grant.
    pub async fn lock(&self) -> AsyncMutexGuard<'_, Option<DecryptionGrant>> {
        self.slot.lock().await
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.cache.release(&self.key, &self.slot);
    }
}

/// Grants issued during this session, keyed by triple.
#[derive(Default)]
pub struct AuthorizationCache {
    slots: Mutex<HashMap<GrantKey, GrantSlot>>,
}

impl AuthorizationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out the slot for `key`, creating it empty on first use.
    pub fn checkout(&self, key: &GrantKey) -> SlotLease<'_> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        SlotLease {
            cache: self,
            key: *key,
            slot: Arc::clone(slots.entry(*key).or_default()),
        }
    }

    /// Look up the grant for `key` at `now`.
    pub async fn lookup(&self, key: &GrantKey, now: i64) -> CacheLookup {
        let Some(slot) = self.existing(key) else {
            return CacheLookup::Missing;
        };
        let entry = slot.lock().await;
        CacheLookup::classify(entry.as_ref(), now)
    }

    /// Store a grant under its own triple, replacing any prior grant.
    pub async fn insert(&self, grant: DecryptionGrant) {
        let lease = self.checkout(&grant.key());
        *lease.lock().await = Some(grant);
    }

    /// Drop the grant for `key`. Returns the grant that was removed.
    pub async fn remove(&self, key: &GrantKey) -> Option<DecryptionGrant> {
        let slot = self.existing(key)?;
        let removed = slot.lock().await.take();
        self.release(key, &slot);
        removed
    }

    /// Number of triples that currently hold a grant, fresh or stale.
    pub async fn len(&self) -> usize {
        let slots: Vec<GrantSlot> = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.values().cloned().collect()
        };

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Whether no triple holds a grant.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of slots in the map, empty or not.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop `key`'s slot if it is empty and `held` is the caller's copy of it.
    fn release(&self, key: &GrantKey, held: &GrantSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get(key) else {
            return;
        };
        // Only the map and the caller hold it; new holders need the map lock.
        let unshared = Arc::ptr_eq(slot, held) && Arc::strong_count(slot) == 2;
        if unshared && matches!(slot.try_lock(), Ok(entry) if entry.is_none()) {
            slots.remove(key);
        }
    }

    fn existing(&self, key: &GrantKey) -> Option<GrantSlot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }
}
