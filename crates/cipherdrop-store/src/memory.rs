//! In-memory implementation of the RegistryStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use cipherdrop_core::{CiphertextHandle, Identity, RegistryEntry};

use crate::error::{Result, StoreError};
use crate::traits::{CommitResult, RegistryStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock: a
/// commit holds the write lock across check, insert and append, which is
/// the atomic commit the trait requires.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Entries indexed by identity.
    entries: HashMap<Identity, RegistryEntry>,

    /// Submitter sequence; position == insertion index.
    submitters: Vec<Identity>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn commit_registration(
        &self,
        identity: &Identity,
        handle: &CiphertextHandle,
    ) -> Result<CommitResult> {
        let mut inner = self.write()?;

        if let Some(existing) = inner.entries.get(identity) {
            return Ok(CommitResult::AlreadyRegistered {
                existing: existing.clone(),
            });
        }

        let insertion_index = inner.submitters.len() as u64;
        inner.entries.insert(
            *identity,
            RegistryEntry {
                identity: *identity,
                handle: *handle,
                insertion_index,
            },
        );
        inner.submitters.push(*identity);

        debug!(%identity, insertion_index, "committed registration");
        Ok(CommitResult::Committed(insertion_index))
    }

    async fn get_entry(&self, identity: &Identity) -> Result<Option<RegistryEntry>> {
        Ok(self.read()?.entries.get(identity).cloned())
    }

    async fn list_submitters(&self) -> Result<Vec<Identity>> {
        Ok(self.read()?.submitters.clone())
    }

    async fn submitter_at(&self, index: u64) -> Result<Option<Identity>> {
        let inner = self.read()?;
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| inner.submitters.get(i).copied()))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.submitters.len() as u64)
    }
}
