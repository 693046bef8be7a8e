//! Store trait: the transactional key-value interface behind a registry.
//!
//! A store holds the registrations of one storage location: a map from
//! identity to entry plus the append-only submitter sequence. Implementations
//! include SQLite (persistent) and in-memory (for tests).

use async_trait::async_trait;
use cipherdrop_core::{CiphertextHandle, Identity, RegistryEntry};

use crate::error::Result;

/// Result of committing a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// The registration was committed at this insertion index.
    Committed(u64),
    /// The identity already has an entry; nothing was written.
    AlreadyRegistered {
        /// The entry that won.
        existing: RegistryEntry,
    },
}

/// The RegistryStore trait: async interface for registration persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **First write wins**: committing for an identity that already has an
///   entry returns `AlreadyRegistered` and leaves the store unchanged.
/// - **Atomic commit**: the entry and its submitter-sequence append become
///   visible together or not at all. Concurrent commits for the same
///   identity resolve to exactly one `Committed`.
/// - **Dense indices**: insertion indices start at 0 and have no gaps, so
///   `list_submitters()[i]` is the identity committed with index `i`.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Atomically insert an entry and append its identity to the sequence.
    async fn commit_registration(
        &self,
        identity: &Identity,
        handle: &CiphertextHandle,
    ) -> Result<CommitResult>;

    /// Get the entry for an identity.
    async fn get_entry(&self, identity: &Identity) -> Result<Option<RegistryEntry>>;

    /// All submitters in insertion order.
    async fn list_submitters(&self) -> Result<Vec<Identity>>;

    /// The submitter with a given insertion index.
    async fn submitter_at(&self, index: u64) -> Result<Option<Identity>>;

    /// Number of committed registrations.
    async fn count(&self) -> Result<u64>;
}

/// Extension trait for common read patterns.
pub trait StoreExt: RegistryStore {
    /// The stored handle for an identity.
    fn get_handle(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<Option<CiphertextHandle>>> + Send;

    /// Whether an identity has an entry.
    fn is_registered(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: RegistryStore + ?Sized> StoreExt for S {
    async fn get_handle(&self, identity: &Identity) -> Result<Option<CiphertextHandle>> {
        Ok(self.get_entry(identity).await?.map(|entry| entry.handle))
    }

    async fn is_registered(&self, identity: &Identity) -> Result<bool> {
        Ok(self.get_entry(identity).await?.is_some())
    }
}
