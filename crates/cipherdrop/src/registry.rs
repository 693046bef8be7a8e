//! The registry: one ciphertext per identity, in arrival order.

use tracing::{debug, info, warn};

use cipherdrop_core::{
    input_statement, CiphertextHandle, Ed25519Signature, Identity, RegistrationProof,
    RegistryEntry, StorageLocation,
};
use cipherdrop_store::{CommitResult, RegistryStore};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

/// A registry bound to one storage location.
///
/// Registration is first-write-wins: once an identity has an entry it can
/// never be replaced, and its insertion index never changes.
pub struct Registry<S: RegistryStore> {
    store: S,
    config: RegistryConfig,
}

impl<S: RegistryStore> Registry<S> {
    /// Create a registry over `store`.
    pub fn new(store: S, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Where this registry lives.
    pub fn location(&self) -> StorageLocation {
        self.config.location
    }

    /// Get the configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `handle` as `identity`'s ciphertext.
    ///
    /// Returns the insertion index. Fails with `AlreadyRegistered` if the
    /// identity has an entry (including when a concurrent call wins the
    /// commit), and with `InvalidProof` if `proof` does not attest this
    /// exact (location, identity, handle).
    pub async fn register(
        &self,
        identity: &Identity,
        handle: &CiphertextHandle,
        proof: &RegistrationProof,
    ) -> Result<u64> {
        if let Some(existing) = self.store.get_entry(identity).await? {
            debug!(%identity, "rejected duplicate registration");
            return Err(RegistryError::AlreadyRegistered {
                identity: *identity,
                insertion_index: existing.insertion_index,
            });
        }

        if let Err(err) = self.verify_proof(identity, handle, proof) {
            warn!(%identity, location = %self.config.location, "rejected input proof");
            return Err(err);
        }

        match self.store.commit_registration(identity, handle).await? {
            CommitResult::Committed(insertion_index) => {
                info!(%identity, insertion_index, "registered ciphertext");
                Ok(insertion_index)
            }
            CommitResult::AlreadyRegistered { existing } => {
                debug!(%identity, "lost registration race");
                Err(RegistryError::AlreadyRegistered {
                    identity: *identity,
                    insertion_index: existing.insertion_index,
                })
            }
        }
    }

    /// Check that `proof` is a trusted verifier's attestation of `handle` for
    /// `identity` at this location.
    pub fn verify_proof(
        &self,
        identity: &Identity,
        handle: &CiphertextHandle,
        proof: &RegistrationProof,
    ) -> Result<()> {
        if handle.is_zero() {
            return Err(RegistryError::InvalidProof("handle is zero".into()));
        }

        let signature = Ed25519Signature::from_slice(proof.as_bytes())
            .map_err(|e| RegistryError::InvalidProof(e.to_string()))?;
        let statement = input_statement(&self.config.location, identity, handle)?;

        let attested = self
            .config
            .trusted_input_verifiers
            .iter()
            .any(|verifier| verifier.verify(&statement, &signature).is_ok());

        if attested {
            Ok(())
        } else {
            Err(RegistryError::InvalidProof(
                "not signed by a trusted input verifier".into(),
            ))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The handle registered by `identity`, if any.
    pub async fn read(&self, identity: &Identity) -> Result<Option<CiphertextHandle>> {
        Ok(self.entry(identity).await?.map(|entry| entry.handle))
    }

    /// Whether `identity` has registered.
    pub async fn is_registered(&self, identity: &Identity) -> Result<bool> {
        Ok(self.read(identity).await?.is_some())
    }

    /// The full entry for `identity`, if any.
    pub async fn entry(&self, identity: &Identity) -> Result<Option<RegistryEntry>> {
        Ok(self.store.get_entry(identity).await?)
    }

    /// All registered identities in insertion order.
    pub async fn list_submitters(&self) -> Result<Vec<Identity>> {
        Ok(self.store.list_submitters().await?)
    }

    /// Number of registered identities.
    pub async fn submitter_count(&self) -> Result<u64> {
        Ok(self.store.count().await?)
    }
}
