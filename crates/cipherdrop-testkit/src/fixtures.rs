//! Test fixtures and helpers.
//!
//! A [`TestFixture`] wires a registry, the local coprocessor, and the local
//! chain together for a fixed set of parties, so a test can go straight to
//! registering and decrypting.

use std::sync::Arc;

use cipherdrop::{
    AuthorizerConfig, Confirmation, DecryptionAuthorizer, ExecutionError, KeypairSigner,
    LocalChain, LocalCoprocessor, OrchestratorConfig, RegisterCall, Registry, RegistryConfig,
    RegistrationOrchestrator, TransactionExecutor,
};
use cipherdrop_authz::{EncryptionKey, Signer, X25519StaticSecret};
use thiserror::Error;
use cipherdrop_core::{
    CiphertextCodec, CiphertextHandle, CodecError, FheType, Identity, Keypair, StorageLocation,
};
use cipherdrop_store::{MemoryStore, RegistryStore};

use crate::doubles::ManualClock;

/// Orchestrator type produced by a fixture.
pub type FixtureOrchestrator<S> =
    RegistrationOrchestrator<LocalCoprocessor, LocalChain<S>, LocalChain<S>>;

/// A registry with its backend and a set of deterministic parties.
pub struct TestFixture<S: RegistryStore = MemoryStore> {
    pub parties: Vec<Keypair>,
    pub location: StorageLocation,
    pub clock: Arc<ManualClock>,
    pub coprocessor: Arc<LocalCoprocessor>,
    pub registry: Arc<Registry<S>>,
    pub chain: Arc<LocalChain<S>>,
}

impl TestFixture<MemoryStore> {
    /// Two parties over an in-memory store.
    pub fn new() -> Self {
        Self::with_parties(2)
    }

    /// `count` parties over an in-memory store.
    pub fn with_parties(count: usize) -> Self {
        Self::with_store(MemoryStore::new(), count)
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RegistryStore> TestFixture<S> {
    /// `count` parties over the given store.
    ///
    /// Party `i` has the keypair seeded with `[i + 1; 32]`.
    pub fn with_store(store: S, count: usize) -> Self {
        let parties: Vec<Keypair> = (0..count).map(party_keypair).collect();
        let deployer = Keypair::from_seed(&[0xde; 32]);
        let location = StorageLocation::derive(&deployer.identity(), "EncryptedDrop");

        let clock = Arc::new(ManualClock::default());
        let coprocessor = Arc::new(
            LocalCoprocessor::with_keys(
                Keypair::from_seed(&[0xc0; 32]),
                EncryptionKey::from_bytes([0xc1; 32]),
            )
            .with_clock(clock.clone()),
        );
        let config = RegistryConfig::new(location).with_verifier(coprocessor.verifier_identity());
        let registry = Arc::new(Registry::new(store, config));
        let chain = Arc::new(LocalChain::new(
            Arc::clone(&registry),
            Arc::clone(&coprocessor),
        ));

        Self {
            parties,
            location,
            clock,
            coprocessor,
            registry,
            chain,
        }
    }

    /// The identity of party `i`.
    pub fn identity(&self, i: usize) -> Identity {
        self.parties[i].identity()
    }

    /// A signer holding every party's key.
    pub fn signer(&self) -> KeypairSigner {
        self.parties.iter().cloned().collect()
    }

    /// An orchestrator over this fixture's backend.
    pub fn orchestrator(&self, config: OrchestratorConfig) -> FixtureOrchestrator<S> {
        RegistrationOrchestrator::new(
            Arc::clone(&self.coprocessor),
            Arc::clone(&self.chain),
            Arc::clone(&self.chain),
            self.location,
            config,
        )
    }

    /// An authorizer over this fixture's coprocessor and clock.
    pub fn authorizer<G: Signer>(
        &self,
        signer: Arc<G>,
        config: AuthorizerConfig,
    ) -> DecryptionAuthorizer<G, LocalCoprocessor> {
        DecryptionAuthorizer::new(signer, Arc::clone(&self.coprocessor), config)
            .with_clock(self.clock.clone())
            .with_session_secret(X25519StaticSecret::generate())
    }

    /// Encode `plaintext` for party `i` and push it through the chain.
    ///
    /// Returns the handle and the confirmation.
    pub async fn register(
        &self,
        i: usize,
        plaintext: u64,
    ) -> Result<(CiphertextHandle, Confirmation), FixtureError> {
        let identity = self.identity(i);
        let input = self
            .coprocessor
            .encode(plaintext, FheType::Uint32, &self.location, &identity)
            .await?;

        let call = RegisterCall {
            location: self.location,
            identity,
            handle: input.handle,
            proof: input.proof,
        };
        let receipt = self.chain.submit(&call).await?;
        let confirmation = self.chain.confirm(&receipt).await?;
        Ok((input.handle, confirmation))
    }
}

/// Failures from fixture helpers.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),
}

/// Deterministic keypair for party `i`.
pub fn party_keypair(i: usize) -> Keypair {
    Keypair::from_seed(&[(i as u8).wrapping_add(1); 32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parties_are_distinct() {
        let fixture = TestFixture::with_parties(3);

        assert_ne!(fixture.identity(0), fixture.identity(1));
        assert_ne!(fixture.identity(1), fixture.identity(2));
        assert_eq!(fixture.identity(0), party_keypair(0).identity());
    }

    #[tokio::test]
    async fn test_fixture_register() {
        let fixture = TestFixture::new();

        let (handle, confirmation) = fixture.register(0, 1).await.unwrap();

        assert_eq!(confirmation, Confirmation::Confirmed { insertion_index: 0 });
        assert_eq!(
            fixture.registry.read(&fixture.identity(0)).await.unwrap(),
            Some(handle)
        );
    }
}
