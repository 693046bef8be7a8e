//! In-process reference backend.
//!
//! [`LocalCoprocessor`] plays the encryption network: it encrypts plaintexts
//! under a network key it never shares, attests the resulting handles with
//! its input-verifier key, keeps an access list, and decrypts for grants
//! whose signer is on the list. [`LocalChain`] plays the execution layer over
//! a [`Registry`], granting the registrant access to its handle on commit.
//!
//! Nothing here is homomorphic. The backend exists so the full
//! register-then-decrypt flow can run in one process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use cipherdrop_authz::{
    Clock, DecryptionGrant, DecryptionService, EncryptionKey, EncryptionNonce, SealedValue,
    ServiceError, SystemClock,
};
use cipherdrop_core::{
    input_statement, Blake3Hash, CiphertextCodec, CiphertextHandle, CodecError, EncryptedInput,
    FheType, Identity, Keypair, RegistrationProof, StorageLocation,
};
use cipherdrop_store::RegistryStore;

use crate::capability::{
    Confirmation, FailureReason, RegisterCall, StateReader, TransactionExecutor, TxReceipt,
};
use crate::error::{ExecutionError, RegistryError};
use crate::registry::Registry;

const HANDLE_CONTEXT: &str = "cipherdrop-v1 local handle";
const TX_CONTEXT: &str = "cipherdrop-v1 local transaction";

struct StoredCiphertext {
    location: StorageLocation,
    owner: Identity,
    nonce: EncryptionNonce,
    ciphertext: Vec<u8>,
}

/// A stand-in for the encryption network.
///
/// Every encoding is stored until its registration is rejected. Encodings
/// that are never submitted at all stay stored for the life of the
/// coprocessor.
pub struct LocalCoprocessor {
    verifier: Keypair,
    network_key: EncryptionKey,
    clock: Arc<dyn Clock>,
    ciphertexts: RwLock<HashMap<CiphertextHandle, StoredCiphertext>>,
    acl: RwLock<HashSet<(CiphertextHandle, Identity)>>,
}

impl LocalCoprocessor {
    /// Create a coprocessor with fresh keys.
    pub fn new() -> Self {
        Self::with_keys(Keypair::generate(), EncryptionKey::generate())
    }

    /// Create a coprocessor with the given verifier and network keys.
    pub fn with_keys(verifier: Keypair, network_key: EncryptionKey) -> Self {
        Self {
            verifier,
            network_key,
            clock: Arc::new(SystemClock),
            ciphertexts: RwLock::new(HashMap::new()),
            acl: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the clock used to check grant expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The key registries must trust to accept this coprocessor's proofs.
    pub fn verifier_identity(&self) -> Identity {
        self.verifier.identity()
    }

    /// Let `identity` decrypt `handle`.
    pub fn allow(&self, handle: &CiphertextHandle, identity: &Identity) {
        let mut acl = self.acl.write().unwrap_or_else(|e| e.into_inner());
        acl.insert((*handle, *identity));
    }

    /// Whether `identity` may decrypt `handle`.
    pub fn is_allowed(&self, handle: &CiphertextHandle, identity: &Identity) -> bool {
        let acl = self.acl.read().unwrap_or_else(|e| e.into_inner());
        acl.contains(&(*handle, *identity))
    }

    /// Forget `handle`'s ciphertext after `owner`'s registration of it failed.
    ///
    /// Does nothing if `owner` did not encode it or someone may decrypt it.
    /// Returns whether the ciphertext was dropped.
    pub fn discard(&self, handle: &CiphertextHandle, owner: &Identity) -> bool {
        let acl = self.acl.read().unwrap_or_else(|e| e.into_inner());
        if acl.iter().any(|(allowed, _)| allowed == handle) {
            return false;
        }
        let mut ciphertexts = self.ciphertexts.write().unwrap_or_else(|e| e.into_inner());
        match ciphertexts.get(handle) {
            Some(stored) if stored.owner == *owner => {
                ciphertexts.remove(handle);
                debug!(identity = %owner, %handle, "discarded unregistered ciphertext");
                true
            }
            _ => false,
        }
    }

    /// Number of ciphertexts currently stored.
    pub fn ciphertext_count(&self) -> usize {
        self.ciphertexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn plaintext(&self, grant: &DecryptionGrant) -> Result<u64, ServiceError> {
        let ciphertexts = self.ciphertexts.read().unwrap_or_else(|e| e.into_inner());
        let stored = ciphertexts.get(&grant.handle).ok_or(ServiceError::Denied)?;
        if stored.location != grant.storage_location {
            return Err(ServiceError::Denied);
        }

        let bytes = self
            .network_key
            .decrypt(&stored.ciphertext, &stored.nonce)
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        let bytes: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ServiceError::Unavailable("corrupt ciphertext".into()))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl Default for LocalCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CiphertextCodec for LocalCoprocessor {
    async fn encode(
        &self,
        plaintext: u64,
        fhe_type: FheType,
        location: &StorageLocation,
        identity: &Identity,
    ) -> Result<EncryptedInput, CodecError> {
        if !fhe_type.fits(plaintext) {
            return Err(CodecError::ValueOutOfRange {
                fhe_type,
                value: plaintext,
            });
        }

        let nonce = EncryptionNonce::generate();
        let ciphertext = self
            .network_key
            .encrypt(&plaintext.to_be_bytes(), &nonce)
            .map_err(|e| CodecError::Unavailable(e.to_string()))?;

        let digest = Blake3Hash::derive(
            HANDLE_CONTEXT,
            &[
                location.as_bytes().as_slice(),
                identity.as_bytes().as_slice(),
                nonce.as_bytes().as_slice(),
                ciphertext.as_slice(),
            ],
        );
        let handle = CiphertextHandle::from_digest(&digest, fhe_type);

        let statement = input_statement(location, identity, &handle)
            .map_err(|e| CodecError::Unavailable(e.to_string()))?;
        let proof = RegistrationProof::new(self.verifier.sign(&statement).as_bytes().to_vec());

        let mut ciphertexts = self.ciphertexts.write().unwrap_or_else(|e| e.into_inner());
        ciphertexts.insert(
            handle,
            StoredCiphertext {
                location: *location,
                owner: *identity,
                nonce,
                ciphertext,
            },
        );

        debug!(%identity, %handle, "encoded input");
        Ok(EncryptedInput { handle, proof })
    }
}

#[async_trait]
impl DecryptionService for LocalCoprocessor {
    async fn decrypt_with_grant(
        &self,
        grant: &DecryptionGrant,
    ) -> Result<SealedValue, ServiceError> {
        if grant.verify().is_err() || grant.is_expired(self.clock.now_millis()) {
            return Err(ServiceError::Denied);
        }
        if !self.is_allowed(&grant.handle, &grant.identity) {
            return Err(ServiceError::Denied);
        }

        let value = self.plaintext(grant)?;
        SealedValue::seal(value, &grant.session_public_key, grant.handle.as_bytes())
            .map_err(|e| ServiceError::Unavailable(e.to_string()))
    }
}

/// A stand-in for the execution layer.
///
/// Calls execute as soon as they are submitted; `confirm` reports the
/// recorded outcome once.
pub struct LocalChain<S: RegistryStore> {
    registry: Arc<Registry<S>>,
    coprocessor: Arc<LocalCoprocessor>,
    outcomes: Mutex<HashMap<Blake3Hash, Confirmation>>,
    nonce: AtomicU64,
}

impl<S: RegistryStore> LocalChain<S> {
    pub fn new(registry: Arc<Registry<S>>, coprocessor: Arc<LocalCoprocessor>) -> Self {
        Self {
            registry,
            coprocessor,
            outcomes: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        }
    }

    /// The registry calls are executed against.
    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    async fn execute(&self, call: &RegisterCall) -> Result<Confirmation, ExecutionError> {
        if call.location != self.registry.location() {
            return Err(ExecutionError::UnknownLocation(call.location));
        }

        let reason = match self
            .registry
            .register(&call.identity, &call.handle, &call.proof)
            .await
        {
            Ok(insertion_index) => {
                self.coprocessor.allow(&call.handle, &call.identity);
                return Ok(Confirmation::Confirmed { insertion_index });
            }
            Err(RegistryError::AlreadyRegistered { .. }) => FailureReason::AlreadyRegistered,
            Err(RegistryError::InvalidProof(_)) => FailureReason::InvalidProof,
            Err(RegistryError::Store(e)) => return Err(ExecutionError::Unavailable(e.to_string())),
            Err(RegistryError::Core(e)) => FailureReason::Reverted(e.to_string()),
        };

        self.coprocessor.discard(&call.handle, &call.identity);
        Ok(Confirmation::Failed(reason))
    }
}

#[async_trait]
impl<S: RegistryStore> TransactionExecutor for LocalChain<S> {
    async fn submit(&self, call: &RegisterCall) -> Result<TxReceipt, ExecutionError> {
        let payload = call.to_bytes()?;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx_hash = Blake3Hash::derive(
            TX_CONTEXT,
            &[nonce.to_be_bytes().as_slice(), payload.as_slice()],
        );

        let confirmation = self.execute(&RegisterCall::from_bytes(&payload)?).await?;
        info!(identity = %call.identity, ?confirmation, "executed register call");

        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.insert(tx_hash, confirmation);

        Ok(TxReceipt {
            tx_hash,
            sender: call.identity,
        })
    }

    async fn confirm(&self, receipt: &TxReceipt) -> Result<Confirmation, ExecutionError> {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes
            .remove(&receipt.tx_hash)
            .ok_or_else(|| ExecutionError::UnknownTransaction(receipt.tx_hash.to_hex()))
    }
}

#[async_trait]
impl<S: RegistryStore> StateReader for LocalChain<S> {
    async fn read(
        &self,
        location: &StorageLocation,
        identity: &Identity,
    ) -> Result<Option<CiphertextHandle>, ExecutionError> {
        if *location != self.registry.location() {
            return Err(ExecutionError::UnknownLocation(*location));
        }
        self.registry
            .read(identity)
            .await
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))
    }
}
