//! The ciphertext codec boundary.
//!
//! A codec turns a plaintext integer into an opaque [`CiphertextHandle`] and
//! a [`RegistrationProof`] scoped to one storage location and one
//! submitting identity. The homomorphic scheme behind it is an external
//! collaborator; this crate only fixes the contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::Identity;
use crate::types::{CiphertextHandle, FheType, RegistrationProof, StorageLocation};

/// Output of a successful encode: the handle plus the proof the registry
/// will check before committing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub proof: RegistrationProof,
}

/// Errors a codec can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The plaintext does not fit the requested encrypted type.
    #[error("value {value} does not fit {fhe_type:?}")]
    ValueOutOfRange { fhe_type: FheType, value: u64 },

    /// The encryption backend could not be reached.
    #[error("encryption backend unavailable: {0}")]
    Unavailable(String),
}

/// Encrypt-and-prove capability.
///
/// Implementations must be non-deterministic: encoding the same plaintext
/// twice, or for two different identities, yields distinct handles.
#[async_trait]
pub trait CiphertextCodec: Send + Sync {
    /// Encrypt `plaintext` as `fhe_type` for `identity` at `location`.
    async fn encode(
        &self,
        plaintext: u64,
        fhe_type: FheType,
        location: &StorageLocation,
        identity: &Identity,
    ) -> Result<EncryptedInput, CodecError>;
}
