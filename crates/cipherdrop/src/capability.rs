//! Execution capabilities: submitting register calls and reading state.
//!
//! The registry usually runs somewhere the client cannot call directly (a
//! contract, a remote service). The orchestrator reaches it through these
//! traits, and every round-trip is an await point.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cipherdrop_core::{
    Blake3Hash, CiphertextHandle, Identity, RegistrationProof, StorageLocation,
};

use crate::error::ExecutionError;

/// A request to run `Registry::register` at a storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCall {
    /// Target registry.
    pub location: StorageLocation,
    /// The registering identity (the transaction sender).
    pub identity: Identity,
    /// Handle to register.
    pub handle: CiphertextHandle,
    /// Proof binding the handle to `location` and `identity`.
    pub proof: RegistrationProof,
}

impl RegisterCall {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExecutionError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ExecutionError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExecutionError> {
        ciborium::from_reader(bytes).map_err(|e| ExecutionError::Encoding(e.to_string()))
    }
}

/// Proof that an executor accepted a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Identifier of the submitted transaction.
    pub tx_hash: Blake3Hash,
    /// The call's sender.
    pub sender: Identity,
}

/// Why a confirmed transaction did not register anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    AlreadyRegistered,
    InvalidProof,
    /// Any other failure, with the executor's description.
    Reverted(String),
}

/// Final outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    /// The registration committed at this index.
    Confirmed { insertion_index: u64 },
    /// The registry refused the call.
    Failed(FailureReason),
}

/// Submits register calls and reports their outcome.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Hand `call` to the executor. Returns once it is accepted.
    async fn submit(&self, call: &RegisterCall) -> Result<TxReceipt, ExecutionError>;

    /// Wait for the outcome of a submitted call.
    async fn confirm(&self, receipt: &TxReceipt) -> Result<Confirmation, ExecutionError>;
}

/// Reads registry state.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// The handle `identity` registered at `location`, if any.
    async fn read(
        &self,
        location: &StorageLocation,
        identity: &Identity,
    ) -> Result<Option<CiphertextHandle>, ExecutionError>;
}
