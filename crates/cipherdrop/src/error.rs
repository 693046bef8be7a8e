//! Error types for the registry and the registration orchestrator.

use cipherdrop_core::{CodecError, CoreError, Identity, StorageLocation};
use cipherdrop_store::StoreError;
use thiserror::Error;

use crate::capability::FailureReason;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The identity already has an entry. Nothing was written.
    #[error("{identity} is already registered at index {insertion_index}")]
    AlreadyRegistered {
        identity: Identity,
        insertion_index: u64,
    },

    /// The proof does not attest this handle for this identity and location.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors reported by a transaction executor or state reader.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The execution backend could not be reached.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// No registry is deployed at this location.
    #[error("unknown storage location: {0}")]
    UnknownLocation(StorageLocation),

    /// The receipt does not name a submitted transaction.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// A call could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Errors surfaced by the registration orchestrator.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The identity already has an entry.
    #[error("{0} is already registered")]
    AlreadyRegistered(Identity),

    /// The registry rejected the proof.
    #[error("registry rejected the input proof")]
    InvalidProof,

    /// A submission for this identity is already in flight.
    #[error("a submission for {0} is already pending")]
    AlreadyPending(Identity),

    /// A capability did not answer within its configured timeout.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// A capability could not be reached.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The codec refused the plaintext.
    #[error("encoding failed: {0}")]
    Codec(CodecError),

    /// The transaction failed for a reason the registry does not name.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// Execution error.
    #[error("execution error: {0}")]
    Execution(ExecutionError),
}

impl OrchestrationError {
    /// Whether retrying the same submission may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::Timeout(_) | OrchestrationError::CapabilityUnavailable(_)
        )
    }
}

impl From<ExecutionError> for OrchestrationError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Unavailable(reason) => OrchestrationError::CapabilityUnavailable(reason),
            other => OrchestrationError::Execution(other),
        }
    }
}

impl From<CodecError> for OrchestrationError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Unavailable(reason) => OrchestrationError::CapabilityUnavailable(reason),
            other => OrchestrationError::Codec(other),
        }
    }
}

impl OrchestrationError {
    pub(crate) fn from_failure(identity: Identity, reason: FailureReason) -> Self {
        match reason {
            FailureReason::AlreadyRegistered => OrchestrationError::AlreadyRegistered(identity),
            FailureReason::InvalidProof => OrchestrationError::InvalidProof,
            FailureReason::Reverted(reason) => OrchestrationError::Reverted(reason),
        }
    }
}
