//! Error types for decryption authorization.

use thiserror::Error;

/// Errors surfaced by the decryption authorizer.
///
/// Every reason a decryption is refused (bad signature, unknown handle,
/// foreign handle, ACL failure) collapses into `AuthorizationDenied` so a
/// caller cannot learn which handles exist.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The signer refused, the signature did not verify, or the decryption
    /// service denied the grant.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// A capability did not answer within its configured timeout.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// A capability could not be reached.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Sealing or opening a result failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] cipherdrop_core::CoreError),
}

impl AuthError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::Timeout(_) | AuthError::CapabilityUnavailable(_)
        )
    }
}

/// Failure reported by a [`Signer`](crate::Signer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    /// The holder of the key declined to sign.
    #[error("signature request denied")]
    Denied,

    /// The signer could not be reached.
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a [`DecryptionService`](crate::DecryptionService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The grant was not honored.
    #[error("decryption denied")]
    Denied,

    /// The service could not be reached.
    #[error("decryption service unavailable: {0}")]
    Unavailable(String),
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AuthError::Timeout("signer").is_retryable());
        assert!(AuthError::CapabilityUnavailable("offline".into()).is_retryable());
        assert!(!AuthError::AuthorizationDenied.is_retryable());
        assert!(!AuthError::Crypto("tag mismatch".into()).is_retryable());
    }
}
