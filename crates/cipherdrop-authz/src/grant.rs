//! Decryption grants.
//!
//! A grant is an identity's signed statement that one client session may
//! decrypt one handle at one storage location until a given time. The
//! statement is canonical CBOR under its own signing domain, so a grant
//! signature can never be confused with an input proof.

use ciborium::value::Value;

use cipherdrop_core::{
    signing_message, CiphertextHandle, CoreError, Ed25519Signature, Identity, StorageLocation,
};

use crate::crypto::X25519PublicKey;

/// Domain separation prefix for decryption grants.
pub const USER_DECRYPT_DOMAIN: &[u8] = b"cipherdrop/user-decrypt/v1";

/// Statement field keys.
mod keys {
    pub const IDENTITY: u64 = 0;
    pub const LOCATION: u64 = 1;
    pub const HANDLE: u64 = 2;
    pub const SESSION_KEY: u64 = 3;
    pub const ISSUED_AT: u64 = 4;
    pub const EXPIRES_AT: u64 = 5;
}

/// The triple a grant is scoped to, and the authorization cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub identity: Identity,
    pub location: StorageLocation,
    pub handle: CiphertextHandle,
}

impl GrantKey {
    pub fn new(identity: Identity, location: StorageLocation, handle: CiphertextHandle) -> Self {
        Self {
            identity,
            location,
            handle,
        }
    }
}

/// A signed, expiring permission to decrypt one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionGrant {
    /// The identity that owns the handle and signed the grant.
    pub identity: Identity,

    /// Where the handle is registered.
    pub storage_location: StorageLocation,

    /// The handle this grant unlocks.
    pub handle: CiphertextHandle,

    /// The session the result must be sealed to.
    pub session_public_key: X25519PublicKey,

    /// Signature by `identity` over [`authorization_message`].
    pub signature: Ed25519Signature,

    /// When the grant was issued (Unix milliseconds).
    pub issued_at: i64,

    /// When the grant stops being usable (Unix milliseconds, exclusive).
    pub expires_at: i64,
}

/// Build the message an identity signs to issue a grant.
pub fn authorization_message(
    identity: &Identity,
    location: &StorageLocation,
    handle: &CiphertextHandle,
    session_public_key: &X25519PublicKey,
    issued_at: i64,
    expires_at: i64,
) -> Result<Vec<u8>, CoreError> {
    let value = Value::Map(vec![
        (
            Value::Integer(keys::IDENTITY.into()),
            Value::Bytes(identity.as_bytes().to_vec()),
        ),
        (
            Value::Integer(keys::LOCATION.into()),
            Value::Bytes(location.as_bytes().to_vec()),
        ),
        (
            Value::Integer(keys::HANDLE.into()),
            Value::Bytes(handle.as_bytes().to_vec()),
        ),
        (
            Value::Integer(keys::SESSION_KEY.into()),
            Value::Bytes(session_public_key.as_bytes().to_vec()),
        ),
        (
            Value::Integer(keys::ISSUED_AT.into()),
            Value::Integer(issued_at.into()),
        ),
        (
            Value::Integer(keys::EXPIRES_AT.into()),
            Value::Integer(expires_at.into()),
        ),
    ]);
    signing_message(USER_DECRYPT_DOMAIN, &value)
}

impl DecryptionGrant {
    /// The triple this grant is scoped to.
    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.identity, self.storage_location, self.handle)
    }

    /// The exact bytes the signature must cover.
    pub fn message(&self) -> Result<Vec<u8>, CoreError> {
        authorization_message(
            &self.identity,
            &self.storage_location,
            &self.handle,
            &self.session_public_key,
            self.issued_at,
            self.expires_at,
        )
    }

    /// Check the signature against the grant's own identity.
    pub fn verify(&self) -> Result<(), CoreError> {
        self.identity.verify(&self.message()?, &self.signature)
    }

    /// Whether the grant has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether this grant permits decrypting `key` at `now`.
    ///
    /// Does not re-check the signature; callers verify once on issuance.
    pub fn authorizes(&self, key: &GrantKey, now: i64) -> bool {
        self.key() == *key && !self.is_expired(now)
    }
}
