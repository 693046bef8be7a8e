//! Capabilities the authorizer depends on.
//!
//! Each external round-trip sits behind a trait so the authorizer can be
//! driven by a wallet, a remote relayer, or an in-process test double.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use cipherdrop_core::{Ed25519Signature, Identity, Keypair};

use crate::crypto::SealedValue;
use crate::error::{ServiceError, SignError};
use crate::grant::DecryptionGrant;

/// Produces signatures on behalf of identities.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `message` as `identity`.
    ///
    /// May suspend for as long as a user takes to approve the request.
    async fn sign(&self, message: &[u8], identity: &Identity)
        -> Result<Ed25519Signature, SignError>;
}

/// Turns a valid grant into the plaintext behind its handle, sealed to the
/// grant's session key.
#[async_trait]
pub trait DecryptionService: Send + Sync {
    /// Decrypt the handle named by `grant`.
    ///
    /// Must answer `Denied` for any grant it does not honor, without saying
    /// why.
    async fn decrypt_with_grant(&self, grant: &DecryptionGrant)
        -> Result<SealedValue, ServiceError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(saturating_millis)
            .unwrap_or(0)
    }
}

fn saturating_millis(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// A signer that holds keypairs in memory.
///
/// Signs for any identity it holds and denies every other request.
#[derive(Default)]
pub struct KeypairSigner {
    keys: HashMap<Identity, Keypair>,
}

impl KeypairSigner {
    /// Create a signer with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keypair. Returns its identity.
    pub fn insert(&mut self, keypair: Keypair) -> Identity {
        let identity = keypair.identity();
        self.keys.insert(identity, keypair);
        identity
    }

    /// Whether this signer can sign for `identity`.
    pub fn holds(&self, identity: &Identity) -> bool {
        self.keys.contains_key(identity)
    }
}

impl FromIterator<Keypair> for KeypairSigner {
    fn from_iter<I: IntoIterator<Item = Keypair>>(iter: I) -> Self {
        let mut signer = Self::new();
        for keypair in iter {
            signer.insert(keypair);
        }
        signer
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    async fn sign(
        &self,
        message: &[u8],
        identity: &Identity,
    ) -> Result<Ed25519Signature, SignError> {
        self.keys
            .get(identity)
            .map(|keypair| keypair.sign(message))
            .ok_or(SignError::Denied)
    }
}
