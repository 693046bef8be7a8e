//! Test doubles for the authorizer's capabilities.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use cipherdrop_authz::{Clock, SignError, Signer};
use cipherdrop_core::{Ed25519Signature, Identity, Keypair};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Start at `now` (Unix milliseconds).
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Counts signature requests before passing them on.
pub struct CountingSigner<G: Signer> {
    inner: G,
    calls: AtomicUsize,
}

impl<G: Signer> CountingSigner<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of signature requests seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<G: Signer> Signer for CountingSigner<G> {
    async fn sign(
        &self,
        message: &[u8],
        identity: &Identity,
    ) -> Result<Ed25519Signature, SignError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(message, identity).await
    }
}

/// Waits before passing a request on, like a user slow to approve.
pub struct DelayedSigner<G: Signer> {
    inner: G,
    delay: Duration,
}

impl<G: Signer> DelayedSigner<G> {
    pub fn new(inner: G, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<G: Signer> Signer for DelayedSigner<G> {
    async fn sign(
        &self,
        message: &[u8],
        identity: &Identity,
    ) -> Result<Ed25519Signature, SignError> {
        tokio::time::sleep(self.delay).await;
        self.inner.sign(message, identity).await
    }
}

/// Refuses every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyingSigner;

#[async_trait]
impl Signer for DenyingSigner {
    async fn sign(&self, _: &[u8], _: &Identity) -> Result<Ed25519Signature, SignError> {
        Err(SignError::Denied)
    }
}

/// Always unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSigner;

#[async_trait]
impl Signer for OfflineSigner {
    async fn sign(&self, _: &[u8], _: &Identity) -> Result<Ed25519Signature, SignError> {
        Err(SignError::Unavailable("wallet disconnected".into()))
    }
}

/// Signs every request with its own key, whatever identity was asked for.
pub struct ForgingSigner {
    keypair: Keypair,
}

impl ForgingSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl Signer for ForgingSigner {
    async fn sign(&self, message: &[u8], _: &Identity) -> Result<Ed25519Signature, SignError> {
        Ok(self.keypair.sign(message))
    }
}
