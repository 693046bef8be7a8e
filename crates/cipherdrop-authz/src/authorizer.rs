//! The decryption authorizer.
//!
//! Turns a request for an identity's handle into a plaintext. Per triple the
//! authorizer moves through `NoGrant -> PendingSignature -> Granted`, and a
//! granted triple falls back to `NoGrant` once its grant expires. The slot
//! lock for a triple is held from the cache check until the new grant is
//! stored, so concurrent callers for one triple cause a single signature
//! request.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use cipherdrop_core::{CiphertextHandle, Identity, StorageLocation};

use crate::cache::{AuthorizationCache, CacheLookup};
use crate::capability::{Clock, DecryptionService, Signer, SystemClock};
use crate::config::AuthorizerConfig;
use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::error::{AuthError, Result, ServiceError, SignError};
use crate::grant::{authorization_message, DecryptionGrant, GrantKey};

/// Obtains grants and decrypts with them on behalf of one client session.
pub struct DecryptionAuthorizer<G: Signer, D: DecryptionService> {
    signer: Arc<G>,
    service: Arc<D>,
    clock: Arc<dyn Clock>,
    session: X25519StaticSecret,
    cache: AuthorizationCache,
    config: AuthorizerConfig,
}

impl<G: Signer, D: DecryptionService> DecryptionAuthorizer<G, D> {
    /// Create an authorizer with a fresh session key and the system clock.
    pub fn new(signer: Arc<G>, service: Arc<D>, config: AuthorizerConfig) -> Self {
        Self {
            signer,
            service,
            clock: Arc::new(SystemClock),
            session: X25519StaticSecret::generate(),
            cache: AuthorizationCache::new(),
            config,
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the session key.
    pub fn with_session_secret(mut self, session: X25519StaticSecret) -> Self {
        self.session = session;
        self
    }

    /// The key decryption results are sealed to.
    pub fn session_public_key(&self) -> X25519PublicKey {
        self.session.public_key()
    }

    /// Get the configuration.
    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Get the grant cache.
    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt `identity`'s handle at `location`.
    ///
    /// Reuses a fresh cached grant; otherwise asks the signer for a new one.
    /// Dropping the returned future before it completes leaves the cache as
    /// it was.
    pub async fn decrypt(
        &self,
        identity: &Identity,
        location: &StorageLocation,
        handle: &CiphertextHandle,
    ) -> Result<u64> {
        let key = GrantKey::new(*identity, *location, *handle);
        let grant = self.authorize(&key).await?;

        let sealed = match timeout(
            self.config.decrypt_timeout,
            self.service.decrypt_with_grant(&grant),
        )
        .await
        {
            Err(_) => {
                warn!(%identity, "decryption service timed out");
                return Err(AuthError::Timeout("decryption service"));
            }
            Ok(Err(ServiceError::Denied)) => {
                debug!(%identity, "decryption service denied grant");
                return Err(AuthError::AuthorizationDenied);
            }
            Ok(Err(ServiceError::Unavailable(reason))) => {
                return Err(AuthError::CapabilityUnavailable(reason));
            }
            Ok(Ok(sealed)) => sealed,
        };

        sealed.open(&self.session, handle.as_bytes())
    }

    /// Decrypt several triples in order.
    ///
    /// Stops at the first failure. Triples that share an identity and a
    /// fresh grant do not prompt the signer again.
    pub async fn decrypt_many(&self, requests: &[GrantKey]) -> Result<Vec<u64>> {
        let mut values = Vec::with_capacity(requests.len());
        for key in requests {
            values.push(self.decrypt(&key.identity, &key.location, &key.handle).await?);
        }
        Ok(values)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Management
    // ─────────────────────────────────────────────────────────────────────────

    /// The fresh grant for a triple, if one is cached.
    pub async fn cached_grant(&self, key: &GrantKey) -> Option<DecryptionGrant> {
        match self.cache.lookup(key, self.clock.now_millis()).await {
            CacheLookup::Fresh(grant) => Some(grant),
            CacheLookup::Stale | CacheLookup::Missing => None,
        }
    }

    /// Drop the grant for a triple. Returns whether one was cached.
    pub async fn invalidate(&self, key: &GrantKey) -> bool {
        let removed = self.cache.remove(key).await.is_some();
        if removed {
            debug!(identity = %key.identity, "grant invalidated");
        }
        removed
    }

    /// Return a usable grant for `key`, signing a new one if needed.
    async fn authorize(&self, key: &GrantKey) -> Result<DecryptionGrant> {
        let lease = self.cache.checkout(key);
        let mut entry = lease.lock().await;

        let now = self.clock.now_millis();
        match CacheLookup::classify(entry.as_ref(), now) {
            CacheLookup::Fresh(grant) => {
                debug!(identity = %key.identity, "reusing cached grant");
                return Ok(grant);
            }
            CacheLookup::Stale => {
                info!(identity = %key.identity, "grant expired; re-authorizing");
            }
            CacheLookup::Missing => {}
        }

        let issued_at = now;
        let expires_at = now.saturating_add(self.config.grant_ttl_millis());
        let session_public_key = self.session.public_key();
        let message = authorization_message(
            &key.identity,
            &key.location,
            &key.handle,
            &session_public_key,
            issued_at,
            expires_at,
        )?;

        let signature = match timeout(
            self.config.sign_timeout,
            self.signer.sign(&message, &key.identity),
        )
        .await
        {
            Err(_) => {
                warn!(identity = %key.identity, "signer timed out");
                return Err(AuthError::Timeout("signer"));
            }
            Ok(Err(SignError::Denied)) => {
                debug!(identity = %key.identity, "signature request denied");
                return Err(AuthError::AuthorizationDenied);
            }
            Ok(Err(SignError::Unavailable(reason))) => {
                return Err(AuthError::CapabilityUnavailable(reason));
            }
            Ok(Ok(signature)) => signature,
        };

        let grant = DecryptionGrant {
            identity: key.identity,
            storage_location: key.location,
            handle: key.handle,
            session_public_key,
            signature,
            issued_at,
            expires_at,
        };

        if grant.verify().is_err() {
            warn!(identity = %key.identity, "signer returned an invalid signature");
            return Err(AuthError::AuthorizationDenied);
        }
        if !grant.authorizes(key, self.clock.now_millis()) {
            warn!(identity = %key.identity, "grant expired before it was stored");
            return Err(AuthError::AuthorizationDenied);
        }

        *entry = Some(grant.clone());
        info!(identity = %key.identity, expires_at, "issued decryption grant");
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use cipherdrop_core::{Ed25519Signature, Keypair};

    use crate::capability::KeypairSigner;
    use crate::crypto::SealedValue;

    struct TestClock(AtomicI64);

    impl Clock for TestClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct CountingSigner {
        inner: KeypairSigner,
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Signer for CountingSigner {
        async fn sign(
            &self,
            message: &[u8],
            identity: &Identity,
        ) -> std::result::Result<Ed25519Signature, SignError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.sign(message, identity).await
        }
    }

    /// Owner-only service: honors a grant when its signer owns the handle.
    struct OwnedValues {
        values: Mutex<HashMap<CiphertextHandle, (Identity, u64)>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DecryptionService for OwnedValues {
        async fn decrypt_with_grant(
            &self,
            grant: &DecryptionGrant,
        ) -> std::result::Result<SealedValue, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            grant.verify().map_err(|_| ServiceError::Denied)?;
            let (owner, value) = self
                .values
                .lock()
                .unwrap()
                .get(&grant.handle)
                .copied()
                .ok_or(ServiceError::Denied)?;
            if owner != grant.identity {
                return Err(ServiceError::Denied);
            }
            SealedValue::seal(value, &grant.session_public_key, grant.handle.as_bytes())
                .map_err(|e| ServiceError::Unavailable(e.to_string()))
        }
    }

    struct Setup {
        alice: Identity,
        bob: Identity,
        location: StorageLocation,
        alice_handle: CiphertextHandle,
        bob_handle: CiphertextHandle,
        signer: Arc<CountingSigner>,
        service: Arc<OwnedValues>,
        clock: Arc<TestClock>,
    }

    fn setup(sign_delay: Duration) -> Setup {
        let alice_kp = Keypair::from_seed(&[1; 32]);
        let bob_kp = Keypair::from_seed(&[2; 32]);
        let alice = alice_kp.identity();
        let bob = bob_kp.identity();
        let alice_handle = CiphertextHandle::from_bytes([0xa1; 32]);
        let bob_handle = CiphertextHandle::from_bytes([0xb2; 32]);

        let mut values = HashMap::new();
        values.insert(alice_handle, (alice, 11));
        values.insert(bob_handle, (bob, 22));

        Setup {
            alice,
            bob,
            location: StorageLocation::from_bytes([9; 20]),
            alice_handle,
            bob_handle,
            signer: Arc::new(CountingSigner {
                inner: [alice_kp, bob_kp].into_iter().collect(),
                calls: AtomicUsize::new(0),
                delay: sign_delay,
            }),
            service: Arc::new(OwnedValues {
                values: Mutex::new(values),
                calls: AtomicUsize::new(0),
            }),
            clock: Arc::new(TestClock(AtomicI64::new(1_000_000))),
        }
    }

    fn authorizer(
        s: &Setup,
        config: AuthorizerConfig,
    ) -> DecryptionAuthorizer<CountingSigner, OwnedValues> {
        DecryptionAuthorizer::new(Arc::clone(&s.signer), Arc::clone(&s.service), config)
            .with_clock(s.clock.clone())
    }

    fn short_ttl() -> AuthorizerConfig {
        AuthorizerConfig {
            grant_ttl: Duration::from_millis(1_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_decrypt_own_handle() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());

        let value = authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        assert_eq!(value, 11);
    }

    #[tokio::test]
    async fn test_grant_reused_within_window() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());

        for _ in 0..3 {
            authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        }

        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_expired_grant_reauthorizes_once() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, short_ttl());

        authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        s.clock.0.fetch_add(1_000, Ordering::SeqCst);

        assert_eq!(
            authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap(),
            11
        );
        authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();

        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_foreign_handle_denied() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());

        let err = authz.decrypt(&s.bob, &s.location, &s.alice_handle).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationDenied));
    }

    #[tokio::test]
    async fn test_grant_for_alice_not_used_for_bob() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());

        authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        assert_eq!(authz.decrypt(&s.bob, &s.location, &s.bob_handle).await.unwrap(), 22);

        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 2);
        let bob_key = GrantKey::new(s.bob, s.location, s.alice_handle);
        assert!(authz.cached_grant(&bob_key).await.is_none());
    }

    #[tokio::test]
    async fn test_signer_denial_writes_nothing() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());
        let stranger = Keypair::from_seed(&[3; 32]).identity();

        let err = authz
            .decrypt(&stranger, &s.location, &s.alice_handle)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::AuthorizationDenied));
        assert!(authz.cache().is_empty().await);
        assert_eq!(authz.cache().slot_count(), 0);
        assert_eq!(s.service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sign_timeout_is_retryable_and_writes_nothing() {
        let s = setup(Duration::from_millis(200));
        let config = AuthorizerConfig {
            sign_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let authz = authorizer(&s, config);

        let err = authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap_err();

        assert!(matches!(err, AuthError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(authz.cache().is_empty().await);
        assert_eq!(authz.cache().slot_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_decrypt_leaves_no_grant() {
        let s = setup(Duration::from_millis(200));
        let authz = authorizer(&s, AuthorizerConfig::default());

        let pending = authz.decrypt(&s.alice, &s.location, &s.alice_handle);
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert!(authz.cache().is_empty().await);
        assert_eq!(authz.cache().slot_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrypts_sign_once() {
        let s = setup(Duration::from_millis(20));
        let authz = Arc::new(authorizer(&s, AuthorizerConfig::default()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let authz = Arc::clone(&authz);
                let (alice, location, handle) = (s.alice, s.location, s.alice_handle);
                tokio::spawn(async move { authz.decrypt(&alice, &location, &handle).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 11);
        }
        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decrypt_many_and_invalidate() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());
        let alice_key = GrantKey::new(s.alice, s.location, s.alice_handle);
        let bob_key = GrantKey::new(s.bob, s.location, s.bob_handle);

        let values = authz.decrypt_many(&[alice_key, bob_key, alice_key]).await.unwrap();
        assert_eq!(values, vec![11, 22, 11]);
        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 2);

        let grant = authz.cached_grant(&alice_key).await.unwrap();
        assert_eq!(grant.session_public_key, authz.session_public_key());

        assert!(authz.invalidate(&alice_key).await);
        assert!(!authz.invalidate(&alice_key).await);
        authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        assert_eq!(s.signer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_repeated_denials_do_not_grow_cache() {
        let s = setup(Duration::ZERO);
        let authz = authorizer(&s, AuthorizerConfig::default());
        let alice_key = GrantKey::new(s.alice, s.location, s.alice_handle);

        for seed in 3..10u8 {
            let stranger = Keypair::from_seed(&[seed; 32]).identity();
            let _ = authz.decrypt(&stranger, &s.location, &s.alice_handle).await;
        }
        assert_eq!(authz.cache().slot_count(), 0);

        authz.decrypt(&s.alice, &s.location, &s.alice_handle).await.unwrap();
        assert_eq!(authz.cache().slot_count(), 1);

        assert!(authz.invalidate(&alice_key).await);
        assert_eq!(authz.cache().slot_count(), 0);
    }
}
