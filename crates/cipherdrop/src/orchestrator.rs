//! Client-side registration flow.
//!
//! `submit` runs: check the read view, encode, submit the register call,
//! wait for confirmation, refresh the read view. At most one submission per
//! identity is in flight; the pending marker is an RAII guard, so it is
//! released on every exit path, including when the future is dropped.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use cipherdrop_core::{CiphertextCodec, CiphertextHandle, Identity, StorageLocation};

use crate::capability::{Confirmation, RegisterCall, StateReader, TransactionExecutor};
use crate::config::OrchestratorConfig;
use crate::error::{ExecutionError, OrchestrationError};

type PendingSet = Arc<Mutex<HashSet<Identity>>>;

/// Marks an identity as having a submission in flight.
struct PendingGuard {
    pending: PendingSet,
    identity: Identity,
}

impl PendingGuard {
    fn acquire(pending: &PendingSet, identity: Identity) -> Result<Self, OrchestrationError> {
        let mut set = pending.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(identity) {
            return Err(OrchestrationError::AlreadyPending(identity));
        }
        Ok(Self {
            pending: Arc::clone(pending),
            identity,
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut set = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.identity);
    }
}

/// Drives registrations against one storage location.
pub struct RegistrationOrchestrator<C, E, R>
where
    C: CiphertextCodec,
    E: TransactionExecutor,
    R: StateReader,
{
    codec: Arc<C>,
    executor: Arc<E>,
    reader: Arc<R>,
    location: StorageLocation,
    config: OrchestratorConfig,
    pending: PendingSet,
    /// Last handle read per identity; `None` means "read, not registered".
    view: RwLock<HashMap<Identity, Option<CiphertextHandle>>>,
}

impl<C, E, R> RegistrationOrchestrator<C, E, R>
where
    C: CiphertextCodec,
    E: TransactionExecutor,
    R: StateReader,
{
    pub fn new(
        codec: Arc<C>,
        executor: Arc<E>,
        reader: Arc<R>,
        location: StorageLocation,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            codec,
            executor,
            reader,
            location,
            config,
            pending: Arc::new(Mutex::new(HashSet::new())),
            view: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this orchestrator submits to.
    pub fn location(&self) -> StorageLocation {
        self.location
    }

    /// Get the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Encode `plaintext` and register it as `identity`'s ciphertext.
    ///
    /// Returns the insertion index the registry assigned.
    pub async fn submit(
        &self,
        identity: &Identity,
        plaintext: u64,
    ) -> Result<u64, OrchestrationError> {
        let _pending = PendingGuard::acquire(&self.pending, *identity)?;

        debug!(%identity, "checking registration status");
        if self.refresh(identity).await?.is_some() {
            return Err(OrchestrationError::AlreadyRegistered(*identity));
        }

        debug!(%identity, fhe_type = ?self.config.fhe_type, "encoding plaintext");
        let input = self
            .codec
            .encode(plaintext, self.config.fhe_type, &self.location, identity)
            .await?;

        let call = RegisterCall {
            location: self.location,
            identity: *identity,
            handle: input.handle,
            proof: input.proof,
        };

        let receipt = with_timeout(
            self.config.submit_timeout,
            "transaction submission",
            self.executor.submit(&call),
        )
        .await?;
        info!(%identity, tx = ?receipt.tx_hash, "submitted registration");

        let confirmation = with_timeout(
            self.config.confirm_timeout,
            "transaction confirmation",
            self.executor.confirm(&receipt),
        )
        .await?;

        match confirmation {
            Confirmation::Confirmed { insertion_index } => {
                info!(%identity, insertion_index, "registration confirmed");
                self.refresh_after_confirmation(identity).await;
                Ok(insertion_index)
            }
            Confirmation::Failed(reason) => {
                warn!(%identity, ?reason, "registration failed");
                self.refresh_after_confirmation(identity).await;
                Err(OrchestrationError::from_failure(*identity, reason))
            }
        }
    }

    /// Re-read `identity`'s handle and update the cached view.
    pub async fn refresh(
        &self,
        identity: &Identity,
    ) -> Result<Option<CiphertextHandle>, OrchestrationError> {
        let handle = with_timeout(
            self.config.read_timeout,
            "state read",
            self.reader.read(&self.location, identity),
        )
        .await?;
        let mut view = self.view.write().unwrap_or_else(|e| e.into_inner());
        view.insert(*identity, handle);
        Ok(handle)
    }

    /// The handle last read for `identity`, without a round-trip.
    pub fn cached_handle(&self, identity: &Identity) -> Option<CiphertextHandle> {
        let view = self.view.read().unwrap_or_else(|e| e.into_inner());
        view.get(identity).copied().flatten()
    }

    /// Whether a submission for `identity` is in flight.
    pub fn is_pending(&self, identity: &Identity) -> bool {
        let set = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(identity)
    }

    async fn refresh_after_confirmation(&self, identity: &Identity) {
        if let Err(err) = self.refresh(identity).await {
            warn!(%identity, error = %err, "could not refresh read view");
        }
    }
}

async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, OrchestrationError>
where
    F: Future<Output = Result<T, ExecutionError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(operation, "timed out");
            Err(OrchestrationError::Timeout(operation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cipherdrop_core::{
        Blake3Hash, CodecError, EncryptedInput, FheType, RegistrationProof,
    };

    use crate::capability::{FailureReason, TxReceipt};

    /// Codec that derives a fresh handle from a counter.
    #[derive(Default)]
    struct CountingCodec {
        next: AtomicU64,
    }

    #[async_trait]
    impl CiphertextCodec for CountingCodec {
        async fn encode(
            &self,
            plaintext: u64,
            fhe_type: FheType,
            _location: &StorageLocation,
            _identity: &Identity,
        ) -> Result<EncryptedInput, CodecError> {
            if !fhe_type.fits(plaintext) {
                return Err(CodecError::ValueOutOfRange {
                    fhe_type,
                    value: plaintext,
                });
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            let digest = Blake3Hash::hash(&n.to_be_bytes());
            Ok(EncryptedInput {
                handle: CiphertextHandle::from_digest(&digest, fhe_type),
                proof: RegistrationProof::new(vec![0u8; 64]),
            })
        }
    }

    /// Executor that commits every call to an in-memory map.
    #[derive(Default)]
    struct FakeChain {
        handles: Mutex<HashMap<Identity, CiphertextHandle>>,
        outcomes: Mutex<HashMap<Blake3Hash, Confirmation>>,
        confirm_delay: Duration,
        submits: AtomicUsize,
    }

    #[async_trait]
    impl TransactionExecutor for FakeChain {
        async fn submit(&self, call: &RegisterCall) -> Result<TxReceipt, ExecutionError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst);
            let tx_hash = Blake3Hash::hash(&(n as u64).to_be_bytes());

            let outcome = {
                let mut handles = self.handles.lock().unwrap();
                if handles.contains_key(&call.identity) {
                    Confirmation::Failed(FailureReason::AlreadyRegistered)
                } else {
                    handles.insert(call.identity, call.handle);
                    Confirmation::Confirmed {
                        insertion_index: handles.len() as u64 - 1,
                    }
                }
            };
            self.outcomes.lock().unwrap().insert(tx_hash, outcome);

            Ok(TxReceipt {
                tx_hash,
                sender: call.identity,
            })
        }

        async fn confirm(&self, receipt: &TxReceipt) -> Result<Confirmation, ExecutionError> {
            tokio::time::sleep(self.confirm_delay).await;
            self.outcomes
                .lock()
                .unwrap()
                .remove(&receipt.tx_hash)
                .ok_or_else(|| ExecutionError::UnknownTransaction(format!("{:?}", receipt.tx_hash)))
        }
    }

    #[async_trait]
    impl StateReader for FakeChain {
        async fn read(
            &self,
            _location: &StorageLocation,
            identity: &Identity,
        ) -> Result<Option<CiphertextHandle>, ExecutionError> {
            Ok(self.handles.lock().unwrap().get(identity).copied())
        }
    }

    /// Reader whose reads never complete.
    struct StalledReader;

    #[async_trait]
    impl StateReader for StalledReader {
        async fn read(
            &self,
            _location: &StorageLocation,
            _identity: &Identity,
        ) -> Result<Option<CiphertextHandle>, ExecutionError> {
            std::future::pending().await
        }
    }

    type TestOrchestrator = RegistrationOrchestrator<CountingCodec, FakeChain, FakeChain>;

    fn orchestrator(chain: Arc<FakeChain>, config: OrchestratorConfig) -> TestOrchestrator {
        RegistrationOrchestrator::new(
            Arc::new(CountingCodec::default()),
            Arc::clone(&chain),
            chain,
            StorageLocation::from_bytes([7; 20]),
            config,
        )
    }

    fn identity(seed: u8) -> Identity {
        Identity::from_bytes([seed; 32])
    }

    #[tokio::test]
    async fn test_submit_refreshes_view() {
        let chain = Arc::new(FakeChain::default());
        let orch = orchestrator(Arc::clone(&chain), OrchestratorConfig::default());
        let alice = identity(1);

        assert_eq!(orch.cached_handle(&alice), None);
        assert_eq!(orch.submit(&alice, 1).await.unwrap(), 0);

        let stored = chain.handles.lock().unwrap().get(&alice).copied();
        assert_eq!(orch.cached_handle(&alice), stored);
        assert!(!orch.is_pending(&alice));
    }

    #[tokio::test]
    async fn test_registered_identity_fails_fast() {
        let chain = Arc::new(FakeChain::default());
        let orch = orchestrator(Arc::clone(&chain), OrchestratorConfig::default());
        let alice = identity(1);

        orch.submit(&alice, 1).await.unwrap();
        let err = orch.submit(&alice, 0).await.unwrap_err();

        assert!(matches!(err, OrchestrationError::AlreadyRegistered(id) if id == alice));
        assert_eq!(chain.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_value_out_of_range() {
        let chain = Arc::new(FakeChain::default());
        let config = OrchestratorConfig {
            fhe_type: FheType::Bool,
            ..Default::default()
        };
        let orch = orchestrator(Arc::clone(&chain), config);

        let err = orch.submit(&identity(1), 2).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Codec(CodecError::ValueOutOfRange { .. })
        ));
        assert_eq!(chain.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending() {
        let chain = Arc::new(FakeChain {
            confirm_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let orch = orchestrator(Arc::clone(&chain), OrchestratorConfig::default());
        let alice = identity(1);

        let (first, second) = tokio::join!(orch.submit(&alice, 1), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(orch.is_pending(&alice));
            orch.submit(&alice, 1).await
        });

        assert_eq!(first.unwrap(), 0);
        assert!(matches!(second, Err(OrchestrationError::AlreadyPending(_))));
        assert!(!orch.is_pending(&alice));
    }

    #[tokio::test]
    async fn test_confirm_timeout_releases_pending() {
        let chain = Arc::new(FakeChain {
            confirm_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let config = OrchestratorConfig {
            confirm_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let orch = orchestrator(chain, config);
        let alice = identity(1);

        let err = orch.submit(&alice, 1).await.unwrap_err();

        assert!(matches!(err, OrchestrationError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(!orch.is_pending(&alice));
    }

    #[tokio::test]
    async fn test_cancelled_submit_releases_pending() {
        let chain = Arc::new(FakeChain {
            confirm_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let orch = orchestrator(chain, OrchestratorConfig::default());
        let alice = identity(1);

        let _ = tokio::time::timeout(Duration::from_millis(10), orch.submit(&alice, 1)).await;

        assert!(!orch.is_pending(&alice));
    }

    #[tokio::test]
    async fn test_different_identities_do_not_block() {
        let chain = Arc::new(FakeChain {
            confirm_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let orch = orchestrator(Arc::clone(&chain), OrchestratorConfig::default());

        let (alice, bob) = (identity(1), identity(2));

        let (a, b) = tokio::join!(orch.submit(&alice, 1), orch.submit(&bob, 0));

        let mut indices = vec![a.unwrap(), b.unwrap()];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_stalled_state_read_times_out() {
        let chain = Arc::new(FakeChain::default());
        let config = OrchestratorConfig {
            read_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let orch = RegistrationOrchestrator::new(
            Arc::new(CountingCodec::default()),
            Arc::clone(&chain),
            Arc::new(StalledReader),
            StorageLocation::from_bytes([7; 20]),
            config,
        );
        let alice = identity(1);

        let err = tokio::time::timeout(Duration::from_secs(2), orch.submit(&alice, 1))
            .await
            .expect("submit should give up on its own")
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::Timeout("state read")));
        assert!(err.is_retryable());
        assert!(!orch.is_pending(&alice));
        assert_eq!(chain.submits.load(Ordering::SeqCst), 0);
    }
}
