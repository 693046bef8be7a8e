//! # Cipherdrop
//!
//! An encrypted drop: every identity may register exactly one encrypted
//! value, the registry remembers who registered and in what order, and only
//! the owner of a value can ever read it back.
//!
//! ## Overview
//!
//! - [`Registry`] - first-write-wins map from identity to ciphertext handle,
//!   plus the ordered list of submitters
//! - [`RegistrationOrchestrator`] - client-side flow: encode, submit, confirm
//! - [`DecryptionAuthorizer`] - owner-only decryption through signed,
//!   expiring, cached grants
//! - [`local`] - an in-process backend that plays the encryption network and
//!   the execution layer
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cipherdrop::{
//!     AuthorizerConfig, DecryptionAuthorizer, KeypairSigner, LocalChain, LocalCoprocessor,
//!     OrchestratorConfig, Registry, RegistryConfig, RegistrationOrchestrator,
//! };
//! use cipherdrop::core::{Keypair, StorageLocation};
//! use cipherdrop::store::SqliteStore;
//!
//! async fn example() {
//!     let alice = Keypair::generate();
//!     let location = StorageLocation::derive(&alice.identity(), "EncryptedDrop");
//!
//!     let coprocessor = Arc::new(LocalCoprocessor::new());
//!     let config = RegistryConfig::new(location).with_verifier(coprocessor.verifier_identity());
//!     let registry = Arc::new(Registry::new(SqliteStore::open("drop.db").unwrap(), config));
//!     let chain = Arc::new(LocalChain::new(registry, Arc::clone(&coprocessor)));
//!
//!     let orchestrator = RegistrationOrchestrator::new(
//!         Arc::clone(&coprocessor),
//!         Arc::clone(&chain),
//!         chain,
//!         location,
//!         OrchestratorConfig::default(),
//!     );
//!     orchestrator.submit(&alice.identity(), 1).await.unwrap();
//!
//!     let identity = alice.identity();
//!     let handle = orchestrator.cached_handle(&identity).unwrap();
//!     let signer: KeypairSigner = [alice].into_iter().collect();
//!     let authorizer =
//!         DecryptionAuthorizer::new(Arc::new(signer), coprocessor, AuthorizerConfig::default());
//!     assert_eq!(authorizer.decrypt(&identity, &location, &handle).await.unwrap(), 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `cipherdrop::core` - identities, handles, proofs, the codec trait
//! - `cipherdrop::store` - storage abstraction and SQLite
//! - `cipherdrop::authz` - grants, the authorizer, sealing

pub mod capability;
pub mod config;
pub mod error;
pub mod local;
pub mod orchestrator;
pub mod registry;

// Re-export component crates
pub use cipherdrop_authz as authz;
pub use cipherdrop_core as core;
pub use cipherdrop_store as store;

pub use capability::{
    Confirmation, FailureReason, RegisterCall, StateReader, TransactionExecutor, TxReceipt,
};
pub use config::{AuthorizerConfig, ClientConfig, OrchestratorConfig, RegistryConfig};
pub use error::{ExecutionError, OrchestrationError, RegistryError, Result};
pub use local::{LocalChain, LocalCoprocessor};
pub use orchestrator::RegistrationOrchestrator;
pub use registry::Registry;

// Re-export commonly used types
pub use cipherdrop_authz::{
    AuthError, DecryptionAuthorizer, DecryptionGrant, GrantKey, KeypairSigner, Signer,
};
pub use cipherdrop_core::{
    CiphertextCodec, CiphertextHandle, FheType, Identity, Keypair, RegistrationProof,
    RegistryEntry, StorageLocation,
};
