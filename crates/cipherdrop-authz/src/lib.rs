//! # Cipherdrop Authorization
//!
//! Signed, expiring decryption grants and the session-side machinery that
//! issues, caches, and spends them.
//!
//! ## Overview
//!
//! A registered handle can only be decrypted by its owner. To decrypt, the
//! owner signs a [`DecryptionGrant`] naming exactly one
//! (identity, location, handle) triple, the client session's X25519 key, and
//! an expiry. The [`DecryptionService`] checks the grant and returns the value
//! sealed to the session key, so nobody else on the path can read it.
//!
//! ## Key Concepts
//!
//! - **Grant**: a signed permission for one triple, valid until `expires_at`
//! - **Session key**: X25519 key that decrypted values are sealed to
//! - **Cache**: grants are reused until they expire; expiry is detected lazily
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cipherdrop_authz::{
//!     AuthorizerConfig, DecryptionAuthorizer, DecryptionService, KeypairSigner,
//! };
//! use cipherdrop_core::{CiphertextHandle, Keypair, StorageLocation};
//!
//! async fn example<D: DecryptionService>(service: Arc<D>, handle: CiphertextHandle) {
//!     let keypair = Keypair::generate();
//!     let identity = keypair.identity();
//!     let signer: KeypairSigner = [keypair].into_iter().collect();
//!
//!     let authorizer =
//!         DecryptionAuthorizer::new(Arc::new(signer), service, AuthorizerConfig::default());
//!     let location = StorageLocation::derive(&identity, "EncryptedDrop");
//!     let value = authorizer.decrypt(&identity, &location, &handle).await.unwrap();
//!     println!("decrypted {}", value);
//! }
//! ```

pub mod authorizer;
pub mod cache;
pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod grant;

pub use authorizer::DecryptionAuthorizer;
pub use cache::{AuthorizationCache, CacheLookup};
pub use capability::{Clock, DecryptionService, KeypairSigner, Signer, SystemClock};
pub use config::AuthorizerConfig;
pub use crypto::{
    EncryptionKey, EncryptionNonce, SealedValue, SharedKey, X25519PublicKey, X25519StaticSecret,
};
pub use error::{AuthError, Result, ServiceError, SignError};
pub use grant::{authorization_message, DecryptionGrant, GrantKey, USER_DECRYPT_DOMAIN};
