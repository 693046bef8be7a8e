//! # Cipherdrop Core
//!
//! Pure primitives for Cipherdrop: identities, storage locations, ciphertext
//! handles, registration proofs and their canonical encodings.
//!
//! This crate contains no I/O, no storage, no networking. The only boundary it
//! defines is the [`CiphertextCodec`] trait, which turns a plaintext into an
//! opaque handle plus a proof of honest derivation.
//!
//! ## Key Types
//!
//! - [`Identity`] - Ed25519 verifying key that owns a registration
//! - [`StorageLocation`] - Address of the encrypted-storage contract
//! - [`CiphertextHandle`] - Opaque 32-byte reference to an encrypted value
//! - [`RegistrationProof`] - Input-verifier attestation over (location, identity, handle)
//! - [`RegistryEntry`] - One committed registration
//!
//! ## Canonicalization
//!
//! Every signed statement is encoded as deterministic CBOR behind a domain
//! separation prefix. See [`canonical`].

pub mod canonical;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod types;

pub use canonical::{input_statement, signing_message, INPUT_PROOF_DOMAIN};
pub use codec::{CiphertextCodec, CodecError, EncryptedInput};
pub use crypto::{Blake3Hash, Ed25519Signature, Identity, Keypair};
pub use error::{CoreError, Result};
pub use types::{CiphertextHandle, FheType, RegistrationProof, RegistryEntry, StorageLocation};
