//! # Cipherdrop Store
//!
//! Storage abstraction for a Cipherdrop registry. Provides a trait-based
//! interface for registration persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! A registry keeps one ciphertext handle per identity and the ordered list
//! of identities that registered. The [`RegistryStore`] trait hides where that
//! state lives, so the registry itself is storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for tests.
//!
//! ## Key Types
//!
//! - [`RegistryStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`CommitResult`] - Result of committing a registration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherdrop_store::{CommitResult, RegistryStore, SqliteStore};
//! use cipherdrop_core::{CiphertextHandle, Keypair};
//!
//! async fn example() {
//!     let store = SqliteStore::open("registry.db").unwrap();
//!     let identity = Keypair::generate().identity();
//!     let handle = CiphertextHandle::from_bytes([7; 32]);
//!
//!     match store.commit_registration(&identity, &handle).await.unwrap() {
//!         CommitResult::Committed(index) => println!("registered at {}", index),
//!         CommitResult::AlreadyRegistered { existing } => {
//!             println!("already registered at {}", existing.insertion_index)
//!         }
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **First write wins**: a second commit for the same identity returns
//!   `AlreadyRegistered` and writes nothing
//! - **Atomic commit**: entry and sequence append land together
//! - **Dense ordering**: insertion indices run 0, 1, 2, ... with no gaps

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CommitResult, RegistryStore, StoreExt};
