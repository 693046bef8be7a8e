//! # Cipherdrop Testkit
//!
//! Testing utilities for Cipherdrop.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a registry wired to the local backend with deterministic parties
//! - **Doubles**: a manual clock and signers that count, stall, refuse or forge
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use cipherdrop_testkit::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let (handle, confirmation) = fixture.register(0, 1).await?;
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cipherdrop_testkit::generators::typed_value;
//!
//! proptest! {
//!     #[test]
//!     fn value_fits((ty, value) in typed_value()) {
//!         prop_assert!(ty.fits(value));
//!     }
//! }
//! ```

pub mod doubles;
pub mod fixtures;
pub mod generators;

pub use doubles::{
    CountingSigner, DelayedSigner, DenyingSigner, ForgingSigner, ManualClock, OfflineSigner,
};
pub use fixtures::{party_keypair, FixtureError, FixtureOrchestrator, TestFixture};
