//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cipherdrop_core::{CiphertextHandle, FheType, Identity, Keypair, StorageLocation};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a valid identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    keypair().prop_map(|kp| kp.identity())
}

/// Generate a random storage location.
pub fn storage_location() -> impl Strategy<Value = StorageLocation> {
    any::<[u8; 20]>().prop_map(StorageLocation::from_bytes)
}

/// Generate an encrypted type.
pub fn fhe_type() -> impl Strategy<Value = FheType> {
    prop_oneof![
        Just(FheType::Bool),
        Just(FheType::Uint8),
        Just(FheType::Uint16),
        Just(FheType::Uint32),
        Just(FheType::Uint64),
    ]
}

/// Generate a type together with a value that fits it.
pub fn typed_value() -> impl Strategy<Value = (FheType, u64)> {
    fhe_type().prop_flat_map(|ty| {
        let max = match ty.bits() {
            64 => u64::MAX,
            bits => (1u64 << bits) - 1,
        };
        (Just(ty), 0..=max)
    })
}

/// Generate a non-zero handle.
pub fn handle() -> impl Strategy<Value = CiphertextHandle> {
    any::<[u8; 32]>()
        .prop_filter("handle must not be zero", |bytes| bytes.iter().any(|b| *b != 0))
        .prop_map(CiphertextHandle::from_bytes)
}

/// Generate an order of registration attempts over `parties` parties.
///
/// Repeats are allowed; only the first attempt per party can succeed.
pub fn registration_attempts(parties: usize, max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..parties, 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_typed_value_fits((ty, value) in typed_value()) {
            prop_assert!(ty.fits(value));
        }

        #[test]
        fn prop_handle_not_zero(h in handle()) {
            prop_assert!(!h.is_zero());
        }
    }
}
