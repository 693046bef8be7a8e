//! Strong type definitions for Cipherdrop.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Blake3Hash, Identity};
use crate::error::CoreError;

/// Address of an encrypted-storage contract (20 bytes).
///
/// Handles and proofs are bound to exactly one location; a proof minted for
/// one location is rejected by a registry living at another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation(pub [u8; 20]);

impl StorageLocation {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a location from its deployer and a contract name.
    pub fn derive(deployer: &Identity, name: &str) -> Self {
        let hash = Blake3Hash::derive(
            "cipherdrop-v1 storage location",
            &[deployer.as_bytes(), name.as_bytes()],
        );
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash.0[..20]);
        Self(arr)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageLocation(0x{})", self.to_hex())
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl AsRef<[u8]> for StorageLocation {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypted value types a handle can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
}

impl FheType {
    /// Convert to the wire code.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(FheType::Bool),
            2 => Some(FheType::Uint8),
            3 => Some(FheType::Uint16),
            4 => Some(FheType::Uint32),
            5 => Some(FheType::Uint64),
            _ => None,
        }
    }

    /// Width of the plaintext in bits.
    pub fn bits(self) -> u32 {
        match self {
            FheType::Bool => 1,
            FheType::Uint8 => 8,
            FheType::Uint16 => 16,
            FheType::Uint32 => 32,
            FheType::Uint64 => 64,
        }
    }

    /// Whether `value` is representable in this type.
    pub fn fits(self, value: u64) -> bool {
        match self.bits() {
            64 => true,
            bits => value < (1u64 << bits),
        }
    }
}

impl TryFrom<u8> for FheType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        FheType::from_u8(code).ok_or(CoreError::UnknownFheType(code))
    }
}

/// Current handle layout version, stored in the last byte.
pub const HANDLE_VERSION: u8 = 1;

/// An opaque 32-byte reference to an encrypted value.
///
/// Layout: 30 bytes of derived digest, one byte of [`FheType`] code, one
/// byte of [`HANDLE_VERSION`]. Handles compare for equality only. The
/// all-zero value is the "absent" sentinel and never names a real ciphertext.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    /// The reserved absent value.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Assemble a handle from a derived digest and its type.
    pub fn from_digest(digest: &Blake3Hash, fhe_type: FheType) -> Self {
        let mut arr = [0u8; 32];
        arr[..30].copy_from_slice(&digest.0[..30]);
        arr[30] = fhe_type.to_u8();
        arr[31] = HANDLE_VERSION;
        Self(arr)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the reserved absent value.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The encrypted type encoded in the handle, if recognised.
    pub fn fhe_type(&self) -> Option<FheType> {
        FheType::from_u8(self.0[30])
    }

    /// The handle layout version.
    pub fn version(&self) -> u8 {
        self.0[31]
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Interpret raw state bytes, mapping the sentinel to `None`.
    pub fn from_state_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        let handle = Self(arr);
        (!handle.is_zero()).then_some(handle)
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl AsRef<[u8]> for CiphertextHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Opaque proof that a handle was honestly derived for a (location, identity) pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationProof(pub Bytes);

impl RegistrationProof {
    /// Wrap raw proof bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RegistrationProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistrationProof({} bytes)", self.0.len())
    }
}

/// A committed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Who registered.
    pub identity: Identity,
    /// The stored ciphertext handle.
    pub handle: CiphertextHandle,
    /// Position in the submitter sequence (0-indexed, assigned at commit).
    pub insertion_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_handle_layout() {
        let digest = Blake3Hash::hash(b"ciphertext");
        let handle = CiphertextHandle::from_digest(&digest, FheType::Uint32);

        assert_eq!(handle.fhe_type(), Some(FheType::Uint32));
        assert_eq!(handle.version(), HANDLE_VERSION);
        assert!(!handle.is_zero());
    }

    #[test]
    fn test_zero_state_bytes_are_absent() {
        assert_eq!(CiphertextHandle::from_state_bytes(&[0u8; 32]), None);
        assert_eq!(CiphertextHandle::from_state_bytes(&[]), None);
        assert_eq!(
            CiphertextHandle::from_state_bytes(&[7u8; 32]),
            Some(CiphertextHandle([7u8; 32]))
        );
    }

    #[test]
    fn test_fhe_type_ranges() {
        assert!(FheType::Bool.fits(1));
        assert!(!FheType::Bool.fits(2));
        assert!(FheType::Uint8.fits(255));
        assert!(!FheType::Uint8.fits(256));
        assert!(FheType::Uint32.fits(u32::MAX as u64));
        assert!(!FheType::Uint32.fits(u32::MAX as u64 + 1));
        assert!(FheType::Uint64.fits(u64::MAX));
    }

    #[test]
    fn test_fhe_type_codes() {
        for ty in [
            FheType::Bool,
            FheType::Uint8,
            FheType::Uint16,
            FheType::Uint32,
            FheType::Uint64,
        ] {
            assert_eq!(FheType::try_from(ty.to_u8()).unwrap(), ty);
        }
        assert!(FheType::try_from(1).is_err());
    }

    #[test]
    fn test_location_derivation() {
        let deployer = Keypair::from_seed(&[9u8; 32]).identity();
        let a = StorageLocation::derive(&deployer, "EncryptedDrop");
        let b = StorageLocation::derive(&deployer, "EncryptedDrop");
        let c = StorageLocation::derive(&deployer, "OtherDrop");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(format!("{}", a).starts_with("0x"));
    }

    proptest::proptest! {
        #[test]
        fn prop_derived_handle_is_never_absent(bytes in proptest::prelude::any::<[u8; 32]>()) {
            let handle = CiphertextHandle::from_digest(&Blake3Hash(bytes), FheType::Bool);
            proptest::prop_assert!(!handle.is_zero());
            proptest::prop_assert_eq!(CiphertextHandle::from_state_bytes(handle.as_bytes()), Some(handle));
        }
    }

    #[test]
    fn test_registry_entry_json() {
        let entry = RegistryEntry {
            identity: Keypair::from_seed(&[3u8; 32]).identity(),
            handle: CiphertextHandle::from_bytes([5u8; 32]),
            insertion_index: 7,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let decoded: RegistryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, entry);
    }
}
