//! Per-replica write-attempt markers.
//!
//! A [`WriteVector`] holds one parity bit per registered replica. The bit
//! is flipped before every snapshot-write attempt; comparing the attempted
//! parity against the bit later observed in the store disambiguates write
//! outcomes that failed ambiguously. The vector carries no ordering or
//! causality information; ordering lives entirely in the version fields.
//!
//! The persisted form is a fixed-width hex string, kept only at the
//! serialization boundary; in memory the vector is a bitset so bit checks
//! never parse strings.

use std::fmt::{self, Display};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::ReplicaIdx;

/// Maximum number of replicas a write vector can track.
pub const WRITE_VECTOR_CAPACITY: usize = 64;

/// Width of the encoded hex form in characters.
const ENCODED_WIDTH: usize = WRITE_VECTOR_CAPACITY / 4;

// ============================================================================
// Write Vector
// ============================================================================

/// Fixed-capacity bitmap of per-replica write-attempt parity bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteVector(u64);

impl WriteVector {
    pub const EMPTY: WriteVector = WriteVector(0);

    /// Returns the current parity bit for a replica.
    pub fn get(&self, idx: ReplicaIdx) -> bool {
        (self.0 >> idx.as_usize()) & 1 == 1
    }

    /// Flips a replica's parity bit and returns the new value.
    pub fn flip(&mut self, idx: ReplicaIdx) -> bool {
        self.0 ^= 1 << idx.as_usize();
        self.get(idx)
    }

    /// Encodes the vector as a fixed-width lowercase hex string.
    pub fn encode(&self) -> String {
        format!("{:0width$x}", self.0, width = ENCODED_WIDTH)
    }

    /// Decodes a vector from its hex form.
    ///
    /// Rejects anything but exactly [`ENCODED_WIDTH`] hex digits: a
    /// malformed vector in a persisted record signals corruption, not an
    /// environmental failure.
    pub fn decode(s: &str) -> Result<Self, WriteVectorError> {
        if s.len() != ENCODED_WIDTH {
            return Err(WriteVectorError::InvalidLength {
                expected: ENCODED_WIDTH,
                actual: s.len(),
            });
        }
        // from_str_radix tolerates a leading sign; persisted vectors are
        // hex digits only.
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(WriteVectorError::InvalidDigit(s.to_string()));
        }
        let bits = u64::from_str_radix(s, 16)
            .map_err(|_| WriteVectorError::InvalidDigit(s.to_string()))?;
        Ok(Self(bits))
    }
}

impl Display for WriteVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for WriteVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for WriteVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        WriteVector::decode(&s).map_err(D::Error::custom)
    }
}

/// Errors decoding a persisted write vector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteVectorError {
    #[error("write vector must be {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("write vector contains non-hex digit: {0:?}")]
    InvalidDigit(String),
}

// ============================================================================
// Replica Registry
// ============================================================================

/// Stable replica-name → bit-index mapping.
///
/// The registry is fixed at construction: every replica that may ever
/// write to an entity must be registered, and indices never change for
/// the lifetime of the deployment (they address persisted bits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRegistry {
    names: Vec<String>,
}

impl ReplicaRegistry {
    /// Builds a registry from an ordered list of replica names.
    pub fn new(names: Vec<String>) -> Result<Self, RegistryError> {
        if names.len() > WRITE_VECTOR_CAPACITY {
            return Err(RegistryError::CapacityExceeded {
                count: names.len(),
                max: WRITE_VECTOR_CAPACITY,
            });
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(RegistryError::DuplicateReplica(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Returns the bit index assigned to a replica name.
    pub fn index_of(&self, name: &str) -> Option<ReplicaIdx> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ReplicaIdx::new(i as u8))
    }

    /// Returns the name registered at a bit index.
    pub fn name_of(&self, idx: ReplicaIdx) -> Option<&str> {
        self.names.get(idx.as_usize()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates registered replicas in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ReplicaIdx, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (ReplicaIdx::new(i as u8), n.as_str()))
    }
}

/// Errors constructing a replica registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("replica {0:?} registered twice")]
    DuplicateReplica(String),

    #[error("{count} replicas exceed write-vector capacity of {max}")]
    CapacityExceeded { count: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn registry() -> ReplicaRegistry {
        ReplicaRegistry::new(vec![
            "us-east".to_string(),
            "eu-west".to_string(),
            "ap-south".to_string(),
        ])
        .expect("valid registry")
    }

    #[test]
    fn flip_returns_new_value() {
        let mut v = WriteVector::EMPTY;
        let idx = ReplicaIdx::new(2);
        assert!(!v.get(idx));
        assert!(v.flip(idx));
        assert!(v.get(idx));
        assert!(!v.flip(idx));
        assert!(!v.get(idx));
    }

    #[test]
    fn flip_is_isolated_per_replica() {
        let mut v = WriteVector::EMPTY;
        v.flip(ReplicaIdx::new(0));
        v.flip(ReplicaIdx::new(63));
        assert!(v.get(ReplicaIdx::new(0)));
        assert!(v.get(ReplicaIdx::new(63)));
        assert!(!v.get(ReplicaIdx::new(1)));
    }

    #[test_case("" ; "empty")]
    #[test_case("0" ; "too short")]
    #[test_case("00000000000000000" ; "too long")]
    #[test_case("000000000000000g" ; "non hex digit")]
    fn decode_rejects_malformed(input: &str) {
        assert!(WriteVector::decode(input).is_err());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let err = ReplicaRegistry::new(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err, Err(RegistryError::DuplicateReplica("a".to_string())));
    }

    #[test]
    fn registry_rejects_overflow() {
        let names = (0..65).map(|i| format!("r{i}")).collect();
        assert!(matches!(
            ReplicaRegistry::new(names),
            Err(RegistryError::CapacityExceeded { count: 65, max: 64 })
        ));
    }

    #[test]
    fn registry_lookup_roundtrip() {
        let reg = registry();
        let idx = reg.index_of("eu-west").expect("registered");
        assert_eq!(idx.as_u8(), 1);
        assert_eq!(reg.name_of(idx), Some("eu-west"));
        assert_eq!(reg.index_of("unknown"), None);
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(bits: u64) {
            let v = WriteVector(bits);
            prop_assert_eq!(WriteVector::decode(&v.encode()), Ok(v));
        }

        #[test]
        fn double_flip_is_identity(bits: u64, idx in 0u8..64) {
            let mut v = WriteVector(bits);
            let idx = ReplicaIdx::new(idx);
            v.flip(idx);
            v.flip(idx);
            prop_assert_eq!(v, WriteVector(bits));
        }
    }
}
