//! The public keyed hash family used to index cuckoo slots.

use core::fmt;

use hmac::Hmac;
use serde::{Deserialize, Serialize};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_256, Sha3_384, Sha3_512};

use super::kdf::keyed_mac;
use crate::Fingerprint;

/// One candidate slot-indexing function: HMAC over a fixed digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexHash {
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    HmacSha3_256,
    HmacSha3_384,
    HmacSha3_512,
}

impl IndexHash {
    /// The ordered candidate family.
    pub const FAMILY: [IndexHash; 7] = [
        IndexHash::HmacSha224,
        IndexHash::HmacSha256,
        IndexHash::HmacSha384,
        IndexHash::HmacSha512,
        IndexHash::HmacSha3_256,
        IndexHash::HmacSha3_384,
        IndexHash::HmacSha3_512,
    ];

    fn digest(self, key: &[u8], fingerprint: &Fingerprint) -> Vec<u8> {
        let message = [fingerprint.as_bytes()];
        match self {
            IndexHash::HmacSha224 => keyed_mac::<Hmac<Sha224>>(key, &message),
            IndexHash::HmacSha256 => keyed_mac::<Hmac<Sha256>>(key, &message),
            IndexHash::HmacSha384 => keyed_mac::<Hmac<Sha384>>(key, &message),
            IndexHash::HmacSha512 => keyed_mac::<Hmac<Sha512>>(key, &message),
            IndexHash::HmacSha3_256 => keyed_mac::<Hmac<Sha3_256>>(key, &message),
            IndexHash::HmacSha3_384 => keyed_mac::<Hmac<Sha3_384>>(key, &message),
            IndexHash::HmacSha3_512 => keyed_mac::<Hmac<Sha3_512>>(key, &message),
        }
    }

    /// The digest read as a big-endian integer, reduced mod `slots`.
    pub fn slot(self, key: &[u8], fingerprint: &Fingerprint, slots: usize) -> usize {
        debug_assert!(slots > 0);
        let modulus = slots as u128;
        let slot = self
            .digest(key, fingerprint)
            .iter()
            .fold(0u128, |acc, byte| ((acc << 8) | *byte as u128) % modulus);

        slot as usize
    }
}

impl fmt::Display for IndexHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexHash::HmacSha224 => "HMAC-SHA224",
            IndexHash::HmacSha256 => "HMAC-SHA256",
            IndexHash::HmacSha384 => "HMAC-SHA384",
            IndexHash::HmacSha512 => "HMAC-SHA512",
            IndexHash::HmacSha3_256 => "HMAC-SHA3-256",
            IndexHash::HmacSha3_384 => "HMAC-SHA3-384",
            IndexHash::HmacSha3_512 => "HMAC-SHA3-512",
        };
        f.write_str(name)
    }
}

/// The pair `(h1, h2)` placing each fingerprint in one of two candidate slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashPair {
    pub first: IndexHash,
    pub second: IndexHash,
}

impl Default for HashPair {
    fn default() -> Self {
        Self {
            first: IndexHash::HmacSha256,
            second: IndexHash::HmacSha512,
        }
    }
}

impl HashPair {
    pub fn new(first: IndexHash, second: IndexHash) -> Self {
        Self { first, second }
    }

    /// `(h1(x) mod slots, h2(x) mod slots)`.
    pub fn slots(&self, key: &[u8], fingerprint: &Fingerprint, slots: usize) -> (usize, usize) {
        (
            self.first.slot(key, fingerprint, slots),
            self.second.slot(key, fingerprint, slots),
        )
    }

    /// Every ordered pair of distinct family members, starting with the default
    /// pair and then in lexicographic order of family position.
    pub fn candidates() -> impl Iterator<Item = HashPair> {
        let default = HashPair::default();
        let family = IndexHash::FAMILY;

        core::iter::once(default).chain(
            family
                .into_iter()
                .flat_map(move |first| family.into_iter().map(move |second| (first, second)))
                .filter(|(first, second)| first != second)
                .map(|(first, second)| HashPair::new(first, second))
                .filter(move |pair| *pair != default),
        )
    }
}

impl fmt::Display for HashPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
