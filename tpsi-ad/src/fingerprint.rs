use core::fmt;

use curve25519_dalek::RistrettoPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Domain separator for the point mapping `H`.
const HASH_TO_POINT_DOMAIN: &[u8] = b"tpsi-ad fingerprint to point";

/// Identifier of an item's content class, as produced by a [`FingerprintOracle`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The point mapping `H(fingerprint)`.
    ///
    /// Nobody knows the discrete log of the output in base `G`.
    pub fn to_point(&self) -> RistrettoPoint {
        let mut digest = Sha512::new();
        digest.update(HASH_TO_POINT_DOMAIN);
        digest.update((self.0.len() as u64).to_be_bytes());
        digest.update(self.0.as_bytes());

        RistrettoPoint::from_uniform_bytes(&digest.finalize().into())
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns raw item bytes into a fixed-length fingerprint (e.g. a perceptual hash).
///
/// Must be deterministic; nothing else is assumed.
pub trait FingerprintOracle {
    fn fingerprint(&self, item: &[u8]) -> Fingerprint;
}

impl<F> FingerprintOracle for F
where
    F: Fn(&[u8]) -> Fingerprint,
{
    fn fingerprint(&self, item: &[u8]) -> Fingerprint {
        self(item)
    }
}
