//! Key derivation from group elements and the share-index PRF.

use curve25519_dalek::{RistrettoPoint, Scalar};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use super::aead::{AeadKey, KEY_LEN};

/// Modulus of the reserved PRF domain element, the largest prime below 2^64.
pub const DOMAIN_MODULUS: u64 = u64::MAX - 58;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Keyed MAC over the concatenation of `parts`.
pub(crate) fn keyed_mac<M: Mac + hmac::digest::KeyInit>(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

/// HKDF-SHA256 with a zero salt and empty info, one expand block,
/// over the canonical encoding of `point`.
pub fn derive_key(point: &RistrettoPoint) -> AeadKey {
    let ikm = point.compress().to_bytes();

    let salt = [0u8; 32];
    let prk = keyed_mac::<HmacSha256>(&salt, &[&ikm[..]]);
    let okm = keyed_mac::<HmacSha256>(&prk, &[&[1u8][..]]);

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&okm[..KEY_LEN]);
    key
}

/// Output of [`prf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrfOutput {
    /// The x-coordinate of the item's secret share.
    pub share_index: Scalar,
    /// Reserved; nothing downstream consumes it yet.
    pub domain_element: u64,
}

/// HMAC-SHA512 chain keyed by `prf_key` over the item id.
pub fn prf(prf_key: &[u8; 16], id: u64) -> PrfOutput {
    let first = keyed_mac::<HmacSha512>(prf_key, &[&id.to_be_bytes()[..]]);
    let second = keyed_mac::<HmacSha512>(prf_key, &[first.as_slice()]);

    let mut wide = [0u8; 64];
    wide.copy_from_slice(&first);
    let share_index = Scalar::from_bytes_mod_order_wide(&wide);

    let mut head = [0u8; 8];
    head.copy_from_slice(&second[..8]);
    let domain_element = u64::from_be_bytes(head) % DOMAIN_MODULUS;

    PrfOutput {
        share_index,
        domain_element,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
    use rand_core::OsRng;

    #[test]
    fn test_derive_key_matches_rfc5869_shape() {
        let point = RISTRETTO_BASEPOINT_POINT * Scalar::from(7u64);

        let prk = keyed_mac::<HmacSha256>(&[0u8; 32], &[&point.compress().to_bytes()[..]]);
        let t1 = keyed_mac::<HmacSha256>(&prk, &[&[1u8][..]]);

        assert_eq!(derive_key(&point), t1[..16]);
    }

    #[test]
    fn test_derive_key_separates_points() {
        let a = RistrettoPoint::random(&mut OsRng);
        let b = RistrettoPoint::random(&mut OsRng);

        assert_eq!(derive_key(&a), derive_key(&a));
        assert_ne!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn test_prf_is_deterministic() {
        let key = [9u8; 16];

        assert_eq!(prf(&key, 4), prf(&key, 4));
        assert_ne!(prf(&key, 4).share_index, prf(&key, 5).share_index);
        assert_ne!(prf(&key, 4).share_index, prf(&[8u8; 16], 4).share_index);
        assert!(prf(&key, 4).domain_element < DOMAIN_MODULUS);
    }
}
