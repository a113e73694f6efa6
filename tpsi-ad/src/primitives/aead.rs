//! AES-128-GCM envelopes with a fixed public label.

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use aes_gcm::Aes128Gcm;
use borsh::{BorshDeserialize, BorshSerialize};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The public associated data bound into every envelope.
pub const AEAD_LABEL: &[u8] = b"tpsi-ad/v1";

pub const KEY_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub type AeadKey = [u8; KEY_LEN];

/// An authenticated ciphertext: `{nonce, label, ciphertext, tag}`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Envelope {
    pub(crate) nonce: [u8; NONCE_LEN],
    pub(crate) label: Vec<u8>,
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) tag: [u8; TAG_LEN],
}

impl Envelope {
    /// Encrypts `plaintext` under `key` with a fresh random nonce.
    pub fn seal<R: RngCore + CryptoRng>(key: &AeadKey, plaintext: &[u8], rng: &mut R) -> Self {
        let cipher = Aes128Gcm::new(&(*key).into());
        let nonce = Aes128Gcm::generate_nonce(&mut *rng);

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(&nonce, AEAD_LABEL, &mut ciphertext)
            .expect("plaintext is within the AES-GCM length limit");

        let mut envelope = Self {
            nonce: [0u8; NONCE_LEN],
            label: AEAD_LABEL.to_vec(),
            ciphertext,
            tag: [0u8; TAG_LEN],
        };
        envelope.nonce.copy_from_slice(&nonce);
        envelope.tag.copy_from_slice(&tag);
        envelope
    }

    /// Decrypts the envelope.
    ///
    /// Returns `None` on any failure: wrong key, tampered fields or a foreign label.
    pub fn open(&self, key: &AeadKey) -> Option<Vec<u8>> {
        if self.label != AEAD_LABEL {
            return None;
        }

        let cipher = Aes128Gcm::new(&(*key).into());
        let mut plaintext = self.ciphertext.clone();
        cipher
            .decrypt_in_place_detached(
                &self.nonce.into(),
                &self.label,
                &mut plaintext,
                &self.tag.into(),
            )
            .ok()?;

        Some(plaintext)
    }

    /// Canonical borsh encoding: `nonce ‖ label ‖ ciphertext ‖ tag`, the
    /// variable-length fields prefixed with their little-endian `u32` length.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("writing to a Vec does not fail")
    }

    /// Inverse of [`Envelope::to_bytes`]. Rejects truncated or trailing input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        borsh::from_slice(bytes).map_err(Error::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand_core::OsRng;

    fn random_key() -> AeadKey {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_open() {
        let key = random_key();
        let envelope = Envelope::seal(&key, b"associated data", &mut OsRng);

        assert_eq!(envelope.open(&key).unwrap(), b"associated data");
        assert_eq!(envelope.label, AEAD_LABEL);
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = Envelope::seal(&random_key(), b"payload", &mut OsRng);

        assert!(envelope.open(&random_key()).is_none());
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = random_key();
        let a = Envelope::seal(&key, b"same", &mut OsRng);
        let b = Envelope::seal(&key, b"same", &mut OsRng);

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_foreign_label_fails() {
        let key = random_key();
        let mut envelope = Envelope::seal(&key, b"payload", &mut OsRng);
        envelope.label = b"header".to_vec();

        assert!(envelope.open(&key).is_none());
    }

    #[test]
    fn test_encoding_rejects_truncation() {
        let envelope = Envelope::seal(&random_key(), b"payload", &mut OsRng);
        let bytes = envelope.to_bytes();

        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);
        assert_eq!(bytes[NONCE_LEN..NONCE_LEN + 4], (AEAD_LABEL.len() as u32).to_le_bytes());
        assert!(Envelope::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Envelope::from_bytes(&trailing).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(key in any::<[u8; 16]>(), plaintext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let envelope = Envelope::seal(&key, &plaintext, &mut OsRng);
            prop_assert_eq!(envelope.open(&key), Some(plaintext));
        }

        #[test]
        fn prop_bit_flip_fails(
            key in any::<[u8; 16]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 1..64),
            field in 0usize..3,
            position in any::<usize>(),
            bit in 0u8..8,
        ) {
            let mut envelope = Envelope::seal(&key, &plaintext, &mut OsRng);
            let flip = 1u8 << bit;
            match field {
                0 => {
                    let i = position % envelope.ciphertext.len();
                    envelope.ciphertext[i] ^= flip;
                }
                1 => envelope.tag[position % TAG_LEN] ^= flip,
                _ => envelope.nonce[position % NONCE_LEN] ^= flip,
            }
            prop_assert!(envelope.open(&key).is_none());
        }
    }
}
