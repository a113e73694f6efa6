//! The client side: secret material and voucher generation.

use core::fmt;

use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_POINT, RistrettoPoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
#[cfg(feature = "zeroize")]
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::params::ProtocolParams;
use crate::primitives::aead::KEY_LEN;
use crate::primitives::polynomial::Polynomial;
use crate::primitives::{derive_key, prf, AeadKey, Envelope, PrfOutput};
use crate::setup::PublicTable;
use crate::voucher::{Candidate, CandidateOrder, ItemId, ShareRecord, Voucher};
use crate::{Error, Fingerprint, Result};

/// A client identifier. It doubles as the client's storage namespace, so it
/// may not contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let forbidden = |c: char| c == '/' || c == '\\' || c == '\0';
        if id.is_empty() || id == "." || id == ".." || id.contains(forbidden) {
            return Err(Error::InvalidClientId(id));
        }
        Ok(ClientId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ClientId::new(value)
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An item submitted by a client: `{fingerprint, id, associated data}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub fingerprint: Fingerprint,
    pub id: ItemId,
    pub associated_data: Vec<u8>,
}

impl Item {
    pub fn new(fingerprint: impl Into<Fingerprint>, id: ItemId, associated_data: Vec<u8>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            id,
            associated_data,
        }
    }
}

/// Secret material of one client. Never transmitted.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "zeroize", derive(Zeroize, ZeroizeOnDrop))]
pub struct ClientSecrets {
    ad_key: AeadKey,
    prf_key: [u8; 16],
    /// Degree-t polynomial with `ad_key` as its constant term.
    polynomial: Polynomial,
}

impl ClientSecrets {
    pub fn generate<R: RngCore + CryptoRng>(threshold: usize, rng: &mut R) -> Self {
        let mut ad_key = [0u8; KEY_LEN];
        rng.fill_bytes(&mut ad_key);
        let mut prf_key = [0u8; 16];
        rng.fill_bytes(&mut prf_key);

        let polynomial = Polynomial::random_with_secret(key_to_scalar(&ad_key), threshold, rng);

        Self {
            ad_key,
            prf_key,
            polynomial,
        }
    }

    pub fn threshold(&self) -> usize {
        self.polynomial.degree()
    }

    /// Checks the polynomial still encodes `ad_key` and has degree `threshold`.
    pub(crate) fn check(&self, threshold: usize) -> Result<()> {
        if self.polynomial.is_empty() {
            return Err(Error::CorruptSnapshot("sharing polynomial has no coefficients".into()));
        }
        if self.polynomial.degree() != threshold {
            return Err(Error::ParameterMismatch {
                expected: format!("threshold {threshold}"),
                found: format!("polynomial of degree {}", self.polynomial.degree()),
            });
        }
        if self.polynomial.secret() != key_to_scalar(&self.ad_key) {
            return Err(Error::CorruptSnapshot(
                "sharing polynomial does not encode the associated-data key".into(),
            ));
        }
        Ok(())
    }
}

/// Embeds a 16-byte key as a canonical scalar (little-endian, high half zero).
pub(crate) fn key_to_scalar(key: &AeadKey) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[..KEY_LEN].copy_from_slice(key);
    Scalar::from_bytes_mod_order(bytes)
}

/// Inverse of [`key_to_scalar`]; `None` if `scalar` is not an embedded key.
pub(crate) fn scalar_to_key(scalar: &Scalar) -> Option<AeadKey> {
    let bytes = scalar.to_bytes();
    if !bool::from(bytes[KEY_LEN..].ct_eq(&[0u8; 32 - KEY_LEN])) {
        return None;
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes[..KEY_LEN]);
    Some(key)
}

/// A client holding its secret material and the server's public table.
pub struct Client {
    pub(crate) id: ClientId,
    pub(crate) secrets: ClientSecrets,
    pub(crate) table: PublicTable,
}

impl Client {
    /// Fails closed if `table` was not built for `expected`.
    pub fn new(
        id: ClientId,
        secrets: ClientSecrets,
        table: PublicTable,
        expected: &ProtocolParams,
    ) -> Result<Self> {
        table.validate(expected)?;
        secrets.check(expected.threshold)?;

        Ok(Self { id, secrets, table })
    }

    /// A client with freshly drawn secret material.
    pub fn generate<R: RngCore + CryptoRng>(
        id: ClientId,
        table: PublicTable,
        expected: &ProtocolParams,
        rng: &mut R,
    ) -> Result<Self> {
        let secrets = ClientSecrets::generate(expected.threshold, rng);
        Self::new(id, secrets, table, expected)
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn public_table(&self) -> &PublicTable {
        &self.table
    }

    /// Builds the [`Item`] and generates its voucher.
    pub fn submit<R: RngCore + CryptoRng>(
        &self,
        id: ItemId,
        fingerprint: impl Into<Fingerprint>,
        associated_data: Vec<u8>,
        rng: &mut R,
    ) -> Voucher {
        self.generate_voucher(&Item::new(fingerprint, id, associated_data), rng)
    }

    /// Generates the voucher for `item`, placing the candidates in a uniformly
    /// random order.
    pub fn generate_voucher<R: RngCore + CryptoRng>(&self, item: &Item, rng: &mut R) -> Voucher {
        let order = CandidateOrder::from_swap(rng.next_u32() & 1 == 1);
        self.generate_voucher_ordered(item, order, rng)
    }

    /// Generates the voucher for `item` with the given candidate order.
    pub fn generate_voucher_ordered<R: RngCore + CryptoRng>(
        &self,
        item: &Item,
        order: CandidateOrder,
        rng: &mut R,
    ) -> Voucher {
        let adct = Envelope::seal(&self.secrets.ad_key, &item.associated_data, rng);

        let PrfOutput { share_index, .. } = prf(&self.secrets.prf_key, item.id.0);
        let share = self.secrets.polynomial.share(share_index);

        let mut rkey = [0u8; KEY_LEN];
        rng.fill_bytes(&mut rkey);
        let record = ShareRecord { share, adct };
        let rct = Envelope::seal(&rkey, &record.to_bytes(), rng);

        let (w1, w2) = self.table.candidate_slots(&item.fingerprint);
        let h_y = item.fingerprint.to_point();
        let first = self.blind(&h_y, w1, &rkey, rng);
        let second = self.blind(&h_y, w2, &rkey, rng);

        #[cfg(feature = "zeroize")]
        rkey.zeroize();

        Voucher {
            id: item.id,
            candidates: order.arrange(first, second),
            rct,
        }
    }

    /// `Q = β·H(y) + γ·G` and `rkey` sealed under `H'(β·P_slot + γ·L)`.
    ///
    /// When `slot` holds `y`, `β·P_slot + γ·L = α·Q`.
    fn blind<R: RngCore + CryptoRng>(
        &self,
        h_y: &RistrettoPoint,
        slot: usize,
        rkey: &AeadKey,
        rng: &mut R,
    ) -> Candidate {
        let beta = Scalar::random(rng);
        let gamma = Scalar::random(rng);

        let query = h_y * beta + RISTRETTO_BASEPOINT_POINT * gamma;
        let shared = self.table.slot_point(slot) * beta + self.table.commitment() * gamma;

        Candidate {
            query,
            ciphertext: Envelope::seal(&derive_key(&shared), rkey, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::SetupState;
    use rand_core::OsRng;

    fn setup(threshold: usize, known: &[&str]) -> SetupState {
        SetupState::new(
            ProtocolParams::with_threshold(threshold),
            known.iter().map(|x| Fingerprint::from(*x)),
            &mut OsRng,
        )
        .unwrap()
    }

    #[test]
    fn test_client_id_validation() {
        assert!(ClientId::new("alice").is_ok());
        assert!(ClientId::new("").is_err());
        assert!(ClientId::new("..").is_err());
        assert!(ClientId::new("a/b").is_err());
        assert!(ClientId::new("a\\b").is_err());
    }

    #[test]
    fn test_key_embedding() {
        let key = [0xabu8; 16];
        let scalar = key_to_scalar(&key);

        assert_eq!(scalar_to_key(&scalar), Some(key));
        assert_eq!(scalar_to_key(&(scalar + Scalar::from(1u128 << 127) * Scalar::from(2u64))), None);
    }

    #[test]
    fn test_secrets_shape() {
        let secrets = ClientSecrets::generate(3, &mut OsRng);

        assert_eq!(secrets.threshold(), 3);
        assert!(secrets.check(3).is_ok());
        assert!(secrets.check(2).is_err());
    }

    #[test]
    fn test_client_rejects_mismatched_table() {
        let state = setup(1, &["deadbeef"]);
        let id = ClientId::new("alice").unwrap();

        let wrong = ProtocolParams::with_threshold(2);
        assert!(Client::generate(id.clone(), state.public.clone(), &wrong, &mut OsRng).is_err());

        let right = ProtocolParams::with_threshold(1);
        assert!(Client::generate(id, state.public, &right, &mut OsRng).is_ok());
    }

    #[test]
    fn test_matching_candidate_shares_alpha_q() {
        let state = setup(1, &["deadbeef", "cafebabe"]);
        let params = ProtocolParams::with_threshold(1);
        let client = Client::generate(
            ClientId::new("alice").unwrap(),
            state.public.clone(),
            &params,
            &mut OsRng,
        )
        .unwrap();

        let item = Item::new("deadbeef", ItemId(0), b"payload".to_vec());
        let slot = state.table.slot_of(&item.fingerprint).unwrap();
        let (w1, _) = state.public.candidate_slots(&item.fingerprint);
        let matching = if w1 == slot { 0 } else { 1 };

        let voucher = client.generate_voucher_ordered(&item, CandidateOrder::AsDerived, &mut OsRng);
        let recovered: Vec<bool> = voucher
            .candidates
            .iter()
            .map(|candidate| {
                let key = derive_key(&(candidate.query * state.alpha));
                candidate.ciphertext.open(&key).is_some()
            })
            .collect();

        assert!(recovered[matching]);
        assert!(!recovered[1 - matching]);
    }

    #[test]
    fn test_order_swaps_candidates() {
        let state = setup(1, &["deadbeef"]);
        let params = ProtocolParams::with_threshold(1);
        let client = Client::generate(
            ClientId::new("alice").unwrap(),
            state.public.clone(),
            &params,
            &mut OsRng,
        )
        .unwrap();
        let item = Item::new("deadbeef", ItemId(0), b"payload".to_vec());
        let slot = state.table.slot_of(&item.fingerprint).unwrap();
        let (w1, _) = state.public.candidate_slots(&item.fingerprint);
        let derived_position = if w1 == slot { 0 } else { 1 };

        for order in [CandidateOrder::AsDerived, CandidateOrder::Swapped] {
            let voucher = client.generate_voucher_ordered(&item, order, &mut OsRng);
            let position = voucher
                .candidates
                .iter()
                .position(|candidate| {
                    let key = derive_key(&(candidate.query * state.alpha));
                    candidate.ciphertext.open(&key).is_some()
                })
                .unwrap();

            let expected = if order.is_swapped() {
                1 - derived_position
            } else {
                derived_position
            };
            assert_eq!(position, expected);
        }
    }
}
