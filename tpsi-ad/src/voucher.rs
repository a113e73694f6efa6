//! Vouchers and their canonical wire encoding.

use core::fmt;

use borsh::io;
use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::{ristretto::CompressedRistretto, RistrettoPoint, Scalar};
use serde::{Deserialize, Serialize};

use crate::primitives::{Envelope, Share};
use crate::{Error, Result};

/// Server-assigned identifier of a submitted item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the two candidates are placed in the order they were derived
/// (`h1` first) or swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    AsDerived,
    Swapped,
}

impl CandidateOrder {
    pub fn from_swap(swap: bool) -> Self {
        if swap {
            CandidateOrder::Swapped
        } else {
            CandidateOrder::AsDerived
        }
    }

    pub fn is_swapped(self) -> bool {
        self == CandidateOrder::Swapped
    }

    pub(crate) fn arrange<T>(self, first: T, second: T) -> [T; 2] {
        match self {
            CandidateOrder::AsDerived => [first, second],
            CandidateOrder::Swapped => [second, first],
        }
    }
}

/// One half of a voucher: a blinded query `Q` and `rkey` encrypted under the
/// key derived from the matching `S`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub query: RistrettoPoint,
    pub ciphertext: Envelope,
}

/// The per-item message a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Voucher {
    pub id: ItemId,
    pub candidates: [Candidate; 2],
    /// The share record, encrypted under `rkey`.
    pub rct: Envelope,
}

impl Voucher {
    /// Borsh encoding: `id ‖ (Q ‖ ct) × 2 ‖ rct`, `id` as little-endian `u64`
    /// and `Q` compressed.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("writing to a Vec does not fail")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        borsh::from_slice(bytes).map_err(Error::decode)
    }
}

impl BorshSerialize for Candidate {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.query.compress().to_bytes(), writer)?;
        BorshSerialize::serialize(&self.ciphertext, writer)
    }
}

impl BorshDeserialize for Candidate {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let bytes: [u8; 32] = BorshDeserialize::deserialize_reader(reader)?;
        let query = CompressedRistretto(bytes)
            .decompress()
            .ok_or_else(|| invalid("invalid point encoding"))?;
        let ciphertext = BorshDeserialize::deserialize_reader(reader)?;

        Ok(Candidate { query, ciphertext })
    }
}

/// Plaintext of `rct`: the item's share bound to its encrypted associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShareRecord {
    pub(crate) share: Share,
    pub(crate) adct: Envelope,
}

impl ShareRecord {
    /// `index ‖ value ‖ adct`.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("writing to a Vec does not fail")
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        borsh::from_slice(bytes).map_err(Error::decode)
    }
}

impl BorshSerialize for ShareRecord {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(self.share.index.as_bytes(), writer)?;
        BorshSerialize::serialize(self.share.value.as_bytes(), writer)?;
        BorshSerialize::serialize(&self.adct, writer)
    }
}

impl BorshDeserialize for ShareRecord {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let index = read_scalar(reader)?;
        let value = read_scalar(reader)?;
        let adct = BorshDeserialize::deserialize_reader(reader)?;

        Ok(ShareRecord {
            share: Share { index, value },
            adct,
        })
    }
}

fn read_scalar<R: io::Read>(reader: &mut R) -> io::Result<Scalar> {
    let bytes: [u8; 32] = BorshDeserialize::deserialize_reader(reader)?;
    Option::from(Scalar::from_canonical_bytes(bytes)).ok_or_else(|| invalid("non-canonical scalar"))
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
