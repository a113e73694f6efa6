//! Cryptographic building blocks: AEAD envelopes, key derivation, the
//! share-index PRF, slot indexing and Shamir sharing over the Ristretto
//! scalar field.

pub mod aead;
pub mod indexing;
pub mod kdf;
pub(crate) mod polynomial;

pub use aead::{AeadKey, Envelope, AEAD_LABEL};
pub use indexing::{HashPair, IndexHash};
pub use kdf::{derive_key, prf, PrfOutput};
pub use polynomial::{interpolate_at_zero, Share};
