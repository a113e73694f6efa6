//! Threshold private set intersection with associated data (tPSI-AD).
//!
//! A server holds a set of known fingerprints. Each client submits one
//! [`Voucher`] per item, carrying a blinded two-candidate query, a Shamir
//! share of a per-client key and the item's associated data encrypted under
//! that key. The server learns which vouchers match its set, and once more
//! than `t` distinct matching shares have accumulated for a client it
//! recovers the key and releases the associated data of the matching items.
//! Below the threshold nothing but the matched item ids is learnt.
//!
//! ```
//! use rand_core::OsRng;
//! use tpsi_ad::{Client, ClientId, Fingerprint, ProtocolParams, Server};
//!
//! let params = ProtocolParams::with_threshold(1);
//! let server = Server::setup(params.clone(), [Fingerprint::from("deadbeef")], &mut OsRng).unwrap();
//!
//! let alice = ClientId::new("alice").unwrap();
//! server.register_client(alice.clone());
//! let client = Client::generate(alice.clone(), server.public_table().clone(), &params, &mut OsRng).unwrap();
//!
//! let vouchers = [
//!     client.submit(server.next_item_id(), "deadbeef", b"A".to_vec(), &mut OsRng),
//!     client.submit(server.next_item_id(), "deadbeef", b"B".to_vec(), &mut OsRng),
//! ];
//! let report = server.process_batch(&alice, &vouchers).unwrap();
//! assert_eq!(report.outcome.recovered().len(), 2);
//! ```

pub mod client;
pub(crate) mod cuckoo;
mod error;
pub mod fingerprint;
pub mod params;
pub mod primitives;
pub mod server;
pub(crate) mod setup;
pub mod snapshot;
pub mod storage;
pub mod voucher;

pub use crate::client::{Client, ClientId, ClientSecrets, Item};
pub use crate::cuckoo::CuckooTable;
pub use crate::error::{Error, Result};
pub use crate::fingerprint::{Fingerprint, FingerprintOracle};
pub use crate::params::ProtocolParams;
pub use crate::server::{
    BatchReport, MatchOutcome, PendingShare, RecoveredItem, Server, ThresholdOutcome,
};
pub use crate::setup::{PublicTable, SetupReport};
pub use crate::snapshot::SNAPSHOT_VERSION;
pub use crate::storage::{DirectoryStore, RecoveredStore, StorageConfig};
pub use crate::voucher::{Candidate, CandidateOrder, ItemId, Voucher};
