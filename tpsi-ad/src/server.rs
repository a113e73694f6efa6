//! The server side: setup, the client roster and voucher processing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use rand_core::{CryptoRng, RngCore};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::client::scalar_to_key;
use crate::params::ProtocolParams;
use crate::primitives::aead::KEY_LEN;
use crate::primitives::{derive_key, interpolate_at_zero, AeadKey, Envelope, Share};
use crate::setup::{PublicTable, SetupReport, SetupState};
use crate::voucher::{ItemId, ShareRecord, Voucher};
use crate::{ClientId, Error, Fingerprint, FingerprintOracle, Result};

/// A matched voucher waiting in a client's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingShare {
    pub id: ItemId,
    pub(crate) share: Share,
    pub(crate) adct: Envelope,
}

/// Result of opening one voucher with the server secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Neither candidate decrypts: the fingerprint is not a known one.
    NoMatch,
    /// Both candidates decrypt. An honest client against a consistent table
    /// never produces this; the voucher is flagged and not accumulated.
    Ambiguous,
    /// One candidate decrypts but the share record does not open or decode.
    InnerRejected,
    Matched(PendingShare),
}

/// Associated data released for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredItem {
    pub id: ItemId,
    pub data: Vec<u8>,
}

/// Threshold state of a client, re-derivable from its ledger at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdOutcome {
    /// At most `t` distinct shares. Only the matched ids are known.
    Insufficient {
        observed: Vec<ItemId>,
        distinct_shares: usize,
    },
    /// The associated-data key was recovered. Items whose data does not open
    /// under it are listed in `rejected`.
    Released {
        recovered: Vec<RecoveredItem>,
        rejected: Vec<ItemId>,
    },
    /// More than `t` distinct shares, but they do not yield a usable key.
    ReconstructionFailed {
        observed: Vec<ItemId>,
        distinct_shares: usize,
    },
}

impl ThresholdOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, ThresholdOutcome::Released { .. })
    }

    pub fn recovered(&self) -> &[RecoveredItem] {
        match self {
            ThresholdOutcome::Released { recovered, .. } => recovered,
            _ => &[],
        }
    }
}

/// Summary of [`Server::process_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub matched: Vec<ItemId>,
    pub unmatched: Vec<ItemId>,
    pub ambiguous: Vec<ItemId>,
    pub inner_rejected: Vec<ItemId>,
    /// Voucher ids already processed for this client, and shares identical to
    /// an accumulated one.
    pub replayed: Vec<ItemId>,
    pub outcome: ThresholdOutcome,
}

/// Per-client accumulation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ClientLedger {
    /// Every voucher id ever processed, matched or not.
    pub(crate) processed: BTreeSet<ItemId>,
    pub(crate) pending: Vec<PendingShare>,
}

fn share_key(share: &Share) -> ([u8; 32], [u8; 32]) {
    (share.index.to_bytes(), share.value.to_bytes())
}

impl ClientLedger {
    /// Marks `id` processed. `false` if it already was.
    fn accept(&mut self, id: ItemId) -> bool {
        self.processed.insert(id)
    }

    /// Appends `entry` unless an identical share is already pending.
    fn append(&mut self, entry: PendingShare) -> bool {
        let key = share_key(&entry.share);
        if self.pending.iter().any(|p| share_key(&p.share) == key) {
            return false;
        }
        self.pending.push(entry);
        true
    }

    fn observed(&self) -> Vec<ItemId> {
        self.pending.iter().map(|p| p.id).collect()
    }

    pub(crate) fn evaluate(&self, threshold: usize) -> ThresholdOutcome {
        let mut shares = HashSet::new();
        let mut indices = HashSet::new();
        let mut basis = Vec::new();

        for entry in &self.pending {
            if shares.insert(share_key(&entry.share)) && indices.insert(entry.share.index.to_bytes())
            {
                basis.push(entry);
            }
        }

        let distinct_shares = shares.len();
        if distinct_shares <= threshold {
            return ThresholdOutcome::Insufficient {
                observed: self.observed(),
                distinct_shares,
            };
        }

        let failed = || ThresholdOutcome::ReconstructionFailed {
            observed: self.observed(),
            distinct_shares,
        };

        if basis.len() <= threshold {
            log::warn!(
                "{distinct_shares} distinct shares but only {} distinct indices",
                basis.len()
            );
            return failed();
        }

        let Some(ad_key) = reconstruct(&basis, threshold) else {
            log::warn!(
                "no {}-subset of {} shares yields a key opening its own items",
                threshold + 1,
                basis.len()
            );
            return failed();
        };

        let (recovered, rejected) = self.release(&ad_key);
        if !rejected.is_empty() {
            log::warn!("{} items did not open under the reconstructed key", rejected.len());
        }

        ThresholdOutcome::Released {
            recovered,
            rejected,
        }
    }

    fn release(&self, ad_key: &AeadKey) -> (Vec<RecoveredItem>, Vec<ItemId>) {
        let mut recovered = Vec::new();
        let mut rejected = Vec::new();

        for entry in &self.pending {
            match entry.adct.open(ad_key) {
                Some(data) => recovered.push(RecoveredItem { id: entry.id, data }),
                None => rejected.push(entry.id),
            }
        }

        (recovered, rejected)
    }
}

/// Subsets of `t+1` shares tried before a ledger is declared unrecoverable.
const MAX_RECONSTRUCTION_ATTEMPTS: usize = 64;

/// Interpolates `(t+1)`-subsets of `basis` in arrival order until one yields a
/// key that opens the associated data of every share it was built from.
fn reconstruct(basis: &[&PendingShare], threshold: usize) -> Option<AeadKey> {
    basis
        .iter()
        .combinations(threshold + 1)
        .take(MAX_RECONSTRUCTION_ATTEMPTS)
        .find_map(|subset| {
            let shares: Vec<Share> = subset.iter().map(|entry| entry.share).collect();
            let ad_key = interpolate_at_zero(&shares).and_then(|s| scalar_to_key(&s))?;
            subset
                .iter()
                .all(|entry| entry.adct.open(&ad_key).is_some())
                .then_some(ad_key)
        })
}

/// The tPSI-AD server. `Send + Sync`: different clients are processed
/// independently, vouchers of one client are accumulated under its own lock.
pub struct Server {
    pub(crate) setup: SetupState,
    pub(crate) roster: RwLock<HashMap<ClientId, Arc<Mutex<ClientLedger>>>>,
    pub(crate) next_item_id: AtomicU64,
}

impl Server {
    /// Runs setup over the known set. Nothing is published before it completes.
    pub fn setup<R: RngCore + CryptoRng>(
        params: ProtocolParams,
        known: impl IntoIterator<Item = Fingerprint>,
        rng: &mut R,
    ) -> Result<Server> {
        let setup = SetupState::new(params, known, rng)?;

        Ok(Server {
            setup,
            roster: RwLock::new(HashMap::new()),
            next_item_id: AtomicU64::new(0),
        })
    }

    /// Runs setup over raw items, fingerprinted by `oracle`.
    pub fn setup_with_oracle<O, I, R>(
        params: ProtocolParams,
        oracle: &O,
        items: I,
        rng: &mut R,
    ) -> Result<Server>
    where
        O: FingerprintOracle + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
        R: RngCore + CryptoRng,
    {
        let known = items
            .into_iter()
            .map(|item| oracle.fingerprint(item.as_ref()));
        Self::setup(params, known, rng)
    }

    pub fn params(&self) -> &ProtocolParams {
        self.setup.public.params()
    }

    /// The table every client receives.
    pub fn public_table(&self) -> &PublicTable {
        &self.setup.public
    }

    pub fn setup_report(&self) -> &SetupReport {
        &self.setup.report
    }

    /// Hands out the next item id.
    pub fn next_item_id(&self) -> ItemId {
        ItemId(self.next_item_id.fetch_add(1, Ordering::Relaxed))
    }

    /// `false` if `id` is already registered.
    pub fn register_client(&self, id: ClientId) -> bool {
        let mut roster = self.roster.write();
        if roster.contains_key(&id) {
            return false;
        }
        log::info!("registered client {id}");
        roster.insert(id, Arc::default());
        true
    }

    /// Drops the client and everything accumulated for it.
    pub fn remove_client(&self, id: &ClientId) -> bool {
        let removed = self.roster.write().remove(id).is_some();
        if removed {
            log::info!("removed client {id}");
        }
        removed
    }

    pub fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.roster.read().keys().cloned().collect();
        clients.sort();
        clients
    }

    fn ledger(&self, client: &ClientId) -> Result<Arc<Mutex<ClientLedger>>> {
        self.roster
            .read()
            .get(client)
            .cloned()
            .ok_or_else(|| Error::UnknownClient(client.clone()))
    }

    /// Opens `voucher` with the server secret. Touches no client state.
    pub fn open_voucher(&self, voucher: &Voucher) -> MatchOutcome {
        let alpha = &self.setup.alpha;

        let opened: Vec<Vec<u8>> = voucher
            .candidates
            .iter()
            .filter_map(|candidate| {
                let key = derive_key(&(candidate.query * alpha));
                candidate.ciphertext.open(&key)
            })
            .collect();

        let rkey = match opened.as_slice() {
            [] => return MatchOutcome::NoMatch,
            [rkey] => rkey,
            _ => {
                log::warn!("voucher {} opens under both candidates", voucher.id);
                return MatchOutcome::Ambiguous;
            }
        };

        let Ok(rkey) = <[u8; KEY_LEN]>::try_from(rkey.as_slice()) else {
            return MatchOutcome::InnerRejected;
        };
        let record = voucher
            .rct
            .open(&rkey)
            .and_then(|plaintext| ShareRecord::from_bytes(&plaintext).ok());

        match record {
            Some(ShareRecord { share, adct }) => MatchOutcome::Matched(PendingShare {
                id: voucher.id,
                share,
                adct,
            }),
            None => MatchOutcome::InnerRejected,
        }
    }

    /// Opens a batch of vouchers for `client`, accumulates the matches and
    /// evaluates the threshold.
    pub fn process_batch(&self, client: &ClientId, vouchers: &[Voucher]) -> Result<BatchReport> {
        let ledger = self.ledger(client)?;

        #[cfg(feature = "parallel")]
        let outcomes: Vec<MatchOutcome> = vouchers.par_iter().map(|v| self.open_voucher(v)).collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<MatchOutcome> = vouchers.iter().map(|v| self.open_voucher(v)).collect();

        let mut report = BatchReport {
            matched: Vec::new(),
            unmatched: Vec::new(),
            ambiguous: Vec::new(),
            inner_rejected: Vec::new(),
            replayed: Vec::new(),
            outcome: ThresholdOutcome::Insufficient {
                observed: Vec::new(),
                distinct_shares: 0,
            },
        };

        let mut ledger = ledger.lock();
        for (voucher, outcome) in vouchers.iter().zip(outcomes) {
            let id = voucher.id;
            if !ledger.accept(id) {
                log::warn!("client {client} replayed voucher {id}");
                report.replayed.push(id);
                continue;
            }

            log::debug!("client {client} voucher {id}: {}", outcome_name(&outcome));
            match outcome {
                MatchOutcome::NoMatch => report.unmatched.push(id),
                MatchOutcome::Ambiguous => report.ambiguous.push(id),
                MatchOutcome::InnerRejected => report.inner_rejected.push(id),
                MatchOutcome::Matched(entry) => {
                    if ledger.append(entry) {
                        report.matched.push(id);
                    } else {
                        log::warn!("client {client} voucher {id} repeats an accumulated share");
                        report.replayed.push(id);
                    }
                }
            }
        }

        report.outcome = ledger.evaluate(self.params().threshold);
        drop(ledger);

        log::info!(
            "client {client}: {} matched, {} unmatched, {} ambiguous, threshold {}",
            report.matched.len(),
            report.unmatched.len(),
            report.ambiguous.len(),
            threshold_state(&report.outcome)
        );

        Ok(report)
    }

    /// Re-derives the threshold state of `client` from its ledger.
    pub fn evaluate(&self, client: &ClientId) -> Result<ThresholdOutcome> {
        let ledger = self.ledger(client)?;
        let outcome = ledger.lock().evaluate(self.params().threshold);
        Ok(outcome)
    }
}

fn outcome_name(outcome: &MatchOutcome) -> &'static str {
    match outcome {
        MatchOutcome::NoMatch => "no match",
        MatchOutcome::Ambiguous => "ambiguous",
        MatchOutcome::InnerRejected => "inner record rejected",
        MatchOutcome::Matched(_) => "matched",
    }
}

fn threshold_state(outcome: &ThresholdOutcome) -> &'static str {
    match outcome {
        ThresholdOutcome::Insufficient { .. } => "not reached",
        ThresholdOutcome::Released { .. } => "reached",
        ThresholdOutcome::ReconstructionFailed { .. } => "reached, reconstruction failed",
    }
}
