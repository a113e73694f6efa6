//! Server setup: hash pair selection, cuckoo table, long-term secret and the
//! blinded public table.

use std::collections::HashSet;

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, traits::Identity, RistrettoPoint, Scalar,
};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::cuckoo::CuckooTable;
use crate::params::ProtocolParams;
use crate::primitives::HashPair;
use crate::{Error, Fingerprint, Result};

/// The table the server publishes to every client.
///
/// `points[0]` is the commitment `α·G`; `points[s + 1]` is `α·H(x)` when slot
/// `s` holds `x` and `r_s·G` for a fresh `r_s` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTable {
    params: ProtocolParams,
    hash_pair: HashPair,
    slots: usize,
    points: Vec<RistrettoPoint>,
}

impl PublicTable {
    /// Fails closed unless the table was built for exactly `expected` and
    /// has the advertised shape.
    pub fn validate(&self, expected: &ProtocolParams) -> Result<()> {
        expected.validate()?;
        expected.ensure_matches(&self.params)?;

        if self.slots == 0 {
            return Err(Error::MalformedTable("no slots".into()));
        }
        if self.points.len() != self.slots + 1 {
            return Err(Error::MalformedTable(format!(
                "{} points for {} slots",
                self.points.len(),
                self.slots
            )));
        }
        if self.commitment() == RistrettoPoint::identity() {
            return Err(Error::MalformedTable("identity commitment".into()));
        }

        Ok(())
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn hash_pair(&self) -> HashPair {
        self.hash_pair
    }

    /// The number of cuckoo slots `n'`.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// The commitment `L = α·G`.
    pub fn commitment(&self) -> RistrettoPoint {
        self.points[0]
    }

    /// The public point of slot `slot`.
    pub fn slot_point(&self, slot: usize) -> RistrettoPoint {
        self.points[slot + 1]
    }

    pub fn points(&self) -> &[RistrettoPoint] {
        &self.points
    }

    /// The two candidate slots of `fingerprint`.
    pub fn candidate_slots(&self, fingerprint: &Fingerprint) -> (usize, usize) {
        self.hash_pair
            .slots(&self.params.indexing_key, fingerprint, self.slots)
    }
}

/// What happened during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupReport {
    /// Size of the deduplicated known set.
    pub known: usize,
    pub slots: usize,
    pub hash_pair: HashPair,
    /// Fingerprints lost to eviction cycles.
    pub dropped: Vec<Fingerprint>,
    /// No candidate pair was free of `h1(x) == h2(x)` collisions.
    pub degraded_hash_pair: bool,
}

/// Everything the server derives at initialisation. Only `public` ever leaves it.
#[derive(Clone)]
pub(crate) struct SetupState {
    pub(crate) known: Vec<Fingerprint>,
    pub(crate) table: CuckooTable,
    pub(crate) alpha: Scalar,
    pub(crate) public: PublicTable,
    pub(crate) report: SetupReport,
}

impl SetupState {
    pub(crate) fn new<R: RngCore + CryptoRng>(
        params: ProtocolParams,
        known: impl IntoIterator<Item = Fingerprint>,
        rng: &mut R,
    ) -> Result<SetupState> {
        params.validate()?;

        let known = dedup(known);
        let slots = params.table_size(known.len());

        let (hash_pair, degraded_hash_pair) =
            select_hash_pair(&known, slots, &params.indexing_key);
        let table = CuckooTable::build(&known, hash_pair, slots, &params.indexing_key);

        let alpha = Scalar::random(rng);
        let public = publish(params, &table, &alpha, rng);

        let report = SetupReport {
            known: known.len(),
            slots,
            hash_pair,
            dropped: table.dropped().to_vec(),
            degraded_hash_pair,
        };

        log::info!(
            "setup complete: {} known fingerprints, {} slots, hash pair {}, {} dropped",
            report.known,
            report.slots,
            report.hash_pair,
            report.dropped.len()
        );

        Ok(SetupState {
            known,
            table,
            alpha,
            public,
            report,
        })
    }
}

/// Deduplicates, keeping the first occurrence of each fingerprint.
fn dedup(known: impl IntoIterator<Item = Fingerprint>) -> Vec<Fingerprint> {
    let mut seen = HashSet::new();
    known
        .into_iter()
        .filter(|fingerprint| seen.insert(fingerprint.clone()))
        .collect()
}

/// Picks the first pair in [`HashPair::candidates`] under which no known
/// fingerprint has `h1(x) == h2(x)`.
///
/// Returns the pair and whether the candidates were exhausted, in which case
/// the last candidate is kept.
pub(crate) fn select_hash_pair(
    known: &[Fingerprint],
    slots: usize,
    indexing_key: &[u8],
) -> (HashPair, bool) {
    let mut last = HashPair::default();

    for (attempt, pair) in HashPair::candidates().enumerate() {
        let collision = known.iter().find(|fingerprint| {
            let (h1, h2) = pair.slots(indexing_key, fingerprint, slots);
            h1 == h2
        });

        match collision {
            None => return (pair, false),
            Some(fingerprint) => {
                log::debug!("hash pair {pair} collides on {fingerprint} (attempt {attempt})");
                last = pair;
            }
        }
    }

    log::warn!("could not find a collision-free hash pair, continuing with {last}");
    (last, true)
}

fn publish<R: RngCore + CryptoRng>(
    params: ProtocolParams,
    table: &CuckooTable,
    alpha: &Scalar,
    rng: &mut R,
) -> PublicTable {
    let commitment = RISTRETTO_BASEPOINT_POINT * alpha;

    let points = core::iter::once(commitment)
        .chain(table.iter().map(|slot| match slot {
            Some(fingerprint) => fingerprint.to_point() * alpha,
            None => RISTRETTO_BASEPOINT_POINT * Scalar::random(rng),
        }))
        .collect();

    PublicTable {
        params,
        hash_pair: table.hash_pair(),
        slots: table.len(),
        points,
    }
}

/// Re-checks that `public` is exactly what `alpha` and `table` produce for the
/// occupied slots.
pub(crate) fn verify_consistency(
    params: &ProtocolParams,
    known: &[Fingerprint],
    table: &CuckooTable,
    alpha: &Scalar,
    public: &PublicTable,
) -> Result<()> {
    public.validate(params)?;

    if public.slots != params.table_size(known.len()) || table.len() != public.slots {
        return Err(Error::MalformedTable(format!(
            "{} slots for {} known fingerprints",
            public.slots,
            known.len()
        )));
    }
    if table.hash_pair() != public.hash_pair {
        return Err(Error::MalformedTable("hash pair differs from cuckoo table".into()));
    }
    if public.commitment() != RISTRETTO_BASEPOINT_POINT * alpha {
        return Err(Error::MalformedTable("commitment does not match secret".into()));
    }
    for (slot, member) in table.iter().enumerate() {
        if let Some(fingerprint) = member {
            if public.slot_point(slot) != fingerprint.to_point() * alpha {
                return Err(Error::MalformedTable(format!("slot {slot} is inconsistent")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn known(n: usize) -> Vec<Fingerprint> {
        (0..n).map(|i| Fingerprint::new(format!("{i:024x}"))).collect()
    }

    #[test]
    fn test_public_table_shape() {
        let params = ProtocolParams::default();
        let state = SetupState::new(params.clone(), known(10), &mut OsRng).unwrap();

        assert_eq!(state.public.slots(), 13);
        assert_eq!(state.public.points().len(), 14);
        assert_eq!(
            state.public.commitment(),
            RISTRETTO_BASEPOINT_POINT * state.alpha
        );
        assert!(state.public.validate(&params).is_ok());
        assert!(verify_consistency(
            &params,
            &state.known,
            &state.table,
            &state.alpha,
            &state.public
        )
        .is_ok());
    }

    #[test]
    fn test_members_and_decoys() {
        let state = SetupState::new(ProtocolParams::default(), known(10), &mut OsRng).unwrap();

        for (slot, member) in state.table.iter().enumerate() {
            let point = state.public.slot_point(slot);
            match member {
                Some(fingerprint) => assert_eq!(point, fingerprint.to_point() * state.alpha),
                None => assert_ne!(point, RistrettoPoint::identity()),
            }
        }
    }

    #[test]
    fn test_known_set_is_deduplicated() {
        let mut inputs = known(4);
        inputs.extend(known(4));

        let state = SetupState::new(ProtocolParams::default(), inputs, &mut OsRng).unwrap();

        assert_eq!(state.known, known(4));
        assert_eq!(state.report.known, 4);
        assert_eq!(state.public.slots(), 6);
    }

    #[test]
    fn test_selected_pair_has_no_degenerate_member() {
        let params = ProtocolParams::default();
        let inputs = known(50);
        let slots = params.table_size(inputs.len());

        let (pair, degraded) = select_hash_pair(&inputs, slots, &params.indexing_key);

        assert!(!degraded);
        for fingerprint in &inputs {
            let (h1, h2) = pair.slots(&params.indexing_key, fingerprint, slots);
            assert_ne!(h1, h2);
        }
    }

    #[test]
    fn test_single_slot_degrades() {
        // With one slot every pair collides.
        let (pair, degraded) = select_hash_pair(&known(1), 1, b"key");

        assert!(degraded);
        assert_eq!(pair, HashPair::candidates().last().unwrap());
    }

    #[test]
    fn test_mismatched_params_fail_closed() {
        let state = SetupState::new(ProtocolParams::with_threshold(1), known(3), &mut OsRng)
            .unwrap();

        assert!(matches!(
            state.public.validate(&ProtocolParams::with_threshold(2)),
            Err(Error::ParameterMismatch { .. })
        ));

        let mut truncated = state.public.clone();
        truncated.points.pop();
        assert!(matches!(
            truncated.validate(&ProtocolParams::with_threshold(1)),
            Err(Error::MalformedTable(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(SetupState::new(ProtocolParams::with_threshold(0), known(3), &mut OsRng).is_err());
    }
}
