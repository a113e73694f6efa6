//! Two-choice cuckoo table over the known fingerprint set.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::primitives::HashPair;
use crate::Fingerprint;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuckooTable {
    slots: Vec<Option<Fingerprint>>,
    hash_pair: HashPair,
    indexing_key: Vec<u8>,
    dropped: Vec<Fingerprint>,
}

impl CuckooTable {
    /// Builds a table of `nslots` slots holding `inputs`.
    ///
    /// Fingerprints caught in an eviction cycle are left out and reported by
    /// [`CuckooTable::dropped`].
    pub fn build<'a>(
        inputs: impl IntoIterator<Item = &'a Fingerprint>,
        hash_pair: HashPair,
        nslots: usize,
        indexing_key: &[u8],
    ) -> CuckooTable {
        let mut tbl = CuckooTable {
            slots: vec![None; nslots.max(1)],
            hash_pair,
            indexing_key: indexing_key.to_vec(),
            dropped: Vec::new(),
        };

        for input in inputs {
            if !tbl.insert(input.clone()) {
                log::warn!("cuckoo cycle detected, {input} discarded");
                tbl.dropped.push(input.clone());
            }
        }

        tbl
    }

    /// Places `input`, evicting occupants into their alternative slot.
    ///
    /// Returns `false` once the eviction counter reaches the table size; every
    /// displacement made on behalf of `input` is then undone.
    pub fn insert(&mut self, input: Fingerprint) -> bool {
        let (h1, h2) = self.candidate_slots(&input);
        if self.slots[h1].as_ref() == Some(&input) || self.slots[h2].as_ref() == Some(&input) {
            return true;
        }

        let mut journal: Vec<(usize, Option<Fingerprint>)> = Vec::new();
        let mut item = input;
        let mut target = h1;

        for _ in 0..self.slots.len() {
            let evicted = self.slots[target].replace(item);
            journal.push((target, evicted.clone()));

            let Some(evicted) = evicted else {
                return true;
            };

            // Move the evicted fingerprint to its other candidate slot.
            let (e1, e2) = self.candidate_slots(&evicted);
            target = if e1 == target { e2 } else { e1 };
            item = evicted;
        }

        for (slot, previous) in journal.into_iter().rev() {
            self.slots[slot] = previous;
        }
        false
    }

    pub fn candidate_slots(&self, fingerprint: &Fingerprint) -> (usize, usize) {
        self.hash_pair
            .slots(&self.indexing_key, fingerprint, self.slots.len())
    }

    /// The slot holding `fingerprint`, if any.
    pub fn slot_of(&self, fingerprint: &Fingerprint) -> Option<usize> {
        let (h1, h2) = self.candidate_slots(fingerprint);
        [h1, h2]
            .into_iter()
            .find(|slot| self.slots[*slot].as_ref() == Some(fingerprint))
    }

    pub fn get(&self, slot: usize) -> Option<&Fingerprint> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn hash_pair(&self) -> HashPair {
        self.hash_pair
    }

    pub(crate) fn indexing_key(&self) -> &[u8] {
        &self.indexing_key
    }

    pub fn dropped(&self) -> &[Fingerprint] {
        &self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Fingerprint>> {
        self.slots.iter().map(Option::as_ref)
    }
}

impl fmt::Debug for CuckooTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            writeln!(f, "{}: {:?}", i, slot)?;
        }
        Ok(())
    }
}
