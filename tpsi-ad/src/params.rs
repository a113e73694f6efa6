//! Protocol parameters shared bit-for-bit by the server and every client.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier of the prime-order group used for blinding.
pub const CURVE_ID: &str = "ristretto255";

/// Identifier of the field the sharing polynomial lives in (the scalar field
/// of [`CURVE_ID`]).
pub const FIELD_ID: &str = "ristretto255-scalar";

/// Public key of the slot indexing hash family. It gives uniformity, not secrecy.
pub const DEFAULT_INDEXING_KEY: &[u8] = b"tpsi-ad cuckoo index";

pub const DEFAULT_THRESHOLD: usize = 3;

pub const DEFAULT_EXPANSION_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// The threshold `t`: associated data is released once more than `t`
    /// distinct shares have been received from a client.
    pub threshold: usize,
    /// The cuckoo table expansion factor ε.
    pub expansion_factor: f64,
    pub indexing_key: Vec<u8>,
    pub curve: String,
    pub field: String,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            expansion_factor: DEFAULT_EXPANSION_FACTOR,
            indexing_key: DEFAULT_INDEXING_KEY.to_vec(),
            curve: CURVE_ID.into(),
            field: FIELD_ID.into(),
        }
    }
}

impl ProtocolParams {
    /// Default parameters with threshold `t`.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Rejects parameters this implementation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.curve != CURVE_ID {
            return Err(Error::ParameterMismatch {
                expected: format!("curve {CURVE_ID}"),
                found: format!("curve {}", self.curve),
            });
        }
        if self.field != FIELD_ID {
            return Err(Error::ParameterMismatch {
                expected: format!("field {FIELD_ID}"),
                found: format!("field {}", self.field),
            });
        }
        if self.threshold == 0 {
            return Err(Error::InvalidParameters(
                "threshold must be at least one".into(),
            ));
        }
        if !self.expansion_factor.is_finite() || self.expansion_factor <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "expansion factor {} is not a positive number",
                self.expansion_factor
            )));
        }
        if self.indexing_key.is_empty() {
            return Err(Error::InvalidParameters("empty indexing key".into()));
        }

        Ok(())
    }

    /// Fails unless `other` is exactly these parameters.
    pub(crate) fn ensure_matches(&self, other: &ProtocolParams) -> Result<()> {
        if self != other {
            return Err(Error::ParameterMismatch {
                expected: format!("{self:?}"),
                found: format!("{other:?}"),
            });
        }
        Ok(())
    }

    /// Number of cuckoo slots for `set_size` known fingerprints, `ceil((1+ε)·n)`.
    ///
    /// An empty set still gets a single (decoy) slot so clients can index it.
    pub fn table_size(&self, set_size: usize) -> usize {
        let slots = ((1.0 + self.expansion_factor) * set_size as f64).ceil() as usize;
        slots.max(1)
    }
}
