use curve25519_dalek::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
#[cfg(feature = "zeroize")]
use zeroize::Zeroize;

/// A degree `t` polynomial p(X) in Z_q[X] given by its t+1 coefficients.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "zeroize", derive(Zeroize))]
pub(crate) struct Polynomial {
    coeffs: Vec<Scalar>,
}

/// A point `(index, value)` on a sharing polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub index: Scalar,
    pub value: Scalar,
}

impl Polynomial {
    /// A random polynomial of the given degree whose constant term is `secret`.
    pub(crate) fn random_with_secret<R: RngCore + CryptoRng>(
        secret: Scalar,
        degree: usize,
        rng: &mut R,
    ) -> Polynomial {
        let mut coeffs = Vec::with_capacity(degree + 1);
        coeffs.push(secret);
        coeffs.extend(core::iter::repeat_with(|| Scalar::random(rng)).take(degree));

        Polynomial { coeffs }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Degree of the polynomial; zero when it has no coefficients.
    pub(crate) fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub(crate) fn secret(&self) -> Scalar {
        self.coeffs[0]
    }

    pub(crate) fn evaluate(&self, x: &Scalar) -> Scalar {
        evaluate_scalar(x, &self.coeffs)
    }

    pub(crate) fn share(&self, index: Scalar) -> Share {
        Share {
            index,
            value: self.evaluate(&index),
        }
    }
}

fn evaluate_scalar(public_scalar: &Scalar, coeffs: &[Scalar]) -> Scalar {
    let mut res = coeffs[0];
    let mut pow = Scalar::ONE;

    for coeff in &coeffs[1..] {
        pow *= public_scalar;
        res += coeff * pow;
    }

    res
}

/// Lagrange interpolation of the constant term p(0).
///
/// Returns `None` for an empty input or when two shares have the same index.
pub fn interpolate_at_zero(shares: &[Share]) -> Option<Scalar> {
    if shares.is_empty() {
        return None;
    }

    for i in 0..shares.len() {
        for j in i + 1..shares.len() {
            if shares[i].index == shares[j].index {
                return None;
            }
        }
    }

    // λ_i(0) = Π_{j≠i} x_j / (x_j - x_i)
    let mut secret = Scalar::ZERO;
    for (i, share_i) in shares.iter().enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            numerator *= share_j.index;
            denominator *= share_j.index - share_i.index;
        }
        secret += share_i.value * numerator * denominator.invert();
    }

    Some(secret)
}
