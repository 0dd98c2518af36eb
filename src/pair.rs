//! Pairwise coupling codec
//!
//! Companion vertices hold four related values: the stored (coupled) pair
//! `C, C*` and the uncoupled pair `U, U*` used for layer-by-layer MDS
//! decoding. They are linked by a fixed 2x2 map over GF(2^8):
//!
//! ```text
//! [U ]   [1  gamma] [C ]                [C ]   [1  gamma] [U ]     1
//! [U*] = [gamma  1] [C*]      and       [C*] = [gamma  1] [U*] * -----
//!                                                                 det
//! ```
//!
//! with `det = 1 + gamma^2` (subtraction is XOR). For `gamma != 0` and
//! `gamma^2 != 1` the matrix is invertible, and any two of the four values
//! determine the other two. [`PairCodec::recover`] is the single primitive
//! every call site uses: name two known roles and two missing roles, and
//! the missing regions are filled. Callers handle pair orientation purely
//! by role assignment; there are no separate forward, reverse, or partial
//! transforms.

use crate::error::{Error, Result};
use crate::galois::{gf_add, gf_inv, gf_mul, region_multiply, region_multiply_xor};

/// Coupling constant. Any value with `gamma != 0` and `gamma^2 != 1` works;
/// 2 keeps the multiplier tables small.
pub const GAMMA: u8 = 2;

/// The four roles of a companion pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    /// Stored value at the primary vertex
    Coupled = 0,
    /// Stored value at the companion vertex
    CoupledStar = 1,
    /// Uncoupled value at the primary vertex
    Uncoupled = 2,
    /// Uncoupled value at the companion vertex
    UncoupledStar = 3,
}

/// Pairwise transform engine with precomputed coefficients
#[derive(Debug, Clone)]
pub struct PairCodec {
    gamma: u8,
    gamma_inv: u8,
    det: u8,
    det_inv: u8,
}

impl Default for PairCodec {
    fn default() -> Self {
        Self::new(GAMMA)
    }
}

impl PairCodec {
    /// Build a codec for the given coupling constant.
    ///
    /// Panics if `gamma` is 0 or `gamma^2 == 1`; the constant is fixed at
    /// compile time, so a bad value is a programming error.
    pub fn new(gamma: u8) -> Self {
        assert_ne!(gamma, 0, "coupling constant must be non-zero");
        let det = gf_add(1, gf_mul(gamma, gamma));
        assert_ne!(det, 0, "coupling constant must not square to one");
        Self {
            gamma,
            gamma_inv: gf_inv(gamma),
            det,
            det_inv: gf_inv(det),
        }
    }

    /// Recover two missing roles from the two known ones.
    ///
    /// `known` and `missing` together must name all four roles. Every output
    /// is a fixed linear combination of the two inputs, so each missing
    /// region is written with one overwrite-multiply and one multiply-xor.
    pub fn recover(
        &self,
        known: [(PairRole, &[u8]); 2],
        missing: [(PairRole, &mut [u8]); 2],
    ) -> Result<()> {
        let [(ka, a), (kb, b)] = known;
        let [(m0, out0), (m1, out1)] = missing;

        let mut seen = [false; 4];
        for role in [ka, kb, m0, m1] {
            let slot = &mut seen[role as usize];
            if *slot {
                return Err(Error::Singular(format!("role {role:?} named twice")));
            }
            *slot = true;
        }
        if a.len() != b.len() || out0.len() != a.len() || out1.len() != a.len() {
            return Err(Error::Singular("pair regions differ in length".into()));
        }

        // Normalize to ascending role order so the coefficient table only
        // covers the six distinct known-pairs.
        let ((ka, a), (kb, b)) = if (ka as usize) < (kb as usize) {
            ((ka, a), (kb, b))
        } else {
            ((kb, b), (ka, a))
        };

        for (role, out) in [(m0, out0), (m1, out1)] {
            let (ca, cb) = self.coefficients(role, ka, kb);
            region_multiply(ca, a, out);
            region_multiply_xor(cb, b, out);
        }
        Ok(())
    }

    /// Coefficients `(ca, cb)` such that `target = ca * a + cb * b`, where
    /// `(a, b)` are the known roles in ascending order.
    fn coefficients(&self, target: PairRole, ka: PairRole, kb: PairRole) -> (u8, u8) {
        use PairRole::*;
        let (g, g_inv, det, det_inv) = (self.gamma, self.gamma_inv, self.det, self.det_inv);
        match (ka, kb, target) {
            // Known (C, C*): the decoupling direction
            (Coupled, CoupledStar, Uncoupled) => (1, g),
            (Coupled, CoupledStar, UncoupledStar) => (g, 1),
            // Known (U, U*): the coupling direction
            (Uncoupled, UncoupledStar, Coupled) => (det_inv, gf_mul(g, det_inv)),
            (Uncoupled, UncoupledStar, CoupledStar) => (gf_mul(g, det_inv), det_inv),
            // Mixed pairs: one coupled and one uncoupled value known
            (Coupled, UncoupledStar, CoupledStar) => (g, 1),
            (Coupled, UncoupledStar, Uncoupled) => (det, g),
            (CoupledStar, Uncoupled, Coupled) => (g, 1),
            (CoupledStar, Uncoupled, UncoupledStar) => (det, g),
            (CoupledStar, UncoupledStar, Coupled) => (g_inv, g_inv),
            (CoupledStar, UncoupledStar, Uncoupled) => (gf_mul(det, g_inv), g_inv),
            (Coupled, Uncoupled, CoupledStar) => (g_inv, g_inv),
            (Coupled, Uncoupled, UncoupledStar) => (gf_mul(det, g_inv), g_inv),
            // Unreachable after the role-permutation check
            _ => unreachable!("known roles {ka:?}/{kb:?} cannot produce {target:?}"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
