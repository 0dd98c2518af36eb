//! Code parameter derivation and validation
//!
//! A Clay code is configured by `(k, m, d)`: `k` data chunks, `m` parity
//! chunks, and `d` helper chunks contacted during repair. Everything else is
//! derived:
//!
//! - coupling factor `q = d - k + 1` (the bandwidth reduction over plain RS)
//! - y-section count `t = (k + m + nu) / q`
//! - shortening count `nu`, the smallest value making `q` divide `k + m`
//! - sub-packetization `alpha = q^t` (sub-chunks per chunk)
//! - per-helper repair sub-chunks `beta = alpha / q`
//!
//! The code operates internally on `q * t` logical nodes: `k` data nodes,
//! `nu` zero-filled shortened nodes, then `m` parity nodes. Shortened nodes
//! never appear in the physical chunk set, so external (physical) chunk
//! indices `[0, k + m)` are shifted past the shortened range when they refer
//! to parity chunks.

use crate::error::{Error, Result};

/// Hard alignment boundary for internal buffers and padded chunk sizes.
pub const SIMD_ALIGN: usize = 32;

/// One field element is reserved, so `k + m + nu` must stay below this.
const MAX_LOGICAL_NODES: usize = 254;

/// Validated Clay code parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClayParams {
    k: usize,
    m: usize,
    d: usize,
    q: usize,
    t: usize,
    nu: usize,
    sub_chunk_no: usize,
    beta: usize,
}

impl ClayParams {
    /// Validate `(k, m, d)` and derive the coupled-layer geometry
    pub fn new(k: usize, m: usize, d: usize) -> Result<Self> {
        if k < 2 {
            return Err(Error::InvalidK(k));
        }
        if m < 1 {
            return Err(Error::InvalidM(m));
        }
        if d < k || d > k + m - 1 {
            return Err(Error::InvalidD {
                d,
                min: k,
                max: k + m - 1,
            });
        }

        let q = d - k + 1;
        let nu = if (k + m) % q == 0 {
            0
        } else {
            q - (k + m) % q
        };

        if k + m + nu > MAX_LOGICAL_NODES {
            return Err(Error::CodeTooLarge {
                nodes: k + m + nu,
                max: MAX_LOGICAL_NODES,
            });
        }

        let t = (k + m + nu) / q;
        let sub_chunk_no = q.pow(t as u32);

        Ok(Self {
            k,
            m,
            d,
            q,
            t,
            nu,
            sub_chunk_no,
            beta: sub_chunk_no / q,
        })
    }

    /// Number of data chunks (k)
    pub fn data_chunks(&self) -> usize {
        self.k
    }

    /// Number of parity chunks (m)
    pub fn parity_chunks(&self) -> usize {
        self.m
    }

    /// Number of physical chunks (n = k + m)
    pub fn total_chunks(&self) -> usize {
        self.k + self.m
    }

    /// Minimum number of chunks required for a full decode
    pub fn min_chunks_to_decode(&self) -> usize {
        self.k
    }

    /// Number of helper chunks contacted for single-chunk repair (d)
    pub fn helpers(&self) -> usize {
        self.d
    }

    /// Coupling factor q = d - k + 1
    pub fn q(&self) -> usize {
        self.q
    }

    /// Number of y-sections
    pub fn t(&self) -> usize {
        self.t
    }

    /// Shortening count nu
    pub fn nu(&self) -> usize {
        self.nu
    }

    /// Sub-packetization alpha = q^t: sub-chunks per chunk
    pub fn alpha(&self) -> usize {
        self.sub_chunk_no
    }

    /// Alias for [`alpha`](Self::alpha), matching the external interface name
    pub fn sub_chunk_count(&self) -> usize {
        self.sub_chunk_no
    }

    /// Sub-chunks fetched from each helper during single-chunk repair
    pub fn beta(&self) -> usize {
        self.beta
    }

    /// Number of logical nodes (q * t = k + m + nu)
    pub(crate) fn logical_nodes(&self) -> usize {
        self.q * self.t
    }

    /// First parity node in logical index space
    pub(crate) fn parity_start(&self) -> usize {
        self.k + self.nu
    }

    /// Map a physical chunk index to its logical node index
    pub(crate) fn to_logical(&self, chunk: usize) -> usize {
        if chunk < self.k {
            chunk
        } else {
            chunk + self.nu
        }
    }

    /// Map a logical node index back to its physical chunk index.
    ///
    /// Must not be called for shortened nodes; they have no physical chunk.
    pub(crate) fn to_physical(&self, node: usize) -> usize {
        debug_assert!(!self.is_shortened(node));
        if node < self.k {
            node
        } else {
            node - self.nu
        }
    }

    /// Whether a logical node index falls in the shortened (zero) range
    pub(crate) fn is_shortened(&self, node: usize) -> bool {
        (self.k..self.k + self.nu).contains(&node)
    }

    // =========================================================================
    // Sizing
    // =========================================================================

    /// Padded-object alignment: chunk sizes derived from it are divisible by
    /// `alpha` and every chunk stays `SIMD_ALIGN`-aligned.
    pub fn alignment(&self) -> usize {
        self.k * self.sub_chunk_no * SIMD_ALIGN
    }

    /// Per-chunk size for an object of `object_size` bytes.
    ///
    /// Guarantees `chunk_size * k >= object_size` and
    /// `chunk_size % alpha == 0`.
    pub fn chunk_size(&self, object_size: usize) -> usize {
        let alignment = self.alignment();
        let padded = object_size.div_ceil(alignment).max(1) * alignment;
        padded / self.k
    }

    // =========================================================================
    // Repair Bandwidth Accounting
    // =========================================================================

    /// Sub-chunks each helper must supply to repair the erasure pattern
    /// `erased` (physical indices): `alpha - prod_y (q - e_y)`.
    pub fn repair_subchunk_count(&self, erased: impl IntoIterator<Item = usize>) -> usize {
        let mut weight = vec![0usize; self.t];
        for chunk in erased {
            weight[self.to_logical(chunk) / self.q] += 1;
        }
        let untouched: usize = weight.iter().map(|&e| self.q - e.min(self.q)).product();
        self.sub_chunk_no - untouched
    }

    /// Number of helpers a repair of `erased` contacts: `d` for a single
    /// failure, more when the per-layer erasure budget forces extra
    /// survivors out of the aloof set.
    pub fn repair_helper_count(&self, erased: impl IntoIterator<Item = usize>) -> usize {
        let mut touched = vec![false; self.t];
        let mut failed = 0usize;
        for chunk in erased {
            touched[self.to_logical(chunk) / self.q] = true;
            failed += 1;
        }
        let section_nodes = touched.iter().filter(|&&t| t).count() * self.q;
        let survivors = self.total_chunks() - failed;

        // Each layer's MDS decode erases the touched sections in full plus
        // every aloof survivor, and can absorb at most m erasures.
        let aloof_budget = self.m.saturating_sub(section_nodes);
        self.d
            .min(survivors)
            .max(survivors.saturating_sub(aloof_budget))
            .min(survivors)
    }

    /// Total bytes read from helpers to repair `erased`, for chunks of
    /// `chunk_size` bytes. Callers should fall back to a full decode when
    /// this reaches `k * chunk_size`.
    pub fn repair_bandwidth_bytes(
        &self,
        erased: impl IntoIterator<Item = usize> + Clone,
        chunk_size: usize,
    ) -> usize {
        let helper_count = self.repair_helper_count(erased.clone());
        let sub_size = chunk_size / self.sub_chunk_no;
        helper_count * self.repair_subchunk_count(erased) * sub_size
    }

    /// Ratio of repair traffic to repaired data, `d / (k * q)`.
    pub fn normalized_repair_bandwidth(&self) -> f64 {
        self.d as f64 / (self.k as f64 * self.q as f64)
    }
}

// =============================================================================
// Tests
// =============================================================================
