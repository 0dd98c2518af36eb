//! Public coupled-layer codec engine
//!
//! [`ClayCodec`] ties the pieces together: parameter geometry, the pair
//! codec, the scalar MDS collaborator, and the layered decode/repair walks.
//! The engine itself is stateless across calls; the only shared mutable
//! state is an optional pool of uncoupled-value scratch matrices, guarded by
//! a mutex and keyed on geometry, so concurrent calls on clones or on one
//! instance never observe each other.
//!
//! Encoding is expressed as erasure recovery: load the data chunks, declare
//! every parity chunk erased, and run the layered decoder. Decoding
//! dispatches between the full layered decode and the bandwidth-optimal
//! repair path based on [`ClayCodec::is_repair`].

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::buffer::SubChunkMatrix;
use crate::error::{Error, Result};
use crate::mds::ScalarMds;
use crate::pair::PairCodec;
use crate::params::ClayParams;
use crate::reconstruction::decode_layered;
use crate::repair;

/// How many idle uncoupled-scratch matrices the engine keeps around
const U_POOL_LIMIT: usize = 2;

/// Clay (coupled-layer) erasure codec over GF(2^8)
pub struct ClayCodec {
    params: ClayParams,
    pair: PairCodec,
    mds: ScalarMds,
    u_pool: Mutex<Vec<SubChunkMatrix>>,
}

impl Clone for ClayCodec {
    fn clone(&self) -> Self {
        Self {
            params: self.params,
            pair: self.pair.clone(),
            mds: self.mds.clone(),
            u_pool: Mutex::new(Vec::new()),
        }
    }
}

impl ClayCodec {
    /// Build a codec for `k` data chunks, `m` parity chunks, and `d` repair
    /// helpers (`k <= d <= k + m - 1`).
    pub fn new(k: usize, m: usize, d: usize) -> Result<Self> {
        let params = ClayParams::new(k, m, d)?;
        let mds = ScalarMds::new(params.parity_start(), params.parity_chunks())?;
        Ok(Self {
            params,
            pair: PairCodec::default(),
            mds,
            u_pool: Mutex::new(Vec::new()),
        })
    }

    /// Build with the maximum helper count `d = k + m - 1`
    pub fn new_default(k: usize, m: usize) -> Result<Self> {
        Self::new(k, m, k + m - 1)
    }

    /// The validated code geometry
    pub fn params(&self) -> &ClayParams {
        &self.params
    }

    /// Number of data chunks (k)
    pub fn data_chunks(&self) -> usize {
        self.params.data_chunks()
    }

    /// Number of parity chunks (m)
    pub fn parity_chunks(&self) -> usize {
        self.params.parity_chunks()
    }

    /// Number of physical chunks (k + m)
    pub fn total_chunks(&self) -> usize {
        self.params.total_chunks()
    }

    /// Sub-chunks per chunk (alpha)
    pub fn sub_chunk_count(&self) -> usize {
        self.params.sub_chunk_count()
    }

    /// Per-chunk size for an object of the given length; see
    /// [`ClayParams::chunk_size`]
    pub fn chunk_size(&self, object_size: usize) -> usize {
        self.params.chunk_size(object_size)
    }

    // =========================================================================
    // Encode
    // =========================================================================

    /// Compute the `m` parity chunks for `k` equal-size data chunks.
    ///
    /// Chunk sizes must be non-zero multiples of `alpha`.
    #[instrument(skip(self, data), fields(k = self.params.data_chunks()))]
    pub fn encode(&self, data: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        if data.len() != self.params.data_chunks() {
            return Err(Error::InvalidInput(format!(
                "expected {} data chunks, got {}",
                self.params.data_chunks(),
                data.len()
            )));
        }
        let chunk_size = data[0].len();
        self.check_chunk_size(chunk_size)?;
        for (i, chunk) in data.iter().enumerate() {
            if chunk.len() != chunk_size {
                return Err(Error::InconsistentChunkSizes {
                    index: i,
                    expected: chunk_size,
                    actual: chunk.len(),
                });
            }
        }

        let sub_size = chunk_size / self.params.alpha();
        let mut arena = self.node_arena(chunk_size)?;
        for (i, chunk) in data.iter().enumerate() {
            arena.fill_node(i, chunk);
        }

        let parities: BTreeSet<usize> =
            (self.params.parity_start()..self.params.logical_nodes()).collect();
        self.run_layered(&parities, &mut arena, sub_size)?;

        debug!(
            chunk_size,
            parity = self.params.parity_chunks(),
            "encoded stripe"
        );
        Ok((self.params.parity_start()..self.params.logical_nodes())
            .map(|node| arena.node(node).to_vec())
            .collect())
    }

    /// Encode a raw object: pad to `chunk_size(object.len())`, split into
    /// `k` data chunks, and append the `m` parities. Returns all `k + m`
    /// chunks.
    pub fn encode_object(&self, object: &[u8]) -> Result<Vec<Vec<u8>>> {
        let chunk_size = self.params.chunk_size(object.len());
        let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(self.params.total_chunks());
        for i in 0..self.params.data_chunks() {
            let start = (i * chunk_size).min(object.len());
            let end = ((i + 1) * chunk_size).min(object.len());
            let mut chunk = object[start..end].to_vec();
            chunk.resize(chunk_size, 0);
            chunks.push(chunk);
        }
        let parities = self.encode(&chunks)?;
        chunks.extend(parities);
        Ok(chunks)
    }

    /// Re-encode the data chunks and compare against the supplied parities
    pub fn verify(&self, chunks: &[Vec<u8>]) -> Result<bool> {
        if chunks.len() != self.params.total_chunks() {
            return Err(Error::InvalidInput(format!(
                "expected {} chunks, got {}",
                self.params.total_chunks(),
                chunks.len()
            )));
        }
        let parities = self.encode(&chunks[..self.params.data_chunks()])?;
        Ok(parities
            .iter()
            .zip(&chunks[self.params.data_chunks()..])
            .all(|(computed, supplied)| computed == supplied))
    }

    // =========================================================================
    // Decode
    // =========================================================================

    /// Whether reading `want_to_read` from `available` takes the
    /// bandwidth-optimal repair path instead of a full decode
    pub fn is_repair(&self, want_to_read: &BTreeSet<usize>, available: &BTreeSet<usize>) -> bool {
        repair::is_repair(&self.params, want_to_read, available)
    }

    /// For the optimal helper set, which sub-chunk `(offset, count)` ranges
    /// each helper must provide to serve `want_to_read`. Ranges are in
    /// sub-chunk units; a full chunk reads as `(0, alpha)`.
    pub fn minimum_to_decode(
        &self,
        want_to_read: &BTreeSet<usize>,
        available: &BTreeSet<usize>,
    ) -> Result<BTreeMap<usize, Vec<(usize, usize)>>> {
        if self.is_repair(want_to_read, available) {
            return repair::minimum_to_repair(&self.params, want_to_read, available);
        }

        if available.len() < self.params.data_chunks() {
            return Err(Error::InsufficientChunks {
                available: available.len(),
                required: self.params.data_chunks(),
            });
        }
        let mut minimum: BTreeMap<usize, Vec<(usize, usize)>> = want_to_read
            .iter()
            .filter(|i| available.contains(*i))
            .map(|&i| (i, vec![(0, self.params.alpha())]))
            .collect();
        for &i in available {
            if minimum.len() >= self.params.data_chunks() {
                break;
            }
            minimum.entry(i).or_insert_with(|| vec![(0, self.params.alpha())]);
        }
        Ok(minimum)
    }

    /// Helper set and per-helper sub-chunk ranges for an explicit repair of
    /// the erasure pattern `want_to_read`.
    ///
    /// Unlike [`minimum_to_decode`](Self::minimum_to_decode), which only
    /// routes single-chunk reads to the repair path, this accepts
    /// multi-chunk patterns and fails with `UnrepairablePattern` when the
    /// y-section rules rule partial reads out.
    pub fn minimum_to_repair(
        &self,
        want_to_read: &BTreeSet<usize>,
        available: &BTreeSet<usize>,
    ) -> Result<BTreeMap<usize, Vec<(usize, usize)>>> {
        repair::minimum_to_repair(&self.params, want_to_read, available)
    }

    /// Recover the chunks in `want_to_read` from the supplied chunks.
    ///
    /// Dispatches to the repair path when [`is_repair`](Self::is_repair)
    /// holds (single wanted chunk, partial helper reads); otherwise runs the
    /// full layered decode, which accepts any erasure pattern of up to `m`
    /// chunks.
    #[instrument(skip(self, chunks), fields(want = want_to_read.len(), have = chunks.len()))]
    pub fn decode(
        &self,
        want_to_read: &BTreeSet<usize>,
        chunks: &BTreeMap<usize, Vec<u8>>,
        chunk_size: usize,
    ) -> Result<BTreeMap<usize, Vec<u8>>> {
        self.check_indices(want_to_read.iter().copied())?;
        self.check_indices(chunks.keys().copied())?;

        let available: BTreeSet<usize> = chunks.keys().copied().collect();
        if self.is_repair(want_to_read, &available) {
            self.check_chunk_size(chunk_size)?;
            let sub_size = chunk_size / self.params.alpha();
            let partial_len =
                self.params.repair_subchunk_count(want_to_read.iter().copied()) * sub_size;

            if chunks.values().all(|c| c.len() == partial_len) {
                // Helpers supplied exactly the repair sub-chunks
                let helper_reads: BTreeMap<usize, &[u8]> = chunks
                    .iter()
                    .map(|(&i, bytes)| (i, bytes.as_slice()))
                    .collect();
                return self.repair(want_to_read, &helper_reads, chunk_size);
            }
            if chunks.values().all(|c| c.len() == chunk_size) {
                // Full chunks supplied: cut the repair layers out ourselves
                let ranges = repair::minimum_to_repair(&self.params, want_to_read, &available)?;
                let sliced: BTreeMap<usize, Vec<u8>> = ranges
                    .iter()
                    .map(|(&helper, runs)| {
                        let chunk = &chunks[&helper];
                        let mut bytes = Vec::with_capacity(partial_len);
                        for &(start, count) in runs {
                            bytes.extend_from_slice(
                                &chunk[start * sub_size..(start + count) * sub_size],
                            );
                        }
                        (helper, bytes)
                    })
                    .collect();
                let helper_reads: BTreeMap<usize, &[u8]> = sliced
                    .iter()
                    .map(|(&i, bytes)| (i, bytes.as_slice()))
                    .collect();
                return self.repair(want_to_read, &helper_reads, chunk_size);
            }
            return Err(Error::InvalidInput(format!(
                "repair reads must be {partial_len} bytes (repair sub-chunks) or \
                 {chunk_size} bytes (full chunks)"
            )));
        }
        self.decode_full(want_to_read, chunks, chunk_size)
    }

    /// Full layered decode of every missing chunk, returning the wanted ones
    fn decode_full(
        &self,
        want_to_read: &BTreeSet<usize>,
        chunks: &BTreeMap<usize, Vec<u8>>,
        chunk_size: usize,
    ) -> Result<BTreeMap<usize, Vec<u8>>> {
        self.check_indices(want_to_read.iter().copied())?;
        self.check_indices(chunks.keys().copied())?;
        self.check_chunk_size(chunk_size)?;
        for (&i, chunk) in chunks {
            if chunk.len() != chunk_size {
                return Err(Error::InconsistentChunkSizes {
                    index: i,
                    expected: chunk_size,
                    actual: chunk.len(),
                });
            }
        }

        let erased_physical: BTreeSet<usize> = (0..self.params.total_chunks())
            .filter(|i| !chunks.contains_key(i))
            .collect();
        if erased_physical.len() > self.params.parity_chunks() {
            return Err(Error::InsufficientChunks {
                available: chunks.len(),
                required: self.params.data_chunks(),
            });
        }

        if erased_physical.is_empty() {
            return Ok(want_to_read
                .iter()
                .map(|&i| (i, chunks[&i].clone()))
                .collect());
        }

        let sub_size = chunk_size / self.params.alpha();
        let mut arena = self.node_arena(chunk_size)?;
        for (&i, chunk) in chunks {
            arena.fill_node(self.params.to_logical(i), chunk);
        }
        let erased: BTreeSet<usize> = erased_physical
            .iter()
            .map(|&i| self.params.to_logical(i))
            .collect();

        self.run_layered(&erased, &mut arena, sub_size)?;

        debug!(
            erased = erased_physical.len(),
            chunk_size, "decoded erasure pattern"
        );
        Ok(want_to_read
            .iter()
            .map(|&i| (i, arena.node(self.params.to_logical(i)).to_vec()))
            .collect())
    }

    /// Decode an object encoded with [`encode_object`](Self::encode_object)
    pub fn decode_object(
        &self,
        chunks: &BTreeMap<usize, Vec<u8>>,
        object_size: usize,
    ) -> Result<Vec<u8>> {
        let chunk_size = chunks
            .values()
            .next()
            .map(|c| c.len())
            .ok_or(Error::InsufficientChunks {
                available: 0,
                required: self.params.data_chunks(),
            })?;
        let want: BTreeSet<usize> = (0..self.params.data_chunks()).collect();
        let decoded = self.decode(&want, chunks, chunk_size)?;

        let mut object = Vec::with_capacity(object_size);
        for i in 0..self.params.data_chunks() {
            object.extend_from_slice(&decoded[&i]);
        }
        object.truncate(object_size);
        Ok(object)
    }

    // =========================================================================
    // Repair
    // =========================================================================

    /// Rebuild the chunks in `want_to_read` from partial helper reads.
    ///
    /// Each entry of `helper_reads` holds the repair sub-chunks named by
    /// [`minimum_to_decode`](Self::minimum_to_decode), concatenated in
    /// ascending layer order. Unlike [`decode`](Self::decode), this entry
    /// point accepts multi-chunk erasure patterns when they satisfy the
    /// y-section rules.
    #[instrument(skip(self, helper_reads), fields(want = want_to_read.len(), helpers = helper_reads.len()))]
    pub fn repair(
        &self,
        want_to_read: &BTreeSet<usize>,
        helper_reads: &BTreeMap<usize, &[u8]>,
        chunk_size: usize,
    ) -> Result<BTreeMap<usize, Vec<u8>>> {
        self.check_chunk_size(chunk_size)?;
        let sub_size = chunk_size / self.params.alpha();
        let mut u = self.acquire_u(sub_size)?;
        let mut scratch = vec![0u8; sub_size];

        let result = repair::repair_lost_chunks(
            &self.params,
            &self.pair,
            &self.mds,
            want_to_read,
            helper_reads,
            chunk_size,
            &mut u,
            &mut scratch,
        );
        self.release_u(u);

        if result.is_ok() {
            debug!(
                lost = want_to_read.len(),
                chunk_size, "repaired from partial reads"
            );
        }
        result
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run the layered decoder over a prepared arena with a pooled scratch
    /// matrix.
    fn run_layered(
        &self,
        erased: &BTreeSet<usize>,
        arena: &mut SubChunkMatrix,
        sub_size: usize,
    ) -> Result<()> {
        let mut u = self.acquire_u(sub_size)?;
        let mut scratch = vec![0u8; sub_size];
        let result = decode_layered(
            &self.params,
            &self.pair,
            &self.mds,
            erased,
            arena,
            &mut u,
            &mut scratch,
        );
        self.release_u(u);
        result
    }

    /// Zeroed arena with one region per logical node
    fn node_arena(&self, chunk_size: usize) -> Result<SubChunkMatrix> {
        SubChunkMatrix::zeroed(
            self.params.logical_nodes(),
            self.params.alpha(),
            chunk_size / self.params.alpha(),
        )
    }

    fn acquire_u(&self, sub_size: usize) -> Result<SubChunkMatrix> {
        let nodes = self.params.logical_nodes();
        let alpha = self.params.alpha();
        let mut pool = self.u_pool.lock();
        if let Some(pos) = pool.iter().position(|m| m.matches(nodes, alpha, sub_size)) {
            let mut matrix = pool.swap_remove(pos);
            drop(pool);
            matrix.zero();
            return Ok(matrix);
        }
        drop(pool);
        SubChunkMatrix::zeroed(nodes, alpha, sub_size)
    }

    fn release_u(&self, matrix: SubChunkMatrix) {
        let mut pool = self.u_pool.lock();
        if pool.len() < U_POOL_LIMIT {
            pool.push(matrix);
        }
    }

    fn check_chunk_size(&self, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 || chunk_size % self.params.alpha() != 0 {
            return Err(Error::InvalidChunkSize {
                size: chunk_size,
                alpha: self.params.alpha(),
            });
        }
        Ok(())
    }

    fn check_indices(&self, indices: impl IntoIterator<Item = usize>) -> Result<()> {
        for i in indices {
            if i >= self.params.total_chunks() {
                return Err(Error::InvalidInput(format!(
                    "chunk index {i} out of range [0, {})",
                    self.params.total_chunks()
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
