//! Aligned buffer regions
//!
//! The engine keeps its working state in `SIMD_ALIGN`-aligned buffers: one
//! region per logical node, each holding `alpha` contiguous sub-chunks.
//! [`SubChunkMatrix`] is the node-by-layer view used for both the uncoupled
//! (U) scratch state and the internal coupled (C) arena; addressing is always
//! `node -> base + z * sub_size`, never raw pointer arithmetic.

use crate::error::{Error, Result};
use crate::params::SIMD_ALIGN;

// =============================================================================
// Aligned Buffer
// =============================================================================

/// A heap region whose first byte is aligned to `SIMD_ALIGN`
pub struct AlignedBuf {
    raw: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    /// Allocate a zeroed region of `len` bytes
    pub fn zeroed(len: usize) -> Result<Self> {
        let mut raw = Vec::new();
        raw.try_reserve_exact(len + SIMD_ALIGN)
            .map_err(|_| Error::AllocationFailed { size: len })?;
        raw.resize(len + SIMD_ALIGN, 0);
        let offset = {
            let addr = raw.as_ptr() as usize;
            (SIMD_ALIGN - addr % SIMD_ALIGN) % SIMD_ALIGN
        };
        Ok(Self { raw, offset, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.raw[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..self.offset + self.len]
    }

    /// Reset the whole region to zero
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

// =============================================================================
// Sub-Chunk Matrix
// =============================================================================

/// Per-node regions of `sub_count` sub-chunks, `sub_size` bytes each
pub struct SubChunkMatrix {
    nodes: Vec<AlignedBuf>,
    sub_count: usize,
    sub_size: usize,
}

impl SubChunkMatrix {
    /// Allocate a zeroed matrix for `node_count` nodes
    pub fn zeroed(node_count: usize, sub_count: usize, sub_size: usize) -> Result<Self> {
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(AlignedBuf::zeroed(sub_count * sub_size)?);
        }
        Ok(Self {
            nodes,
            sub_count,
            sub_size,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn sub_count(&self) -> usize {
        self.sub_count
    }

    pub fn sub_size(&self) -> usize {
        self.sub_size
    }

    /// Whole region of one node
    pub fn node(&self, node: usize) -> &[u8] {
        self.nodes[node].as_slice()
    }

    /// Overwrite one node's region from a caller-supplied chunk
    pub fn fill_node(&mut self, node: usize, chunk: &[u8]) {
        self.nodes[node].as_mut_slice().copy_from_slice(chunk);
    }

    /// Sub-chunk `z` of `node`
    pub fn sub(&self, node: usize, z: usize) -> &[u8] {
        debug_assert!(z < self.sub_count);
        &self.nodes[node].as_slice()[z * self.sub_size..(z + 1) * self.sub_size]
    }

    /// Mutable sub-chunk `z` of `node`
    pub fn sub_mut(&mut self, node: usize, z: usize) -> &mut [u8] {
        debug_assert!(z < self.sub_count);
        &mut self.nodes[node].as_mut_slice()[z * self.sub_size..(z + 1) * self.sub_size]
    }

    /// Two mutable sub-chunks on distinct nodes
    pub fn sub_pair_mut(
        &mut self,
        a: (usize, usize),
        b: (usize, usize),
    ) -> (&mut [u8], &mut [u8]) {
        let ((node_a, z_a), (node_b, z_b)) = (a, b);
        assert_ne!(node_a, node_b, "sub-chunk pair must span distinct nodes");
        let size = self.sub_size;
        let (buf_a, buf_b) = if node_a < node_b {
            let (head, tail) = self.nodes.split_at_mut(node_b);
            (&mut head[node_a], &mut tail[0])
        } else {
            let (head, tail) = self.nodes.split_at_mut(node_a);
            (&mut tail[0], &mut head[node_b])
        };
        (
            &mut buf_a.as_mut_slice()[z_a * size..(z_a + 1) * size],
            &mut buf_b.as_mut_slice()[z_b * size..(z_b + 1) * size],
        )
    }

    /// Reset every node region to zero
    pub fn zero(&mut self) {
        for node in &mut self.nodes {
            node.zero();
        }
    }

    /// Whether this matrix can be reused for the given geometry
    pub fn matches(&self, node_count: usize, sub_count: usize, sub_size: usize) -> bool {
        self.nodes.len() == node_count && self.sub_count == sub_count && self.sub_size == sub_size
    }
}

// =============================================================================
// Tests
// =============================================================================
