//! Scalar MDS collaborator
//!
//! Each layer of the uncoupled cube is a codeword of a systematic
//! `(k + nu, m)` Reed-Solomon code over GF(2^8), provided by the
//! `reed-solomon-erasure` crate. This wrapper adapts the shard-oriented
//! crate API to the engine's layer-at-a-time view of the
//! [`SubChunkMatrix`]: the layered decoder hands it a layer index and an
//! erasure set, and gets the missing uncoupled sub-chunks filled in.

use std::collections::BTreeSet;
use std::sync::Arc;

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::buffer::SubChunkMatrix;
use crate::error::{Error, Result};

/// Layer codec over the uncoupled sub-chunk matrix
#[derive(Clone)]
pub struct ScalarMds {
    rs: Arc<ReedSolomon>,
    data_shards: usize,
    parity_shards: usize,
}

impl ScalarMds {
    /// Build a `(data_shards, parity_shards)` systematic codec
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        let rs = ReedSolomon::new(data_shards, parity_shards)
            .map_err(|e| Error::ScalarMds(format!("codec construction failed: {e}")))?;
        Ok(Self {
            rs: Arc::new(rs),
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Fill the parity sub-chunks of layer `z` from its data sub-chunks
    pub fn encode_layer(&self, u: &mut SubChunkMatrix, z: usize) -> Result<()> {
        let mut shards: Vec<Vec<u8>> = (0..self.total_shards())
            .map(|node| u.sub(node, z).to_vec())
            .collect();
        self.rs
            .encode(&mut shards)
            .map_err(|e| Error::ScalarMds(format!("layer {z} encode failed: {e}")))?;
        for (node, shard) in shards.iter().enumerate().skip(self.data_shards) {
            u.sub_mut(node, z).copy_from_slice(shard);
        }
        Ok(())
    }

    /// Reconstruct the erased sub-chunks of layer `z` from the survivors.
    ///
    /// `erased` uses logical node indices; all other nodes of the layer must
    /// already hold valid uncoupled values.
    pub fn decode_layer(
        &self,
        u: &mut SubChunkMatrix,
        z: usize,
        erased: &BTreeSet<usize>,
    ) -> Result<()> {
        if erased.is_empty() {
            return Ok(());
        }
        if erased.len() > self.parity_shards {
            return Err(Error::InsufficientChunks {
                available: self.total_shards() - erased.len(),
                required: self.data_shards,
            });
        }

        // The crate only regenerates parity on encode, so take the
        // reconstruct path whenever a data shard is missing and the encode
        // path when the erasures are parity-only.
        if erased.iter().any(|&node| node < self.data_shards) {
            let mut shards: Vec<Option<Vec<u8>>> = (0..self.total_shards())
                .map(|node| {
                    if erased.contains(&node) {
                        None
                    } else {
                        Some(u.sub(node, z).to_vec())
                    }
                })
                .collect();
            self.rs
                .reconstruct(&mut shards)
                .map_err(|e| Error::ScalarMds(format!("layer {z} reconstruct failed: {e}")))?;
            for &node in erased {
                let shard = shards[node]
                    .as_ref()
                    .ok_or_else(|| Error::ScalarMds(format!("layer {z} left node {node} empty")))?;
                u.sub_mut(node, z).copy_from_slice(shard);
            }
        } else {
            self.encode_layer(u, z)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
