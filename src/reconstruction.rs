//! Layered erasure decoding
//!
//! The decoder walks layers in ascending intersection-score order. For a
//! layer whose score is `s`, every companion value it needs from a sibling
//! layer was produced while processing score `s - 1`, so each pass works
//! with fully resolved inputs:
//!
//! 1. For every surviving node, derive the layer's uncoupled value: red
//!    vertices copy straight through, paired vertices run the decoupling
//!    solve against their companion (using the companion's recovered chunk
//!    bytes when the companion is erased).
//! 2. Hand the layer to the scalar MDS codec to fill the erased uncoupled
//!    values.
//! 3. Materialize the stored bytes for each erased node: red vertices copy
//!    back, vertices with a surviving companion solve for one coupled value,
//!    and erased companion pairs are solved together from their two
//!    uncoupled values.
//!
//! Encoding reuses the same walk by declaring all parity nodes erased.

use std::collections::BTreeSet;

use tracing::trace;

use crate::buffer::SubChunkMatrix;
use crate::cube::{
    companion_layer, max_intersection_score, plane_decoding_order, plane_vector, to_xy,
};
use crate::error::Result;
use crate::mds::ScalarMds;
use crate::pair::{PairCodec, PairRole};
use crate::params::ClayParams;

/// Recover the chunk bytes of every node in `erased`.
///
/// `chunks` holds the coupled bytes of all `q * t` logical nodes (zeroed
/// regions for shortened and erased nodes); `u` is a zeroed scratch matrix of
/// the same shape. Both are mutated; on success the erased nodes' regions in
/// `chunks` hold their original bytes.
pub(crate) fn decode_layered(
    params: &ClayParams,
    pair: &PairCodec,
    mds: &ScalarMds,
    erased: &BTreeSet<usize>,
    chunks: &mut SubChunkMatrix,
    u: &mut SubChunkMatrix,
    scratch: &mut [u8],
) -> Result<()> {
    debug_assert!(!erased.is_empty());
    debug_assert!(erased.len() <= params.parity_chunks());

    // Pad the erasure set from the parity range up so the scalar MDS always
    // sees exactly m erasures per layer. Padded nodes are recomputed into
    // the arena and simply never read back.
    let mut erasures = erased.clone();
    for node in params.parity_start()..params.logical_nodes() {
        if erasures.len() == params.parity_chunks() {
            break;
        }
        erasures.insert(node);
    }

    let order = plane_decoding_order(params, &erasures);
    let max_iscore = max_intersection_score(params, &erasures);

    for iscore in 0..=max_iscore {
        for z in 0..params.alpha() {
            if order[z] == iscore {
                trace!(z, iscore, "resolving uncoupled layer");
                resolve_layer_uncoupled(params, pair, mds, &erasures, z, chunks, u)?;
            }
        }
        for z in 0..params.alpha() {
            if order[z] == iscore {
                materialize_layer_coupled(params, pair, &erasures, z, chunks, u, scratch)?;
            }
        }
    }

    Ok(())
}

/// Pass 1: fill `u` for every surviving node of layer `z`, then MDS-decode
/// the layer to fill the erased nodes' uncoupled values.
fn resolve_layer_uncoupled(
    params: &ClayParams,
    pair: &PairCodec,
    mds: &ScalarMds,
    erasures: &BTreeSet<usize>,
    z: usize,
    chunks: &SubChunkMatrix,
    u: &mut SubChunkMatrix,
) -> Result<()> {
    let z_vec = plane_vector(params, z);

    for x in 0..params.q() {
        for y in 0..params.t() {
            let node = y * params.q() + x;
            if erasures.contains(&node) {
                continue;
            }
            let z_y = z_vec[y];
            if z_y == x {
                // Red vertex: stored and uncoupled values coincide
                u.sub_mut(node, z).copy_from_slice(chunks.sub(node, z));
                continue;
            }

            let node_sw = y * params.q() + z_y;
            let z_sw = companion_layer(params, z, x, y, z_y);

            // A surviving pair is decoupled once, from the higher-x side.
            // When the companion is erased, its chunk bytes at the sibling
            // layer were recovered in the previous score round, and each
            // side runs the solve for itself.
            if z_y < x || erasures.contains(&node_sw) {
                let c_self = chunks.sub(node, z);
                let c_companion = chunks.sub(node_sw, z_sw);
                let (u_self, u_companion) = u.sub_pair_mut((node, z), (node_sw, z_sw));
                if x < z_y {
                    pair.recover(
                        [
                            (PairRole::Coupled, c_self),
                            (PairRole::CoupledStar, c_companion),
                        ],
                        [
                            (PairRole::Uncoupled, u_self),
                            (PairRole::UncoupledStar, u_companion),
                        ],
                    )?;
                } else {
                    pair.recover(
                        [
                            (PairRole::Coupled, c_companion),
                            (PairRole::CoupledStar, c_self),
                        ],
                        [
                            (PairRole::Uncoupled, u_companion),
                            (PairRole::UncoupledStar, u_self),
                        ],
                    )?;
                }
            }
        }
    }

    mds.decode_layer(u, z, erasures)
}

/// Pass 2: write the stored bytes of layer `z` for every erased node.
fn materialize_layer_coupled(
    params: &ClayParams,
    pair: &PairCodec,
    erasures: &BTreeSet<usize>,
    z: usize,
    chunks: &mut SubChunkMatrix,
    u: &SubChunkMatrix,
    scratch: &mut [u8],
) -> Result<()> {
    let z_vec = plane_vector(params, z);

    for &node in erasures {
        let (x, y) = to_xy(params, node);
        let z_y = z_vec[y];

        if z_y == x {
            // Red vertex: stored value is the uncoupled value
            chunks.sub_mut(node, z).copy_from_slice(u.sub(node, z));
            continue;
        }

        let node_sw = y * params.q() + z_y;
        let z_sw = companion_layer(params, z, x, y, z_y);

        if !erasures.contains(&node_sw) {
            // Surviving companion: one coupled value is missing; solve it
            // from the companion's stored bytes and our uncoupled value.
            let u_self = u.sub(node, z);
            let (c_self, c_companion) = chunks.sub_pair_mut((node, z), (node_sw, z_sw));
            let c_companion = &*c_companion;
            if x < z_y {
                pair.recover(
                    [
                        (PairRole::CoupledStar, c_companion),
                        (PairRole::Uncoupled, u_self),
                    ],
                    [
                        (PairRole::Coupled, c_self),
                        (PairRole::UncoupledStar, scratch),
                    ],
                )?;
            } else {
                pair.recover(
                    [
                        (PairRole::Coupled, c_companion),
                        (PairRole::UncoupledStar, u_self),
                    ],
                    [
                        (PairRole::CoupledStar, c_self),
                        (PairRole::Uncoupled, scratch),
                    ],
                )?;
            }
        } else if z_y < x {
            // Both sides erased: solve the full pair once, from the
            // higher-x side, out of the two uncoupled values.
            let u_self = u.sub(node, z);
            let u_companion = u.sub(node_sw, z_sw);
            let (c_self, c_companion) = chunks.sub_pair_mut((node, z), (node_sw, z_sw));
            pair.recover(
                [
                    (PairRole::Uncoupled, u_companion),
                    (PairRole::UncoupledStar, u_self),
                ],
                [
                    (PairRole::Coupled, c_companion),
                    (PairRole::CoupledStar, c_self),
                ],
            )?;
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds::ScalarMds;

    struct Fixture {
        params: ClayParams,
        pair: PairCodec,
        mds: ScalarMds,
    }

    impl Fixture {
        fn new(k: usize, m: usize, d: usize) -> Self {
            let params = ClayParams::new(k, m, d).unwrap();
            let mds = ScalarMds::new(params.parity_start(), params.parity_chunks()).unwrap();
            Self {
                params,
                pair: PairCodec::default(),
                mds,
            }
        }

        fn matrix(&self, sub_size: usize) -> SubChunkMatrix {
            SubChunkMatrix::zeroed(self.params.logical_nodes(), self.params.alpha(), sub_size)
                .unwrap()
        }

        /// Encode by declaring all parities erased, like the engine does
        fn encode_into(&self, chunks: &mut SubChunkMatrix, sub_size: usize) {
            let mut u = self.matrix(sub_size);
            let mut scratch = vec![0u8; sub_size];
            let parities: BTreeSet<usize> =
                (self.params.parity_start()..self.params.logical_nodes()).collect();
            decode_layered(
                &self.params,
                &self.pair,
                &self.mds,
                &parities,
                chunks,
                &mut u,
                &mut scratch,
            )
            .unwrap();
        }
    }

    fn fill_data(fx: &Fixture, chunks: &mut SubChunkMatrix) {
        for node in 0..fx.params.data_chunks() {
            for z in 0..fx.params.alpha() {
                let v = (node * 37 + z * 11 + 5) as u8;
                chunks.sub_mut(node, z).fill(v);
            }
        }
    }

    #[test]
    fn test_every_uncoupled_layer_is_a_codeword() {
        let fx = Fixture::new(4, 2, 5);
        let sub_size = 8;
        let mut chunks = fx.matrix(sub_size);
        let mut u = fx.matrix(sub_size);
        fill_data(&fx, &mut chunks);
        fx.encode_into(&mut chunks, sub_size);

        // Re-derive the uncoupled cube from the full stored cube: no
        // erasures, so every pair decouples directly.
        let none = BTreeSet::new();
        for z in 0..fx.params.alpha() {
            resolve_layer_uncoupled(&fx.params, &fx.pair, &fx.mds, &none, z, &chunks, &mut u)
                .unwrap();
        }

        // Each uncoupled layer must re-encode to itself
        for z in 0..fx.params.alpha() {
            let parity_before: Vec<Vec<u8>> = (fx.params.parity_start()
                ..fx.params.logical_nodes())
                .map(|node| u.sub(node, z).to_vec())
                .collect();
            fx.mds.encode_layer(&mut u, z).unwrap();
            for (i, node) in (fx.params.parity_start()..fx.params.logical_nodes()).enumerate() {
                assert_eq!(u.sub(node, z), &parity_before[i][..], "layer {z} node {node}");
            }
        }
    }

    #[test]
    fn test_decode_restores_erased_chunks() {
        let fx = Fixture::new(4, 2, 5);
        let sub_size = 4;
        let mut chunks = fx.matrix(sub_size);
        let mut u = fx.matrix(sub_size);
        let mut scratch = vec![0u8; sub_size];
        fill_data(&fx, &mut chunks);
        fx.encode_into(&mut chunks, sub_size);

        let original: Vec<Vec<u8>> = (0..fx.params.logical_nodes())
            .map(|node| chunks.node(node).to_vec())
            .collect();

        for erased_nodes in [vec![0], vec![5], vec![1, 4], vec![0, 1], vec![4, 5]] {
            let mut damaged = SubChunkMatrix::zeroed(
                fx.params.logical_nodes(),
                fx.params.alpha(),
                sub_size,
            )
            .unwrap();
            for node in 0..fx.params.logical_nodes() {
                if !erased_nodes.contains(&node) {
                    damaged.fill_node(node, &original[node]);
                }
            }
            u.zero();
            let erased: BTreeSet<usize> = erased_nodes.iter().copied().collect();
            decode_layered(
                &fx.params,
                &fx.pair,
                &fx.mds,
                &erased,
                &mut damaged,
                &mut u,
                &mut scratch,
            )
            .unwrap();
            for &node in &erased_nodes {
                assert_eq!(
                    damaged.node(node),
                    &original[node][..],
                    "node {node} of erasure {erased_nodes:?}"
                );
            }
        }
    }

    #[test]
    fn test_single_erasure_pads_to_m() {
        // One erased data chunk still decodes; the padded parity erasure is
        // recomputed into the arena unchanged.
        let fx = Fixture::new(4, 2, 5);
        let sub_size = 4;
        let mut chunks = fx.matrix(sub_size);
        let mut u = fx.matrix(sub_size);
        let mut scratch = vec![0u8; sub_size];
        fill_data(&fx, &mut chunks);
        fx.encode_into(&mut chunks, sub_size);
        let original: Vec<Vec<u8>> = (0..fx.params.logical_nodes())
            .map(|node| chunks.node(node).to_vec())
            .collect();

        chunks.fill_node(2, &vec![0u8; sub_size * fx.params.alpha()]);
        u.zero();
        let erased: BTreeSet<usize> = [2].into_iter().collect();
        decode_layered(
            &fx.params,
            &fx.pair,
            &fx.mds,
            &erased,
            &mut chunks,
            &mut u,
            &mut scratch,
        )
        .unwrap();
        for node in 0..fx.params.logical_nodes() {
            assert_eq!(chunks.node(node), &original[node][..], "node {node}");
        }
    }
}
