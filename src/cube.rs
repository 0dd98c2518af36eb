//! Data-cube indexing
//!
//! A codeword is a cube of vertices `(x, y, z)`: node `(x, y)` at layer `z`,
//! with `x` the position inside a y-section (`0..q`), `y` the section
//! (`0..t`), and `z` one of `alpha = q^t` layers. Layer `z` is identified by
//! its base-q plane vector; digit `y` carries weight `q^(t-1-y)`, so the
//! most significant digit belongs to section 0.
//!
//! A vertex is *red* when `x` equals the layer's digit for its section.
//! Every non-red vertex `(x, y, z)` has a unique companion
//! `(z_y, y, z_sw)` where `z_sw` is `z` with digit `y` replaced by `x`; the
//! two are linked by the pairwise coupling transform. Red vertices are
//! stored uncoupled.
//!
//! Everything here is pure index arithmetic; buffers never appear.

use std::collections::BTreeSet;

use crate::params::ClayParams;

/// Cube coordinates `(x, y)` of a logical node
#[inline]
pub fn to_xy(params: &ClayParams, node: usize) -> (usize, usize) {
    (node % params.q(), node / params.q())
}

/// Base-q plane vector of layer `z`; element `y` has weight `q^(t-1-y)`
pub fn plane_vector(params: &ClayParams, z: usize) -> Vec<usize> {
    let (q, t) = (params.q(), params.t());
    let mut z_vec = vec![0usize; t];
    let mut rem = z;
    for i in 0..t {
        z_vec[t - 1 - i] = rem % q;
        rem /= q;
    }
    z_vec
}

/// Whether vertex `(x, y, z)` is red (unpaired) given the layer's plane vector
#[inline]
pub fn is_red(x: usize, y: usize, z_vec: &[usize]) -> bool {
    z_vec[y] == x
}

/// Companion layer of vertex `(x, y, z)`: `z` with digit `y` replaced by `x`
#[inline]
pub fn companion_layer(params: &ClayParams, z: usize, x: usize, y: usize, z_y: usize) -> usize {
    let weight = params.q().pow((params.t() - 1 - y) as u32);
    // x and z_y are both digits, so the subtraction cannot underflow past z
    (z + x * weight) - z_y * weight
}

/// Intersection score of layer `z`: erased nodes sitting on red vertices
pub fn intersection_score(
    params: &ClayParams,
    z_vec: &[usize],
    erased: &BTreeSet<usize>,
) -> usize {
    erased
        .iter()
        .filter(|&&node| node % params.q() == z_vec[node / params.q()])
        .count()
}

/// Per-layer decode order: `order[z]` is the intersection score of `z`
pub fn plane_decoding_order(params: &ClayParams, erased: &BTreeSet<usize>) -> Vec<usize> {
    (0..params.alpha())
        .map(|z| intersection_score(params, &plane_vector(params, z), erased))
        .collect()
}

/// Highest intersection score any layer reaches: the number of distinct
/// y-sections touched by `erased`
pub fn max_intersection_score(params: &ClayParams, erased: &BTreeSet<usize>) -> usize {
    let mut touched = vec![false; params.t()];
    let mut iscore = 0;
    for &node in erased {
        let y = node / params.q();
        if !touched[y] {
            touched[y] = true;
            iscore += 1;
        }
    }
    iscore
}

/// Layers a helper must supply to repair `lost_node`, as `(start, count)`
/// runs of contiguous layer indices: exactly the layers where the lost node
/// is red. There are `q^y` runs of `q^(t-1-y)` layers each.
pub fn repair_subchunk_ranges(params: &ClayParams, lost_node: usize) -> Vec<(usize, usize)> {
    let (x_lost, y_lost) = to_xy(params, lost_node);
    let run_len = params.q().pow((params.t() - 1 - y_lost) as u32);
    let run_count = params.q().pow(y_lost as u32);

    let mut runs = Vec::with_capacity(run_count);
    let mut start = x_lost * run_len;
    for _ in 0..run_count {
        runs.push((start, run_len));
        start += params.q() * run_len;
    }
    runs
}

/// Flattened [`repair_subchunk_ranges`]: the `beta` layer indices, ascending
pub fn repair_subchunk_indices(params: &ClayParams, lost_node: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity(params.beta());
    for (start, count) in repair_subchunk_ranges(params, lost_node) {
        indices.extend(start..start + count);
    }
    indices
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ClayParams {
        ClayParams::new(4, 2, 5).unwrap() // q=2, t=3, alpha=8
    }

    #[test]
    fn test_plane_vector_digits() {
        let p = params();
        // Most significant digit first: z=1 -> [0,0,1], z=4 -> [1,0,0]
        assert_eq!(plane_vector(&p, 0), vec![0, 0, 0]);
        assert_eq!(plane_vector(&p, 1), vec![0, 0, 1]);
        assert_eq!(plane_vector(&p, 4), vec![1, 0, 0]);
        assert_eq!(plane_vector(&p, 7), vec![1, 1, 1]);

        let p3 = ClayParams::new(9, 3, 11).unwrap(); // q=3, t=4
        assert_eq!(plane_vector(&p3, 5), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_companion_is_involutive() {
        let p = params();
        for z in 0..p.alpha() {
            let z_vec = plane_vector(&p, z);
            for y in 0..p.t() {
                for x in 0..p.q() {
                    if is_red(x, y, &z_vec) {
                        continue;
                    }
                    let z_sw = companion_layer(&p, z, x, y, z_vec[y]);
                    assert!(z_sw < p.alpha());
                    // The companion's companion is the original vertex
                    let sw_vec = plane_vector(&p, z_sw);
                    assert_eq!(sw_vec[y], x);
                    let back = companion_layer(&p, z_sw, z_vec[y], y, sw_vec[y]);
                    assert_eq!(back, z);
                }
            }
        }
    }

    #[test]
    fn test_intersection_scores() {
        let p = params();
        let erased: BTreeSet<usize> = [0].into_iter().collect();
        // Node 0 is (x=0, y=0); it is red exactly when digit 0 is 0,
        // i.e. in layers 0..4.
        let order = plane_decoding_order(&p, &erased);
        assert_eq!(order, vec![1, 1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(max_intersection_score(&p, &erased), 1);

        // Two erasures in distinct y-sections can overlap in one layer
        let erased: BTreeSet<usize> = [0, 2].into_iter().collect();
        assert_eq!(max_intersection_score(&p, &erased), 2);
        let order = plane_decoding_order(&p, &erased);
        assert_eq!(order.iter().copied().max(), Some(2));

        // Same y-section: scores never stack
        let erased: BTreeSet<usize> = [0, 1].into_iter().collect();
        assert_eq!(max_intersection_score(&p, &erased), 1);
    }

    #[test]
    fn test_repair_subchunks_are_red_layers() {
        let p = params();
        for node in 0..p.logical_nodes() {
            let indices = repair_subchunk_indices(&p, node);
            assert_eq!(indices.len(), p.beta());
            assert!(indices.windows(2).all(|w| w[0] < w[1]));
            let (x, y) = to_xy(&p, node);
            for z in 0..p.alpha() {
                let red = plane_vector(&p, z)[y] == x;
                assert_eq!(indices.contains(&z), red, "node {node} layer {z}");
            }
        }
    }

    #[test]
    fn test_repair_subchunk_run_shape() {
        // (14, 10, 13): q=4, t=4; node at y=1 has q runs of q^2 layers
        let p = ClayParams::new(10, 4, 13).unwrap();
        let runs = repair_subchunk_ranges(&p, 5); // x=1, y=1
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|&(_, count)| count == 16));
        assert_eq!(runs[0].0, 16);
        assert_eq!(runs[1].0, 16 + 64);
    }
}
