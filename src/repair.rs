//! Bandwidth-optimal repair
//!
//! Repairing a chunk does not need `k` full chunks: each helper contributes
//! only the layers in which a lost node is red. Helper selection must take
//! every survivor of a lost node's y-section (their stored bytes seed the
//! coupled solves for the lost node's non-red layers), then fills the
//! remaining slots from other sections.
//!
//! The repair walk mirrors the layered decoder, ordered by repair order
//! `ord(z)` (lost and aloof nodes sitting on red vertices of `z`). Within
//! one order bucket, every plane first resolves its uncoupled values (helper
//! copies, pair solves, then scalar MDS with the lost sections and aloof
//! nodes as erasures); only then are the lost nodes' stored bytes
//! materialized, so cross-plane reads inside a bucket always hit resolved
//! state. Aloof companions are read strictly from lower buckets; a miss
//! means the pattern was not repairable in the first place.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::buffer::SubChunkMatrix;
use crate::cube::{companion_layer, plane_vector, repair_subchunk_indices, to_xy};
use crate::error::{Error, Result};
use crate::mds::ScalarMds;
use crate::pair::{PairCodec, PairRole};
use crate::params::ClayParams;

// =============================================================================
// Helper Selection
// =============================================================================

/// Whether `decode` may take the repair path: a single wanted chunk, all of
/// its y-section companions surviving, and at least `d` survivors overall.
pub(crate) fn is_repair(
    params: &ClayParams,
    want_to_read: &BTreeSet<usize>,
    available: &BTreeSet<usize>,
) -> bool {
    if want_to_read.iter().all(|i| available.contains(i)) {
        return false;
    }
    if want_to_read.len() != 1 {
        return false;
    }

    let Some(&lost) = want_to_read.iter().next() else {
        return false;
    };
    if lost >= params.total_chunks() {
        return false;
    }
    let lost_node = params.to_logical(lost);
    let y = lost_node / params.q();
    for x in 0..params.q() {
        let node = y * params.q() + x;
        if node == lost_node || params.is_shortened(node) {
            continue;
        }
        if !available.contains(&params.to_physical(node)) {
            return false;
        }
    }

    available.len() >= params.helpers()
}

/// Select helpers and the sub-chunk ranges each must supply to repair
/// `want_to_read`. Ranges are `(first_sub_chunk, count)` pairs, identical
/// for every helper; multiply by the sub-chunk byte size for I/O offsets.
pub(crate) fn minimum_to_repair(
    params: &ClayParams,
    want_to_read: &BTreeSet<usize>,
    available: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, Vec<(usize, usize)>>> {
    validate_chunk_indices(params, want_to_read.iter().copied())?;
    if want_to_read.is_empty() {
        return Err(Error::InvalidInput("no chunks requested for repair".into()));
    }
    if let Some(&i) = want_to_read.iter().find(|i| available.contains(*i)) {
        return Err(Error::InvalidInput(format!(
            "chunk {i} is both wanted and available"
        )));
    }

    let lost_nodes: BTreeSet<usize> = want_to_read.iter().map(|&i| params.to_logical(i)).collect();
    let sections: BTreeSet<usize> = lost_nodes.iter().map(|&n| n / params.q()).collect();
    if sections.len() * params.q() > params.parity_chunks() {
        return Err(Error::UnrepairablePattern(format!(
            "{} erased y-sections exceed the per-layer erasure budget of m = {}",
            sections.len(),
            params.parity_chunks()
        )));
    }

    let ranges = repair_plane_ranges(params, &lost_nodes);
    let helper_count = params.repair_helper_count(want_to_read.iter().copied());

    let mut minimum: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();

    // Rule 1: every survivor in a lost y-section is mandatory.
    for chunk in section_survivors(params, &lost_nodes) {
        if !available.contains(&chunk) {
            return Err(Error::UnrepairablePattern(format!(
                "chunk {chunk} shares a y-section with a lost chunk but is unavailable"
            )));
        }
        minimum.insert(chunk, ranges.clone());
    }
    if minimum.len() > helper_count {
        return Err(Error::UnrepairablePattern(format!(
            "{} mandatory y-section helpers exceed the helper budget of {helper_count}",
            minimum.len()
        )));
    }

    // Rule 2: fill the remaining slots from any other survivors.
    for &chunk in available {
        if minimum.len() == helper_count {
            break;
        }
        if !want_to_read.contains(&chunk) {
            minimum.entry(chunk).or_insert_with(|| ranges.clone());
        }
    }

    if minimum.len() < helper_count {
        return Err(Error::InsufficientChunks {
            available: minimum.len(),
            required: helper_count,
        });
    }
    Ok(minimum)
}

/// Survivors (physical indices) sharing a y-section with any lost node
fn section_survivors(params: &ClayParams, lost_nodes: &BTreeSet<usize>) -> Vec<usize> {
    let sections: BTreeSet<usize> = lost_nodes.iter().map(|&n| n / params.q()).collect();
    let mut survivors = Vec::new();
    for &y in &sections {
        for x in 0..params.q() {
            let node = y * params.q() + x;
            if !lost_nodes.contains(&node) && !params.is_shortened(node) {
                survivors.push(params.to_physical(node));
            }
        }
    }
    survivors
}

/// Union of the lost nodes' red layers, compressed into contiguous runs
fn repair_plane_ranges(params: &ClayParams, lost_nodes: &BTreeSet<usize>) -> Vec<(usize, usize)> {
    let planes = repair_planes(params, lost_nodes);
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &z in &planes {
        match ranges.last_mut() {
            Some((start, count)) if *start + *count == z => *count += 1,
            _ => ranges.push((z, 1)),
        }
    }
    ranges
}

/// Sorted union of the layers in which any lost node is red
fn repair_planes(params: &ClayParams, lost_nodes: &BTreeSet<usize>) -> Vec<usize> {
    let mut planes = BTreeSet::new();
    for &node in lost_nodes {
        planes.extend(repair_subchunk_indices(params, node));
    }
    planes.into_iter().collect()
}

// =============================================================================
// Repair Algorithm
// =============================================================================

/// Rebuild the chunks in `want_to_read` from partial helper reads.
///
/// Every helper in `chunks` supplies the bytes of the repair layers for the
/// lost set, concatenated in ascending layer order (the order
/// [`minimum_to_repair`] hands out). Survivors absent from `chunks` are
/// aloof and contribute nothing. Returns the rebuilt full chunks keyed by
/// physical index.
pub(crate) fn repair_lost_chunks(
    params: &ClayParams,
    pair: &PairCodec,
    mds: &ScalarMds,
    want_to_read: &BTreeSet<usize>,
    chunks: &BTreeMap<usize, &[u8]>,
    chunk_size: usize,
    u: &mut SubChunkMatrix,
    scratch: &mut [u8],
) -> Result<BTreeMap<usize, Vec<u8>>> {
    validate_chunk_indices(params, want_to_read.iter().copied())?;
    validate_chunk_indices(params, chunks.keys().copied())?;
    if want_to_read.is_empty() {
        return Err(Error::InvalidInput("no chunks requested for repair".into()));
    }
    if let Some(&i) = want_to_read.iter().find(|i| chunks.contains_key(*i)) {
        return Err(Error::InvalidInput(format!(
            "chunk {i} is both wanted and supplied as helper data"
        )));
    }
    if chunk_size == 0 || chunk_size % params.alpha() != 0 {
        return Err(Error::InvalidChunkSize {
            size: chunk_size,
            alpha: params.alpha(),
        });
    }

    let lost_nodes: BTreeSet<usize> = want_to_read.iter().map(|&i| params.to_logical(i)).collect();
    let lost_sections: BTreeSet<usize> = lost_nodes.iter().map(|&n| n / params.q()).collect();

    // Every survivor in a lost y-section must have supplied helper data;
    // the coupled solves below have no other source for those sections.
    for chunk in section_survivors(params, &lost_nodes) {
        if !chunks.contains_key(&chunk) {
            return Err(Error::UnrepairablePattern(format!(
                "chunk {chunk} shares a y-section with a lost chunk but supplied no helper data"
            )));
        }
    }

    let planes = repair_planes(params, &lost_nodes);
    let plane_pos: BTreeMap<usize, usize> =
        planes.iter().enumerate().map(|(i, &z)| (z, i)).collect();
    let sub_size = chunk_size / params.alpha();
    let helper_len = planes.len() * sub_size;

    let helpers = HelperData::new(params, chunks, helper_len)?;

    // Aloof survivors: physical nodes that are neither lost nor helpers
    let aloof: BTreeSet<usize> = (0..params.logical_nodes())
        .filter(|&node| {
            !params.is_shortened(node)
                && !lost_nodes.contains(&node)
                && !chunks.contains_key(&params.to_physical(node))
        })
        .collect();

    // Per-layer erasure set for the scalar MDS: the lost sections in full
    // (helpers there have lost companions, so their uncoupled values are
    // unknown) plus every aloof node.
    let mut erasures: BTreeSet<usize> = aloof.clone();
    for &y in &lost_sections {
        erasures.extend(y * params.q()..(y + 1) * params.q());
    }
    if erasures.len() > params.parity_chunks() {
        return Err(Error::UnrepairablePattern(format!(
            "{} per-layer erasures exceed m = {}",
            erasures.len(),
            params.parity_chunks()
        )));
    }

    // Bucket the repair planes by repair order
    let mut ordered_planes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &z in &planes {
        let z_vec = plane_vector(params, z);
        let ord = lost_nodes
            .iter()
            .chain(aloof.iter())
            .filter(|&&node| node % params.q() == z_vec[node / params.q()])
            .count();
        debug_assert!(ord > 0, "layer {z} is not a repair plane");
        ordered_planes.entry(ord).or_default().push(z);
    }

    let mut u_done = vec![false; params.logical_nodes() * params.alpha()];
    let mut recovered: BTreeMap<usize, Vec<u8>> = lost_nodes
        .iter()
        .map(|&node| (node, vec![0u8; chunk_size]))
        .collect();

    for (&ord, bucket) in &ordered_planes {
        trace!(ord, planes = bucket.len(), "repair order bucket");
        for &z in bucket {
            resolve_repair_plane_u(
                params, pair, mds, &helpers, &plane_pos, &erasures, &aloof, z, u, &mut u_done,
                scratch,
            )?;
        }
        for &z in bucket {
            materialize_lost_subchunks(
                params,
                pair,
                &helpers,
                &plane_pos,
                &erasures,
                &aloof,
                &lost_nodes,
                z,
                u,
                &mut recovered,
                sub_size,
            )?;
        }
    }

    Ok(recovered
        .into_iter()
        .map(|(node, bytes)| (params.to_physical(node), bytes))
        .collect())
}

/// Fill the uncoupled values of repair plane `z` for every helper outside
/// the erased sections, then MDS-decode the layer.
#[allow(clippy::too_many_arguments)]
fn resolve_repair_plane_u(
    params: &ClayParams,
    pair: &PairCodec,
    mds: &ScalarMds,
    helpers: &HelperData<'_>,
    plane_pos: &BTreeMap<usize, usize>,
    erasures: &BTreeSet<usize>,
    aloof: &BTreeSet<usize>,
    z: usize,
    u: &mut SubChunkMatrix,
    u_done: &mut [bool],
    scratch: &mut [u8],
) -> Result<()> {
    let z_vec = plane_vector(params, z);
    let sub_size = u.sub_size();
    let alpha = params.alpha();

    for y in 0..params.t() {
        for x in 0..params.q() {
            let node = y * params.q() + x;
            if erasures.contains(&node) {
                continue;
            }
            let helper = helpers
                .bytes(node)
                .ok_or_else(|| Error::UnrepairablePattern(format!("node {node} has no data")))?;
            let z_y = z_vec[y];
            let pos = plane_pos[&z];
            let c_self = &helper[pos * sub_size..(pos + 1) * sub_size];

            if z_y == x {
                // Red vertex: the helper's stored bytes are the uncoupled
                // value
                u.sub_mut(node, z).copy_from_slice(c_self);
                u_done[node * alpha + z] = true;
                continue;
            }

            let node_sw = y * params.q() + z_y;
            let z_sw = companion_layer(params, z, x, y, z_y);

            if aloof.contains(&node_sw) {
                // The companion supplied nothing; its uncoupled value must
                // have been resolved in a lower order bucket.
                if !u_done[node_sw * alpha + z_sw] {
                    return Err(Error::UnrepairablePattern(format!(
                        "uncoupled value of aloof node {node_sw} at layer {z_sw} was never resolved"
                    )));
                }
                let u_companion = u.sub(node_sw, z_sw);
                let mut u_self = vec![0u8; sub_size];
                solve_mixed(
                    pair,
                    x < z_y,
                    c_self,
                    u_companion,
                    &mut u_self,
                    scratch,
                    MixedSolve::OwnUncoupled,
                )?;
                u.sub_mut(node, z).copy_from_slice(&u_self);
            } else {
                // Companion is a helper too: decouple from the two stored
                // values. Each side derives only its own uncoupled value;
                // the companion does the same when its plane comes up.
                let sw_pos = *plane_pos.get(&z_sw).ok_or_else(|| {
                    Error::UnrepairablePattern(format!(
                        "companion layer {z_sw} is not part of the repair plane set"
                    ))
                })?;
                let sw_helper = helpers.bytes(node_sw).ok_or_else(|| {
                    Error::UnrepairablePattern(format!("node {node_sw} has no data"))
                })?;
                let c_companion = &sw_helper[sw_pos * sub_size..(sw_pos + 1) * sub_size];
                let u_self = u.sub_mut(node, z);
                if x < z_y {
                    pair.recover(
                        [
                            (PairRole::Coupled, c_self),
                            (PairRole::CoupledStar, c_companion),
                        ],
                        [
                            (PairRole::Uncoupled, u_self),
                            (PairRole::UncoupledStar, scratch),
                        ],
                    )?;
                } else {
                    pair.recover(
                        [
                            (PairRole::Coupled, c_companion),
                            (PairRole::CoupledStar, c_self),
                        ],
                        [
                            (PairRole::Uncoupled, scratch),
                            (PairRole::UncoupledStar, u_self),
                        ],
                    )?;
                }
            }
            u_done[node * alpha + z] = true;
        }
    }

    mds.decode_layer(u, z, erasures)?;
    for &node in erasures {
        u_done[node * alpha + z] = true;
    }
    Ok(())
}

/// Write the stored bytes recovered from repair plane `z` into the lost
/// nodes' output chunks.
#[allow(clippy::too_many_arguments)]
fn materialize_lost_subchunks(
    params: &ClayParams,
    pair: &PairCodec,
    helpers: &HelperData<'_>,
    plane_pos: &BTreeMap<usize, usize>,
    erasures: &BTreeSet<usize>,
    aloof: &BTreeSet<usize>,
    lost_nodes: &BTreeSet<usize>,
    z: usize,
    u: &SubChunkMatrix,
    recovered: &mut BTreeMap<usize, Vec<u8>>,
    sub_size: usize,
) -> Result<()> {
    let z_vec = plane_vector(params, z);

    for &node in erasures {
        if aloof.contains(&node) {
            continue;
        }
        let (x, y) = to_xy(params, node);
        let z_y = z_vec[y];

        if z_y == x {
            // On a repair plane the red vertex of a lost section is the lost
            // node itself; helpers there are never red.
            if let Some(out) = recovered.get_mut(&node) {
                out[z * sub_size..(z + 1) * sub_size].copy_from_slice(u.sub(node, z));
            }
            continue;
        }

        let node_sw = y * params.q() + z_y;
        let z_sw = companion_layer(params, z, x, y, z_y);

        match (lost_nodes.contains(&node), lost_nodes.contains(&node_sw)) {
            (false, true) => {
                // Helper whose companion is lost: solve the companion's
                // stored bytes from the helper's stored and uncoupled
                // values.
                let helper = helpers
                    .bytes(node)
                    .ok_or_else(|| Error::UnrepairablePattern(format!("node {node} has no data")))?;
                let pos = plane_pos[&z];
                let c_self = &helper[pos * sub_size..(pos + 1) * sub_size];
                let u_self = u.sub(node, z);
                let mut c_companion = vec![0u8; sub_size];
                let mut spare = vec![0u8; sub_size];
                solve_mixed(
                    pair,
                    x < z_y,
                    c_self,
                    u_self,
                    &mut c_companion,
                    &mut spare,
                    MixedSolve::CompanionCoupled,
                )?;
                if let Some(out) = recovered.get_mut(&node_sw) {
                    out[z_sw * sub_size..(z_sw + 1) * sub_size].copy_from_slice(&c_companion);
                }
            }
            (true, true) if z_y < x => {
                // Two lost companions: couple their uncoupled pair back in
                // one solve, executed once per pair.
                let u_self = u.sub(node, z);
                let u_companion = u.sub(node_sw, z_sw);
                let mut c_self = vec![0u8; sub_size];
                let mut c_companion = vec![0u8; sub_size];
                pair.recover(
                    [
                        (PairRole::Uncoupled, u_companion),
                        (PairRole::UncoupledStar, u_self),
                    ],
                    [
                        (PairRole::Coupled, &mut c_companion),
                        (PairRole::CoupledStar, &mut c_self),
                    ],
                )?;
                if let Some(out) = recovered.get_mut(&node) {
                    out[z * sub_size..(z + 1) * sub_size].copy_from_slice(&c_self);
                }
                if let Some(out) = recovered.get_mut(&node_sw) {
                    out[z_sw * sub_size..(z_sw + 1) * sub_size].copy_from_slice(&c_companion);
                }
            }
            // A lost node with a surviving companion is materialized when
            // the companion's plane is processed; helper/helper pairs need
            // nothing.
            _ => {}
        }
    }

    Ok(())
}

// =============================================================================
// Mixed Pair Solves
// =============================================================================

/// Which output of a mixed known-pair solve the caller is after
enum MixedSolve {
    /// Known own-C and companion-U; wanted: own U
    OwnUncoupled,
    /// Known own-C and own-U; wanted: companion C
    CompanionCoupled,
}

/// One vertex contributes its stored value plus one uncoupled value; solve
/// the requested role. `self_primary` says whether the calling vertex is the
/// primary (`x < z_y`) side of its pair.
fn solve_mixed(
    pair: &PairCodec,
    self_primary: bool,
    c_self: &[u8],
    u_known: &[u8],
    wanted: &mut [u8],
    spare: &mut [u8],
    mode: MixedSolve,
) -> Result<()> {
    let (c_role, u_role, wanted_role) = match (&mode, self_primary) {
        // Known C(p) and U*(p*), solving U(p)
        (MixedSolve::OwnUncoupled, true) => (
            PairRole::Coupled,
            PairRole::UncoupledStar,
            PairRole::Uncoupled,
        ),
        // Known C*(p*) and U(p), solving U*(p*)
        (MixedSolve::OwnUncoupled, false) => (
            PairRole::CoupledStar,
            PairRole::Uncoupled,
            PairRole::UncoupledStar,
        ),
        // Known C(p) and U(p), solving C*(p*)
        (MixedSolve::CompanionCoupled, true) => (
            PairRole::Coupled,
            PairRole::Uncoupled,
            PairRole::CoupledStar,
        ),
        // Known C*(p*) and U*(p*), solving C(p)
        (MixedSolve::CompanionCoupled, false) => (
            PairRole::CoupledStar,
            PairRole::UncoupledStar,
            PairRole::Coupled,
        ),
    };
    pair.recover(
        [(c_role, c_self), (u_role, u_known)],
        [(wanted_role, wanted), (spare_role(c_role, u_role, wanted_role), spare)],
    )
}

/// The one role not named by the other three
fn spare_role(a: PairRole, b: PairRole, c: PairRole) -> PairRole {
    use PairRole::*;
    let taken = (a as usize) + (b as usize) + (c as usize);
    match 6 - taken {
        0 => Coupled,
        1 => CoupledStar,
        2 => Uncoupled,
        _ => UncoupledStar,
    }
}

// =============================================================================
// Helper Data Lookup
// =============================================================================

/// Helper bytes keyed by logical node, with shortened nodes reading as zeros
struct HelperData<'a> {
    by_node: BTreeMap<usize, &'a [u8]>,
    shortened: std::ops::Range<usize>,
    zeros: Vec<u8>,
}

impl<'a> HelperData<'a> {
    fn new(
        params: &ClayParams,
        chunks: &BTreeMap<usize, &'a [u8]>,
        helper_len: usize,
    ) -> Result<Self> {
        let mut by_node = BTreeMap::new();
        for (&chunk, &bytes) in chunks {
            if bytes.len() != helper_len {
                return Err(Error::InconsistentChunkSizes {
                    index: chunk,
                    expected: helper_len,
                    actual: bytes.len(),
                });
            }
            by_node.insert(params.to_logical(chunk), bytes);
        }
        Ok(Self {
            by_node,
            shortened: params.data_chunks()..params.parity_start(),
            zeros: vec![0u8; helper_len],
        })
    }

    fn bytes(&self, node: usize) -> Option<&[u8]> {
        match self.by_node.get(&node) {
            Some(bytes) => Some(bytes),
            None if self.shortened.contains(&node) => Some(&self.zeros),
            None => None,
        }
    }
}

fn validate_chunk_indices(
    params: &ClayParams,
    indices: impl IntoIterator<Item = usize>,
) -> Result<()> {
    for i in indices {
        if i >= params.total_chunks() {
            return Err(Error::InvalidInput(format!(
                "chunk index {i} out of range [0, {})",
                params.total_chunks()
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
