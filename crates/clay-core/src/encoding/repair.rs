// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Bandwidth-optimal single-node repair.
//!
//! When exactly one chunk is lost and every surviving chunk of its row is on hand, the
//! lost chunk can be rebuilt from `d` helpers that each contribute only the `α/q`
//! sub-chunks on the planes where the lost node is a dot. Helpers whose nodes are holes
//! on such a plane feed the pairwise transform; the plane is then solved in the
//! uncoupled domain with the lost node's entire row (plus any aloof nodes) declared
//! erased, and each solved plane yields one dot sub-chunk of the lost node directly plus
//! one hole sub-chunk through every row-mate's pairing.

use std::collections::{BTreeMap, BTreeSet};

use tracing::Level;

use super::{
    decoder::decode_uncoupled,
    geometry::{
        companion_plane, plane_vector, repair_plane_indices, repair_sub_chunk_count,
        repair_sub_chunk_ranges,
    },
    ClayConfig, ClayError, CouplingEngine, NodeIndex, PairOrientation, ScalarMds, SubChunks,
};
use crate::ChunkIndex;

/// How a decode request is served.
///
/// Classification is total: every request maps to exactly one plan, and requests that
/// miss any fast-path precondition fall back to the layered decoder rather than fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodePlan {
    /// A single lost chunk with a conforming helper set: take the repair fast path.
    RepairOne {
        /// The internal node to rebuild.
        lost: NodeIndex,
    },
    /// Recover the missing chunks with the layered decoder.
    General {
        /// The internal nodes missing from the chunk map.
        erasures: BTreeSet<NodeIndex>,
    },
}

/// Returns true iff the request shape qualifies for single-node repair: one wanted chunk
/// that is not available, every surviving user node of its row available, and at least
/// `d` available chunks in total.
///
/// Virtual shortened row-mates are implicitly available as zeros and are not required.
pub(crate) fn is_repair(
    config: &ClayConfig,
    want: &BTreeSet<ChunkIndex>,
    available: &BTreeSet<ChunkIndex>,
) -> bool {
    if want.iter().all(|chunk| available.contains(chunk)) {
        return false;
    }
    if want.len() != 1 {
        return false;
    }
    let lost_chunk = *want.iter().next().expect("want has exactly one entry");
    if lost_chunk.as_usize() >= config.chunk_count() {
        return false;
    }
    let lost = config.node_of(lost_chunk);
    let row = lost.y(config.q);
    for x in 0..config.q {
        let node = NodeIndex::from_coords(x, row, config.q);
        if node == lost || config.is_shortened(node) {
            continue;
        }
        let Some(chunk) = config.chunk_of(node) else {
            continue;
        };
        if !available.contains(&chunk) {
            return false;
        }
    }
    available.len() >= config.d
}

/// Classifies a decode request against the supplied chunk map.
///
/// On top of [`is_repair`], the fast path requires exactly `d` helper payloads of
/// exactly `chunk_size / q` bytes each (the packed repair sub-chunks); anything else is
/// served by the layered decoder.
pub(crate) fn classify(
    config: &ClayConfig,
    want: &BTreeSet<ChunkIndex>,
    chunks: &BTreeMap<ChunkIndex, &[u8]>,
    chunk_size: usize,
) -> DecodePlan {
    let available: BTreeSet<ChunkIndex> = chunks.keys().copied().collect();
    if is_repair(config, want, &available)
        && chunks.len() == config.d
        && chunk_size % config.q == 0
        && chunks
            .values()
            .all(|bytes| bytes.len() == chunk_size / config.q)
    {
        let lost_chunk = *want.iter().next().expect("is_repair checked the size");
        return DecodePlan::RepairOne {
            lost: config.node_of(lost_chunk),
        };
    }
    let erasures = (0..config.chunk_count())
        .map(|index| ChunkIndex(index as u16))
        .filter(|chunk| !available.contains(chunk))
        .map(|chunk| config.node_of(chunk))
        .collect();
    DecodePlan::General { erasures }
}

/// The minimal read set for a single-node repair: the `d` helpers, each tagged with the
/// `(offset, count)` sub-chunk ranges it must supply.
///
/// The lost node's row-mates are always selected; the remaining helpers are the
/// available chunks in ascending index order.
pub(crate) fn minimum_to_repair(
    config: &ClayConfig,
    want: &BTreeSet<ChunkIndex>,
    available: &BTreeSet<ChunkIndex>,
) -> Result<BTreeMap<ChunkIndex, Vec<(usize, usize)>>, ClayError> {
    let lost_chunk = *want.iter().next().expect("repair requests have one entry");
    let lost = config.node_of(lost_chunk);
    let ranges = repair_sub_chunk_ranges(config, lost);

    let mut minimum = BTreeMap::new();
    let row = lost.y(config.q);
    for x in 0..config.q {
        let node = NodeIndex::from_coords(x, row, config.q);
        if node == lost || config.is_shortened(node) {
            continue;
        }
        if let Some(chunk) = config.chunk_of(node) {
            minimum.insert(chunk, ranges.clone());
        }
    }
    for &chunk in available {
        if minimum.len() >= config.d {
            break;
        }
        minimum.entry(chunk).or_insert_with(|| ranges.clone());
    }
    if minimum.len() != config.d {
        return Err(ClayError::InsufficientShares);
    }
    Ok(minimum)
}

/// Rebuilds the lost chunk from packed helper payloads.
///
/// `chunks` maps each helper to its `chunk_size / q` packed repair bytes; `u_buf` is the
/// per-node uncoupled scratch sized for full chunks.
#[tracing::instrument(level = Level::TRACE, skip_all, fields(lost = %lost))]
pub(crate) fn repair(
    config: &ClayConfig,
    mds: &impl ScalarMds,
    pft: &CouplingEngine,
    lost: NodeIndex,
    chunks: &BTreeMap<ChunkIndex, &[u8]>,
    chunk_size: usize,
    u_buf: &mut [SubChunks],
) -> Result<Vec<u8>, ClayError> {
    if chunk_size == 0 || chunk_size % config.sub_chunk_no != 0 {
        return Err(ClayError::MisalignedInput);
    }
    let sub_chunk_size = chunk_size / config.sub_chunk_no;
    let repair_sub_chunks = repair_sub_chunk_count(config, &BTreeSet::from([lost]));
    let packed_len = repair_sub_chunks * sub_chunk_size;

    let mut helpers: BTreeMap<NodeIndex, SubChunks> = BTreeMap::new();
    let mut aloof: BTreeSet<NodeIndex> = BTreeSet::new();
    for index in 0..config.chunk_count() {
        let chunk = ChunkIndex(index as u16);
        let node = config.node_of(chunk);
        if let Some(&bytes) = chunks.get(&chunk) {
            if bytes.len() != packed_len {
                return Err(ClayError::MisalignedChunk);
            }
            helpers.insert(node, SubChunks::from_slice(bytes, sub_chunk_size));
        } else if node != lost {
            aloof.insert(node);
        }
    }
    for shortened in config.k..config.k + config.nu {
        helpers.insert(
            NodeIndex(shortened as u16),
            SubChunks::zeros(repair_sub_chunks, sub_chunk_size),
        );
    }
    debug_assert_eq!(
        helpers.len() + aloof.len() + 1,
        config.total_nodes(),
        "every node is a helper, aloof, or the lost node"
    );

    let recovered = repair_one_lost_chunk(config, mds, pft, lost, &helpers, &aloof, u_buf)?;
    Ok(recovered.to_vec())
}

/// The plane sweep of the repair fast path.
fn repair_one_lost_chunk(
    config: &ClayConfig,
    mds: &impl ScalarMds,
    pft: &CouplingEngine,
    lost: NodeIndex,
    helpers: &BTreeMap<NodeIndex, SubChunks>,
    aloof: &BTreeSet<NodeIndex>,
    u_buf: &mut [SubChunks],
) -> Result<SubChunks, ClayError> {
    let q = config.q;
    let sub_chunk_size = u_buf
        .first()
        .map(SubChunks::sub_chunk_size)
        .unwrap_or_default();

    let repair_planes = repair_plane_indices(config, lost);
    let packed_of: BTreeMap<usize, usize> = repair_planes
        .iter()
        .enumerate()
        .map(|(position, &z)| (z, position))
        .collect();

    // Planes are processed by ascending count of dot-erasures so that every aloof
    // companion's uncoupled symbol exists before a later plane needs it.
    let mut ordered_planes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &z in &repair_planes {
        let z_vec = plane_vector(config, z);
        let order = aloof
            .iter()
            .chain(std::iter::once(&lost))
            .filter(|node| node.x(q) == z_vec[node.y(q)])
            .count();
        debug_assert!(order > 0, "the lost node is a dot on every repair plane");
        ordered_planes.entry(order).or_default().push(z);
    }

    let mut erasures: BTreeSet<NodeIndex> = aloof.clone();
    for x in 0..q {
        erasures.insert(NodeIndex::from_coords(x, lost.y(q), q));
    }
    debug_assert!(erasures.len() <= config.m);

    let mut recovered = SubChunks::zeros(config.sub_chunk_no, sub_chunk_size);

    for planes in ordered_planes.values() {
        for &z in planes {
            let z_vec = plane_vector(config, z);
            let packed_z = packed_of[&z];

            for y in 0..config.t {
                for x in 0..q {
                    let node = NodeIndex::from_coords(x, y, q);
                    if erasures.contains(&node) {
                        continue;
                    }
                    let helper = helpers
                        .get(&node)
                        .ok_or_else(|| missing_helper(node))?;
                    let dot_column = z_vec[y];
                    let companion = NodeIndex::from_coords(dot_column, y, q);
                    let z_sw = companion_plane(config, z, x, y);

                    if dot_column == x {
                        u_buf[node.as_usize()][z].copy_from_slice(&helper[packed_z]);
                    } else if aloof.contains(&companion) {
                        // The companion's uncoupled symbol was recovered on an earlier
                        // plane of the sweep.
                        let u_own = pft
                            .uncoupled_from_companion(
                                &helper[packed_z],
                                &u_buf[companion.as_usize()][z_sw],
                                PairOrientation::of(x, dot_column),
                            )
                            .map_err(|_| ClayError::DecodeFailed(z))?;
                        u_buf[node.as_usize()][z].copy_from_slice(&u_own);
                    } else {
                        let companion_helper = helpers
                            .get(&companion)
                            .ok_or_else(|| missing_helper(companion))?;
                        let packed_sw = *packed_of
                            .get(&z_sw)
                            .ok_or_else(|| {
                                ClayError::Internal(format!(
                                    "companion plane {z_sw} is not a repair plane"
                                ))
                            })?;
                        let (u_own, _) = pft
                            .uncoupled_from_coupled(
                                &helper[packed_z],
                                &companion_helper[packed_sw],
                                PairOrientation::of(x, dot_column),
                            )
                            .map_err(|_| ClayError::DecodeFailed(z))?;
                        u_buf[node.as_usize()][z].copy_from_slice(&u_own);
                    }
                }
            }

            decode_uncoupled(config, mds, &erasures, z, u_buf)?;

            for &node in &erasures {
                if aloof.contains(&node) {
                    continue;
                }
                let x = node.x(q);
                let y = node.y(q);
                let dot_column = z_vec[y];
                let z_sw = companion_plane(config, z, x, y);

                if dot_column == x {
                    if node == lost {
                        recovered[z].copy_from_slice(&u_buf[node.as_usize()][z]);
                    }
                } else {
                    // `node` is a surviving member of the lost row, so its pairing
                    // partner on this plane is the lost node itself.
                    debug_assert_eq!(NodeIndex::from_coords(dot_column, y, q), lost);
                    let helper = helpers
                        .get(&node)
                        .ok_or_else(|| missing_helper(node))?;
                    let lost_coupled = pft
                        .companion_coupled(
                            &helper[packed_z],
                            &u_buf[node.as_usize()][z],
                            PairOrientation::of(x, dot_column),
                        )
                        .map_err(|_| ClayError::DecodeFailed(z))?;
                    recovered[z_sw].copy_from_slice(&lost_coupled);
                }
            }
        }
    }

    Ok(recovered)
}

fn missing_helper(node: NodeIndex) -> ClayError {
    ClayError::Internal(format!("helper data for node {node} is missing"))
}
