// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The layered decoder.
//!
//! Erasure recovery proceeds plane by plane. Planes are ordered by the number of erased
//! nodes that are dots on them: a plane with fewer erased dots depends on fewer coupled
//! symbols that are themselves still missing. For each plane, the uncoupled symbols of
//! all surviving nodes are derived through the pairwise transform, the scalar MDS solves
//! the plane's erasures in the uncoupled domain, and the coupled symbols of the erased
//! nodes are then walked back out of the pairings. The ascending sweep guarantees that
//! whenever a pairing needs a companion's coupled symbol, the companion's plane has
//! already been finalised.

use std::collections::BTreeSet;

use tracing::Level;

use super::{
    geometry::{companion_plane, max_intersection_score, plane_order, plane_vector},
    ClayConfig, ClayError, CouplingEngine, NodeIndex, PairOrientation, ScalarMds, SubChunks,
};

/// Recovers every erased node of `chunks` in place.
///
/// `chunks` and `u_buf` hold one entry per internal node; erased entries of `chunks` must
/// be zero-filled and correctly sized on entry. If fewer than `m` nodes are erased the
/// set is grown to exactly `m` (parity nodes first) so that the uncoupled solves always
/// run the full `(k + ν, m)` code; regrown nodes are recomputed to their original
/// contents by the MDS equations.
#[tracing::instrument(level = Level::TRACE, skip_all, fields(n_erasures = erasures.len()))]
pub(crate) fn decode_layered(
    config: &ClayConfig,
    mds: &impl ScalarMds,
    pft: &CouplingEngine,
    erasures: &BTreeSet<NodeIndex>,
    chunks: &mut [SubChunks],
    u_buf: &mut [SubChunks],
) -> Result<(), ClayError> {
    debug_assert!(!erasures.is_empty());
    debug_assert_eq!(chunks.len(), config.total_nodes());

    let mut erasures = erasures.clone();
    let mut filler = config.k + config.nu;
    while erasures.len() < config.m && filler < config.total_nodes() {
        erasures.insert(NodeIndex(filler as u16));
        filler += 1;
    }
    if erasures.len() != config.m {
        return Err(ClayError::Internal(format!(
            "erasure set of size {} cannot be grown to m = {}",
            erasures.len(),
            config.m
        )));
    }

    let order = plane_order(config, &erasures);
    let max_iscore = max_intersection_score(config, &erasures);

    for iscore in 0..=max_iscore {
        tracing::trace!(iscore, "decoding planes at intersection score");
        for z in 0..config.sub_chunk_no {
            if order[z] == iscore {
                decode_plane(config, mds, pft, &erasures, z, chunks, u_buf)?;
            }
        }
        for z in 0..config.sub_chunk_no {
            if order[z] == iscore {
                finalize_plane(config, pft, &erasures, z, chunks, u_buf)?;
            }
        }
    }
    Ok(())
}

/// Derives the uncoupled symbols of every surviving node on plane `z`, then solves the
/// plane's erasures with the scalar MDS.
///
/// Each pairing is transformed once, from the side whose column exceeds the dot column;
/// the mirrored side is covered when its own plane is processed within the same score.
/// A surviving hole below the dot column whose companion is erased is handled here
/// directly: the companion's coupled symbol was already finalised at a lower score.
fn decode_plane(
    config: &ClayConfig,
    mds: &impl ScalarMds,
    pft: &CouplingEngine,
    erasures: &BTreeSet<NodeIndex>,
    z: usize,
    chunks: &mut [SubChunks],
    u_buf: &mut [SubChunks],
) -> Result<(), ClayError> {
    let z_vec = plane_vector(config, z);
    for x in 0..config.q {
        for y in 0..config.t {
            let node = NodeIndex::from_coords(x, y, config.q);
            if erasures.contains(&node) {
                continue;
            }
            let dot_column = z_vec[y];
            let companion = NodeIndex::from_coords(dot_column, y, config.q);
            let z_sw = companion_plane(config, z, x, y);

            if dot_column == x {
                let (own, scratch) = (&chunks[node.as_usize()], &mut u_buf[node.as_usize()]);
                scratch[z].copy_from_slice(&own[z]);
            } else if dot_column < x || erasures.contains(&companion) {
                let (u_own, u_companion) = pft
                    .uncoupled_from_coupled(
                        &chunks[node.as_usize()][z],
                        &chunks[companion.as_usize()][z_sw],
                        PairOrientation::of(x, dot_column),
                    )
                    .map_err(|_| ClayError::DecodeFailed(z))?;
                u_buf[node.as_usize()][z].copy_from_slice(&u_own);
                u_buf[companion.as_usize()][z_sw].copy_from_slice(&u_companion);
            }
        }
    }
    decode_uncoupled(config, mds, erasures, z, u_buf)
}

/// Solves the erasures of plane `z` in the uncoupled domain.
///
/// When only parity nodes are erased the plane is re-encoded instead of reconstructed;
/// this is the path every encode call takes.
pub(crate) fn decode_uncoupled(
    config: &ClayConfig,
    mds: &impl ScalarMds,
    erasures: &BTreeSet<NodeIndex>,
    z: usize,
    u_buf: &mut [SubChunks],
) -> Result<(), ClayError> {
    debug_assert!(erasures.len() <= config.m);
    let parity_start = config.k + config.nu;

    if erasures.iter().all(|node| node.as_usize() >= parity_start) {
        let mut shards: Vec<Vec<u8>> = (0..config.total_nodes())
            .map(|node| u_buf[node][z].to_vec())
            .collect();
        mds.encode_chunks(&mut shards)
            .map_err(|_| ClayError::DecodeFailed(z))?;
        for node in erasures {
            u_buf[node.as_usize()][z].copy_from_slice(&shards[node.as_usize()]);
        }
    } else {
        let mut shards: Vec<Option<Vec<u8>>> = (0..config.total_nodes())
            .map(|node| {
                (!erasures.contains(&NodeIndex(node as u16))).then(|| u_buf[node][z].to_vec())
            })
            .collect();
        mds.decode_chunks(&mut shards)
            .map_err(|_| ClayError::DecodeFailed(z))?;
        for node in erasures {
            let shard = shards[node.as_usize()].as_deref().ok_or_else(|| {
                ClayError::Internal(format!("node {node} missing after a successful solve"))
            })?;
            u_buf[node.as_usize()][z].copy_from_slice(shard);
        }
    }
    Ok(())
}

/// Recovers the coupled symbols of the erased nodes on plane `z` from the now-complete
/// uncoupled plane.
fn finalize_plane(
    config: &ClayConfig,
    pft: &CouplingEngine,
    erasures: &BTreeSet<NodeIndex>,
    z: usize,
    chunks: &mut [SubChunks],
    u_buf: &mut [SubChunks],
) -> Result<(), ClayError> {
    let z_vec = plane_vector(config, z);
    for &node in erasures {
        let x = node.x(config.q);
        let y = node.y(config.q);
        let dot_column = z_vec[y];
        let companion = NodeIndex::from_coords(dot_column, y, config.q);
        let z_sw = companion_plane(config, z, x, y);

        if dot_column == x {
            let (scratch, own) = (&u_buf[node.as_usize()], &mut chunks[node.as_usize()]);
            own[z].copy_from_slice(&scratch[z]);
        } else if !erasures.contains(&companion) {
            // The companion survived: complete the half-known pair.
            let restored = pft
                .coupled_from_companion(
                    &chunks[companion.as_usize()][z_sw],
                    &u_buf[node.as_usize()][z],
                    PairOrientation::of(x, dot_column),
                )
                .map_err(|_| ClayError::DecodeFailed(z))?;
            chunks[node.as_usize()][z].copy_from_slice(&restored);
        } else if dot_column < x {
            // Both sides erased: one transform recovers both coupled symbols. The
            // mirrored traversal is skipped so each pair is inverted exactly once.
            let (own, companion_coupled) = pft
                .coupled_from_uncoupled(
                    &u_buf[node.as_usize()][z],
                    &u_buf[companion.as_usize()][z_sw],
                )
                .map_err(|_| ClayError::DecodeFailed(z))?;
            chunks[node.as_usize()][z].copy_from_slice(&own);
            chunks[companion.as_usize()][z_sw].copy_from_slice(&companion_coupled);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clay_test_utils::{param_test, random_data};

    use super::*;
    use crate::{encoding::VandermondeMds, Profile};

    struct Fixture {
        config: ClayConfig,
        mds: VandermondeMds,
        pft: CouplingEngine,
    }

    impl Fixture {
        fn new(k: usize, m: usize, d: usize) -> Self {
            let mut profile = Profile::new();
            profile.insert("k".to_string(), k.to_string());
            profile.insert("m".to_string(), m.to_string());
            profile.insert("d".to_string(), d.to_string());
            let config = ClayConfig::from_profile(&profile).expect("profile is valid");
            let mds = VandermondeMds::new(config.k + config.nu, config.m)
                .expect("parameters are valid");
            let pft = CouplingEngine::new().expect("the (2, 2) code is always valid");
            Self { config, mds, pft }
        }

        fn buffers(&self, sub_chunk_size: usize) -> Vec<SubChunks> {
            (0..self.config.total_nodes())
                .map(|_| SubChunks::zeros(self.config.sub_chunk_count(), sub_chunk_size))
                .collect()
        }

        /// Fills the data nodes with deterministic bytes and computes all remaining
        /// symbols by declaring the parity nodes erased.
        fn encode(&self, sub_chunk_size: usize) -> (Vec<SubChunks>, Vec<SubChunks>) {
            let chunk_size = self.config.sub_chunk_count() * sub_chunk_size;
            let data = random_data(self.config.k * chunk_size);
            let mut chunks = self.buffers(sub_chunk_size);
            for node in 0..self.config.k {
                chunks[node]
                    .as_mut_slice()
                    .copy_from_slice(&data[node * chunk_size..(node + 1) * chunk_size]);
            }
            let mut u_buf = self.buffers(sub_chunk_size);
            let parities: BTreeSet<NodeIndex> = (self.config.k + self.config.nu
                ..self.config.total_nodes())
                .map(|node| NodeIndex(node as u16))
                .collect();
            decode_layered(
                &self.config,
                &self.mds,
                &self.pft,
                &parities,
                &mut chunks,
                &mut u_buf,
            )
            .expect("encoding cannot fail");
            (chunks, u_buf)
        }
    }

    param_test! {
        erased_nodes_are_recovered: [
            single_data: (4, 2, 5, &[1]),
            double_data: (4, 2, 5, &[1, 2]),
            data_and_parity: (4, 2, 5, &[1, 4]),
            double_parity: (4, 2, 5, &[4, 5]),
            shortened_code: (4, 3, 5, &[0, 5, 6]),
            triple_coupling: (6, 3, 8, &[1, 4, 7]),
            degenerate: (2, 1, 2, &[0]),
        ]
    }
    fn erased_nodes_are_recovered(k: usize, m: usize, d: usize, erased: &[usize]) {
        let fixture = Fixture::new(k, m, d);
        let (encoded, _) = fixture.encode(32);

        let mut chunks = encoded.clone();
        let erasures: BTreeSet<NodeIndex> =
            erased.iter().map(|&node| NodeIndex(node as u16)).collect();
        for node in &erasures {
            chunks[node.as_usize()].as_mut_slice().fill(0);
        }
        let mut u_buf = fixture.buffers(32);
        decode_layered(
            &fixture.config,
            &fixture.mds,
            &fixture.pft,
            &erasures,
            &mut chunks,
            &mut u_buf,
        )
        .expect("decoding succeeds");

        for node in 0..fixture.config.total_nodes() {
            assert_eq!(
                chunks[node], encoded[node],
                "node {node} differs after recovery"
            );
        }
    }

    #[test]
    fn coupled_and_uncoupled_symbols_agree_at_dots() {
        let fixture = Fixture::new(4, 2, 5);
        let (chunks, u_buf) = fixture.encode(32);
        let q = fixture.config.q;
        for z in 0..fixture.config.sub_chunk_count() {
            let z_vec = plane_vector(&fixture.config, z);
            for node in 0..fixture.config.total_nodes() {
                let node = NodeIndex(node as u16);
                if node.x(q) == z_vec[node.y(q)] {
                    assert_eq!(
                        &chunks[node.as_usize()][z],
                        &u_buf[node.as_usize()][z],
                        "dot ({node}, {z}) must carry equal coupled and uncoupled symbols"
                    );
                }
            }
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let fixture = Fixture::new(4, 2, 5);
        let (first, _) = fixture.encode(32);
        let (second, _) = fixture.encode(32);
        assert_eq!(first, second);
    }
}
