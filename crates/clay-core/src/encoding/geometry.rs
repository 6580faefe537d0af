// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Plane geometry of the coupled-layer grid.
//!
//! A plane index `z ∈ [0, α)` is identified with its `t`-digit base-`q` representation;
//! digit `y` (most significant first) selects the *dot* column of row `y` on that plane.
//! Node `(x, y)` is a dot on plane `z` iff `x` equals that digit, and a *hole* otherwise.
//! Holes are pairwise coupled: the hole `(x, y)` on plane `z` is paired with the hole
//! `(z_y, y)` on the companion plane obtained by replacing digit `y` of `z` with `x`.

use std::collections::BTreeSet;

use super::{ClayConfig, NodeIndex};

/// The base-`q` representation of plane `z`, most significant digit first.
///
/// Entry `y` is the dot column of row `y` on plane `z`.
pub(crate) fn plane_vector(config: &ClayConfig, z: usize) -> Vec<usize> {
    let mut digits = vec![0; config.t];
    let mut rest = z;
    for y in (0..config.t).rev() {
        digits[y] = rest % config.q;
        rest /= config.q;
    }
    digits
}

/// The companion plane of the hole `(x, y)` on plane `z`: `z` with digit `y` replaced by
/// `x`.
pub(crate) fn companion_plane(config: &ClayConfig, z: usize, x: usize, y: usize) -> usize {
    let run = config.q.pow((config.t - 1 - y) as u32);
    let digit = (z / run) % config.q;
    z - digit * run + x * run
}

/// The sub-chunks a helper must supply to repair `lost`, as `(offset, count)` ranges of
/// plane indices.
///
/// These are the `α/q` planes whose row-`y` digit equals the lost node's column:
/// `q^y` runs of `q^(t-1-y)` consecutive planes, spaced `q·q^(t-1-y)` apart.
pub(crate) fn repair_sub_chunk_ranges(config: &ClayConfig, lost: NodeIndex) -> Vec<(usize, usize)> {
    let x = lost.x(config.q);
    let y = lost.y(config.q);
    let run = config.q.pow((config.t - 1 - y) as u32);
    let n_runs = config.q.pow(y as u32);

    let mut ranges = Vec::with_capacity(n_runs);
    let mut offset = x * run;
    for _ in 0..n_runs {
        ranges.push((offset, run));
        offset += config.q * run;
    }
    ranges
}

/// The repair planes of `lost` as a flat, ascending list; the position of a plane in this
/// list is its index within a helper's packed repair payload.
pub(crate) fn repair_plane_indices(config: &ClayConfig, lost: NodeIndex) -> Vec<usize> {
    repair_sub_chunk_ranges(config, lost)
        .into_iter()
        .flat_map(|(offset, count)| offset..offset + count)
        .collect()
}

/// The number of sub-chunks per helper needed to repair all nodes in `want`.
///
/// Counts the planes on which at least one wanted node is a dot.
pub(crate) fn repair_sub_chunk_count(config: &ClayConfig, want: &BTreeSet<NodeIndex>) -> usize {
    let mut weight = vec![0usize; config.t];
    for node in want {
        weight[node.y(config.q)] += 1;
    }
    let untouched: usize = weight.iter().map(|&w| config.q - w).product();
    config.sub_chunk_no - untouched
}

/// The number of distinct rows containing at least one erased node.
///
/// This bounds the outer sweep of the layered decoder: every plane's order is at most
/// this score.
pub(crate) fn max_intersection_score(config: &ClayConfig, erasures: &BTreeSet<NodeIndex>) -> usize {
    let rows: BTreeSet<usize> = erasures.iter().map(|node| node.y(config.q)).collect();
    rows.len()
}

/// For every plane, the number of erased nodes that are dots on it.
///
/// Planes of lower order have fewer coupled-from-uncoupled inversions pending and are
/// solvable first; the layered decoder sweeps orders ascending.
pub(crate) fn plane_order(config: &ClayConfig, erasures: &BTreeSet<NodeIndex>) -> Vec<usize> {
    let mut order = vec![0; config.sub_chunk_no];
    for (z, entry) in order.iter_mut().enumerate() {
        let z_vec = plane_vector(config, z);
        *entry = erasures
            .iter()
            .filter(|node| node.x(config.q) == z_vec[node.y(config.q)])
            .count();
    }
    order
}
