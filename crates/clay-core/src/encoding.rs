// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Erasure encoding, decoding, and bandwidth-optimal single-node repair.

mod buffers;
pub use buffers::{AlignedBuf, SIMD_ALIGN};
pub(crate) use buffers::SubChunks;

mod code;
pub use code::ClayCode;

mod config;
pub use config::{ClayConfig, DEFAULT_K, DEFAULT_M, WORD_SIZE};

mod coupling;
pub(crate) use coupling::{CouplingEngine, PairOrientation};

mod decoder;

mod errors;
pub use errors::ClayError;

mod geometry;

mod mds;
pub(crate) use mds::{ScalarMds, VandermondeMds};

mod repair;

mod utils;

use serde::{Deserialize, Serialize};

/// Index of a node in the internal `q × t` grid, in `[0, q·t) = [0, k + m + ν)`.
///
/// The grid contains the `k` data nodes, `ν` virtual shortened nodes (zero-filled, never
/// surfaced to callers), and the `m` parity nodes, in that order. Conversions to and from
/// [`ChunkIndex`][crate::ChunkIndex] account for the shortening offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct NodeIndex(pub(crate) u16);

impl NodeIndex {
    /// Creates the node index for grid coordinates `(x, y)` with row width `q`.
    #[inline]
    pub(crate) fn from_coords(x: usize, y: usize, q: usize) -> Self {
        Self((y * q + x) as u16)
    }

    /// Returns the index as a `usize`.
    #[inline]
    pub(crate) fn as_usize(&self) -> usize {
        self.0.into()
    }

    /// The column of this node, in `[0, q)`.
    #[inline]
    pub(crate) fn x(&self, q: usize) -> usize {
        self.as_usize() % q
    }

    /// The row of this node, in `[0, t)`.
    #[inline]
    pub(crate) fn y(&self, q: usize) -> usize {
        self.as_usize() / q
    }
}

impl core::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
