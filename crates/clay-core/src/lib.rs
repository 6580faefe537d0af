// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core implementation of the Clay (coupled-layer) erasure code.
//!
//! A Clay code is a minimum-storage-regenerating (MSR) code layered on top of a scalar MDS
//! code: a data object is encoded into `k + m` chunks such that the object can be
//! reconstructed from any `k` of them, while a single lost chunk can be repaired by reading
//! only a `1/q` fraction of each of `d` surviving chunks, with `q = d - k + 1`.
//!
//! Each chunk consists of `α = q^t` *sub-chunks*; the triple of a node, a plane index
//! `z ∈ [0, α)`, and the sub-chunk it addresses forms the coordinate system in which all
//! encoding, decoding, and repair operations are expressed. See the [`encoding`] module for
//! the full machinery.
//!
//! # Example
//!
//! ```
//! use std::collections::{BTreeMap, BTreeSet};
//!
//! use clay_core::{encoding::ClayCode, ChunkIndex, Profile};
//!
//! let mut profile = Profile::new();
//! profile.insert("k".to_string(), "4".to_string());
//! profile.insert("m".to_string(), "2".to_string());
//! profile.insert("d".to_string(), "5".to_string());
//!
//! let mut code = ClayCode::from_profile(&profile).expect("profile is valid");
//! let data: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
//!
//! // Encode into all six chunks.
//! let want: BTreeSet<_> = (0..6).map(ChunkIndex).collect();
//! let chunks = code.encode(&want, &data).expect("encoding succeeds");
//!
//! // Drop one chunk and reconstruct the data from the rest.
//! let available: BTreeMap<_, _> = chunks
//!     .into_iter()
//!     .filter(|(index, _)| *index != ChunkIndex(1))
//!     .collect();
//! let decoded = code.decode_concat(&available).expect("decoding succeeds");
//! assert_eq!(&decoded[..data.len()], &data[..]);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod encoding;

pub use encoding::ClayCode;

/// An erasure code profile: a string-to-string map of configuration keys.
///
/// Recognised keys are `k`, `m`, `d`, `w`, `plugin`, `technique`, `scalar_mds`, `mapping`,
/// and `jerasure-per-chunk-alignment`; unknown keys are ignored and missing keys assume
/// their defaults.
pub type Profile = BTreeMap<String, String>;

/// Index of a user-visible chunk within the codeword, in `[0, k + m)`.
///
/// Chunks at indices below `k` carry data, the remaining `m` chunks carry parity. This is
/// distinct from [`NodeIndex`][encoding::NodeIndex], which addresses the internal node grid
/// including the virtual shortened nodes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct ChunkIndex(pub u16);

impl ChunkIndex {
    /// Returns the index as a `usize`.
    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0.into()
    }

    /// Returns the index as a `u16`.
    #[inline]
    pub fn get(&self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ChunkIndex {
    fn from(index: u16) -> Self {
        Self(index)
    }
}
