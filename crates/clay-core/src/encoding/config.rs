// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Profile parsing and parameter derivation.

use serde::{Deserialize, Serialize};
use tracing::Level;

use super::{
    utils::{align_up, checked_pow},
    ClayError, NodeIndex, SIMD_ALIGN,
};
use crate::{ChunkIndex, Profile};

/// Default number of data chunks.
pub const DEFAULT_K: usize = 4;
/// Default number of parity chunks.
pub const DEFAULT_M: usize = 2;
/// The Galois-field word size. The construction is fixed to GF(2^8).
pub const WORD_SIZE: usize = 8;

/// The largest supported total node count `k + m + ν`, bounded by the GF(2^8) backend.
const MAX_TOTAL_NODES: usize = 254;

/// Derived parameters of a Clay code, immutable after construction.
///
/// The code is described by the profile triple `(k, m, d)`: `k` data chunks, `m` parity
/// chunks, and `d` helpers contacted to repair a single lost chunk, with
/// `k ≤ d ≤ k + m - 1`. From these the construction derives the coupling factor
/// `q = d - k + 1`, the shortening `ν` that makes `q` divide `k + m + ν`, the row count
/// `t = (k + m + ν) / q`, and the sub-chunk count `α = q^t`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClayConfig {
    /// The number of data chunks.
    pub(crate) k: usize,
    /// The number of parity chunks.
    pub(crate) m: usize,
    /// The number of helper chunks read during single-node repair.
    pub(crate) d: usize,
    /// The coupling factor `q = d - k + 1`.
    pub(crate) q: usize,
    /// The number of rows of the node grid, `t = (k + m + ν) / q`.
    pub(crate) t: usize,
    /// The shortening: the number of virtual zero nodes.
    pub(crate) nu: usize,
    /// The number of sub-chunks per chunk, `α = q^t`.
    pub(crate) sub_chunk_no: usize,
    /// Chunk placement permutation: entry `i` is the caller-visible position of logical
    /// chunk `i`. Empty for the identity placement.
    chunk_mapping: Vec<usize>,
    /// Whether the caller requested per-chunk alignment from the scalar backend. Parsed
    /// for profile compatibility.
    pub(crate) per_chunk_alignment: bool,
}

impl ClayConfig {
    /// Parses and validates `profile`, returning the derived parameters.
    ///
    /// Missing or empty keys assume their defaults (`k = 4`, `m = 2`, `d = k + m - 1`,
    /// `w = 8`); unknown keys are ignored. Validation stops at the first invalid field.
    ///
    /// # Errors
    ///
    /// Returns [`ClayError::InvalidProfile`] naming the offending key if a value fails to
    /// parse, `k < 2`, `m < 1`, `d` is outside `[k, k + m - 1]`, an unsupported scalar
    /// code is requested, `k + m + ν` exceeds 254, or the sub-chunk count `q^t` overflows.
    #[tracing::instrument(level = Level::DEBUG, err(level = Level::WARN), skip(profile))]
    pub fn from_profile(profile: &Profile) -> Result<Self, ClayError> {
        let k = parse_usize(profile, "k", DEFAULT_K)?;
        let m = parse_usize(profile, "m", DEFAULT_M)?;
        if k < 2 {
            return Err(ClayError::InvalidProfile {
                key: "k",
                reason: format!("k={k} must be at least 2"),
            });
        }
        if m < 1 {
            return Err(ClayError::InvalidProfile {
                key: "m",
                reason: format!("m={m} must be at least 1"),
            });
        }

        if let Some(scalar_mds) = non_empty(profile, "scalar_mds") {
            if scalar_mds != "jerasure" {
                return Err(ClayError::InvalidProfile {
                    key: "scalar_mds",
                    reason: format!("{scalar_mds:?} is not supported, use \"jerasure\""),
                });
            }
        }
        if let Some(technique) = non_empty(profile, "technique") {
            if technique != "reed_sol_van" {
                return Err(ClayError::InvalidProfile {
                    key: "technique",
                    reason: format!("{technique:?} is not supported, use \"reed_sol_van\""),
                });
            }
        }

        let d = parse_usize(profile, "d", k + m - 1)?;
        if d < k || d > k + m - 1 {
            return Err(ClayError::InvalidProfile {
                key: "d",
                reason: format!("d={d} must be within [{}, {}]", k, k + m - 1),
            });
        }

        let w = parse_usize(profile, "w", WORD_SIZE)?;
        if w != WORD_SIZE {
            return Err(ClayError::InvalidProfile {
                key: "w",
                reason: format!("w={w} is not supported, the scalar code is fixed to w=8"),
            });
        }

        let q = d - k + 1;
        let nu = (q - (k + m) % q) % q;
        if k + m + nu > MAX_TOTAL_NODES {
            return Err(ClayError::InvalidProfile {
                key: "k",
                reason: format!(
                    "k + m + nu = {} exceeds the maximum of {MAX_TOTAL_NODES}",
                    k + m + nu
                ),
            });
        }
        let t = (k + m + nu) / q;
        let sub_chunk_no = checked_pow(q, t).ok_or_else(|| ClayError::InvalidProfile {
            key: "d",
            reason: format!("the sub-chunk count {q}^{t} overflows"),
        })?;

        let chunk_mapping = match non_empty(profile, "mapping") {
            Some(mapping) => parse_mapping(mapping, k, m)?,
            None => Vec::new(),
        };
        let per_chunk_alignment = parse_bool(profile, "jerasure-per-chunk-alignment", false);

        tracing::debug!(k, m, d, q, t, nu, sub_chunk_no, "derived Clay parameters");
        Ok(Self {
            k,
            m,
            d,
            q,
            t,
            nu,
            sub_chunk_no,
            chunk_mapping,
            per_chunk_alignment,
        })
    }

    /// The number of data chunks `k`.
    #[inline]
    pub fn data_chunk_count(&self) -> usize {
        self.k
    }

    /// The number of parity chunks `m`.
    #[inline]
    pub fn parity_chunk_count(&self) -> usize {
        self.m
    }

    /// The total number of caller-visible chunks `k + m`.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.k + self.m
    }

    /// The number of helpers `d` contacted during single-node repair.
    #[inline]
    pub fn helper_count(&self) -> usize {
        self.d
    }

    /// The number of sub-chunks per chunk, `α = q^t`.
    #[inline]
    pub fn sub_chunk_count(&self) -> usize {
        self.sub_chunk_no
    }

    /// The coupling factor `q = d - k + 1`.
    #[inline]
    pub fn coupling_factor(&self) -> usize {
        self.q
    }

    /// The number of nodes of the internal grid, `q·t = k + m + ν`.
    #[inline]
    pub(crate) fn total_nodes(&self) -> usize {
        self.q * self.t
    }

    /// The stripe alignment: every padded object size is a multiple of this.
    ///
    /// Each of the `k` data chunks must split into `α` sub-chunks whose size is a
    /// multiple of [`SIMD_ALIGN`].
    #[inline]
    pub fn alignment(&self) -> usize {
        self.k * self.sub_chunk_no * SIMD_ALIGN
    }

    /// The chunk size used to encode an object of `object_size` bytes: the smallest
    /// `α`-divisible, alignment-respecting size whose `k`-fold multiple covers the
    /// object. Zero-sized objects use the minimum aligned stripe.
    pub fn chunk_size(&self, object_size: usize) -> usize {
        align_up(object_size.max(1), self.alignment()) / self.k
    }

    /// The internal node holding the caller-visible chunk `chunk`.
    ///
    /// Chunks beyond the data range are shifted past the `ν` virtual shortened nodes.
    pub(crate) fn node_of(&self, chunk: ChunkIndex) -> NodeIndex {
        let index = chunk.as_usize();
        if index < self.k {
            NodeIndex(index as u16)
        } else {
            NodeIndex((index + self.nu) as u16)
        }
    }

    /// The caller-visible chunk stored on `node`, or `None` for a virtual shortened node.
    pub(crate) fn chunk_of(&self, node: NodeIndex) -> Option<ChunkIndex> {
        let index = node.as_usize();
        if index < self.k {
            Some(ChunkIndex(index as u16))
        } else if index >= self.k + self.nu {
            Some(ChunkIndex((index - self.nu) as u16))
        } else {
            None
        }
    }

    /// Returns true iff `node` is one of the `ν` virtual shortened nodes.
    pub(crate) fn is_shortened(&self, node: NodeIndex) -> bool {
        (self.k..self.k + self.nu).contains(&node.as_usize())
    }

    /// The caller-visible position of logical chunk `logical` under the placement
    /// permutation.
    pub(crate) fn position_of(&self, logical: usize) -> usize {
        self.chunk_mapping.get(logical).copied().unwrap_or(logical)
    }

    /// The logical chunk stored at caller-visible position `position`; inverse of
    /// [`position_of`][Self::position_of].
    pub(crate) fn logical_of(&self, position: usize) -> usize {
        if self.chunk_mapping.is_empty() {
            return position;
        }
        self.chunk_mapping
            .iter()
            .position(|&mapped| mapped == position)
            .unwrap_or(position)
    }
}

/// Parses the `D`-pattern placement string: positions marked `D` hold the data chunks in
/// order, the remaining positions hold the parity chunks in order.
fn parse_mapping(mapping: &str, k: usize, m: usize) -> Result<Vec<usize>, ClayError> {
    if mapping.len() != k + m {
        return Err(ClayError::InvalidProfile {
            key: "mapping",
            reason: format!(
                "mapping length {} does not match the chunk count {}",
                mapping.len(),
                k + m
            ),
        });
    }
    let mut data_positions = Vec::with_capacity(k);
    let mut coding_positions = Vec::with_capacity(m);
    for (position, symbol) in mapping.chars().enumerate() {
        if symbol == 'D' {
            data_positions.push(position);
        } else {
            coding_positions.push(position);
        }
    }
    if data_positions.len() != k {
        return Err(ClayError::InvalidProfile {
            key: "mapping",
            reason: format!(
                "mapping must mark exactly {k} data positions, found {}",
                data_positions.len()
            ),
        });
    }
    data_positions.extend(coding_positions);
    Ok(data_positions)
}

fn non_empty<'a>(profile: &'a Profile, key: &str) -> Option<&'a str> {
    profile
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn parse_usize(profile: &Profile, key: &'static str, default: usize) -> Result<usize, ClayError> {
    match non_empty(profile, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ClayError::InvalidProfile {
            key,
            reason: format!("could not parse {value:?} as an integer"),
        }),
    }
}

fn parse_bool(profile: &Profile, key: &str, default: bool) -> bool {
    match non_empty(profile, key) {
        None => default,
        Some(value) => value == "yes" || value == "true",
    }
}

#[cfg(test)]
mod tests {
    use clay_test_utils::param_test;

    use super::*;

    fn profile(k: usize, m: usize, d: usize) -> Profile {
        let mut profile = Profile::new();
        profile.insert("k".to_string(), k.to_string());
        profile.insert("m".to_string(), m.to_string());
        profile.insert("d".to_string(), d.to_string());
        profile
    }

    param_test! {
        derives_expected_parameters -> Result<(), ClayError>: [
            paper_example: (4, 2, 5, 2, 0, 3, 8),
            larger: (10, 4, 13, 4, 2, 4, 256),
            shortened: (4, 3, 5, 2, 1, 4, 16),
            degenerate_repair: (2, 1, 2, 1, 0, 3, 1),
            three_way: (6, 3, 8, 3, 0, 3, 27),
        ]
    }
    fn derives_expected_parameters(
        k: usize,
        m: usize,
        d: usize,
        q: usize,
        nu: usize,
        t: usize,
        alpha: usize,
    ) -> Result<(), ClayError> {
        let config = ClayConfig::from_profile(&profile(k, m, d))?;
        assert_eq!(config.q, q);
        assert_eq!(config.nu, nu);
        assert_eq!(config.t, t);
        assert_eq!(config.sub_chunk_count(), alpha);
        assert_eq!(config.total_nodes(), k + m + nu);
        Ok(())
    }

    #[test]
    fn defaults_apply_for_missing_keys() {
        let config = ClayConfig::from_profile(&Profile::new()).expect("defaults are valid");
        assert_eq!(config.data_chunk_count(), DEFAULT_K);
        assert_eq!(config.parity_chunk_count(), DEFAULT_M);
        assert_eq!(config.chunk_count(), DEFAULT_K + DEFAULT_M);
        assert_eq!(config.helper_count(), DEFAULT_K + DEFAULT_M - 1);
    }

    param_test! {
        invalid_profiles_name_the_offending_key: [
            k_too_small: ("k", "1", "k"),
            m_too_small: ("m", "0", "m"),
            d_below_range: ("d", "3", "d"),
            d_above_range: ("d", "6", "d"),
            unparsable_int: ("k", "four", "k"),
            wrong_scalar_mds: ("scalar_mds", "isa", "scalar_mds"),
            wrong_technique: ("technique", "cauchy_good", "technique"),
            wrong_word_size: ("w", "16", "w"),
        ]
    }
    fn invalid_profiles_name_the_offending_key(key: &str, value: &str, expected_key: &str) {
        let mut profile = profile(4, 2, 5);
        profile.insert(key.to_string(), value.to_string());
        match ClayConfig::from_profile(&profile) {
            Err(ClayError::InvalidProfile { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected an InvalidProfile error, got {other:?}"),
        }
    }

    #[test]
    fn total_node_limit_is_enforced() {
        let result = ClayConfig::from_profile(&profile(200, 60, 259));
        assert!(matches!(
            result,
            Err(ClayError::InvalidProfile { key: "k", .. })
        ));
    }

    #[test]
    fn sub_chunk_count_overflow_is_rejected() {
        // k + m + nu = 254 passes the node limit, but q^t = 2^127 does not fit.
        let result = ClayConfig::from_profile(&profile(2, 252, 3));
        assert!(matches!(
            result,
            Err(ClayError::InvalidProfile { key: "d", .. })
        ));
    }

    param_test! {
        chunk_size_is_aligned_and_covering -> Result<(), ClayError>: [
            zero: (0, 256),
            one_byte: (1, 256),
            exact_stripe: (1024, 256),
            one_past_stripe: (1025, 512),
        ]
    }
    fn chunk_size_is_aligned_and_covering(
        object_size: usize,
        expected: usize,
    ) -> Result<(), ClayError> {
        let config = ClayConfig::from_profile(&profile(4, 2, 5))?;
        let chunk_size = config.chunk_size(object_size);
        assert_eq!(chunk_size, expected);
        assert_eq!(chunk_size % config.sub_chunk_count(), 0);
        assert_eq!((chunk_size / config.sub_chunk_count()) % SIMD_ALIGN, 0);
        assert!(config.data_chunk_count() * chunk_size >= object_size);
        Ok(())
    }

    #[test]
    fn node_conversions_respect_shortening() {
        let config = ClayConfig::from_profile(&profile(4, 3, 5)).expect("profile is valid");
        assert_eq!(config.nu, 1);
        assert_eq!(config.node_of(ChunkIndex(3)), NodeIndex(3));
        assert_eq!(config.node_of(ChunkIndex(4)), NodeIndex(5));
        assert_eq!(config.chunk_of(NodeIndex(3)), Some(ChunkIndex(3)));
        assert_eq!(config.chunk_of(NodeIndex(4)), None);
        assert!(config.is_shortened(NodeIndex(4)));
        assert_eq!(config.chunk_of(NodeIndex(5)), Some(ChunkIndex(4)));
    }

    #[test]
    fn mapping_permutation_roundtrips() {
        let mut profile = profile(4, 2, 5);
        profile.insert("mapping".to_string(), "CDDDDC".to_string());
        let config = ClayConfig::from_profile(&profile).expect("profile is valid");
        assert_eq!(config.position_of(0), 1);
        assert_eq!(config.position_of(3), 4);
        assert_eq!(config.position_of(4), 0);
        assert_eq!(config.position_of(5), 5);
        for logical in 0..config.chunk_count() {
            assert_eq!(config.logical_of(config.position_of(logical)), logical);
        }
    }

    param_test! {
        invalid_mappings_are_rejected: [
            wrong_length: ("DDDD"),
            wrong_data_count: ("DDDDDC"),
        ]
    }
    fn invalid_mappings_are_rejected(mapping: &str) {
        let mut profile = profile(4, 2, 5);
        profile.insert("mapping".to_string(), mapping.to_string());
        assert!(matches!(
            ClayConfig::from_profile(&profile),
            Err(ClayError::InvalidProfile { key: "mapping", .. })
        ));
    }
}
