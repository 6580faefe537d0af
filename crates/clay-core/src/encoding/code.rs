// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The caller-facing Clay code instance.

use std::collections::{BTreeMap, BTreeSet};

use tracing::Level;

use super::{
    decoder::decode_layered,
    repair::{self, DecodePlan},
    ClayConfig, ClayError, CouplingEngine, NodeIndex, SubChunks, VandermondeMds,
};
use crate::{ChunkIndex, Profile};

/// A Clay erasure code instance.
///
/// An instance is created once from a [`Profile`] and is immutable in its parameters;
/// two instances built from equal profiles produce byte-identical outputs for the same
/// inputs. Operations take `&mut self` because the instance owns the uncoupled scratch
/// buffers used during a call; an instance must therefore not be shared between
/// concurrent calls, while distinct instances are fully independent.
///
/// Chunk maps passed in are never mutated; all outputs are freshly allocated, so a
/// failed call leaves no caller-visible buffer partially modified.
#[derive(Debug)]
pub struct ClayCode {
    config: ClayConfig,
    mds: VandermondeMds,
    pft: CouplingEngine,
    /// Uncoupled scratch, one entry per internal node while a call is in flight; cleared
    /// before every top-level return.
    u_buf: Vec<SubChunks>,
}

impl ClayCode {
    /// Creates an instance from the profile, validating it and instantiating the
    /// `(k + ν, m)` scalar code and the `(2, 2)` pairwise-transform code.
    ///
    /// # Errors
    ///
    /// Returns [`ClayError::InvalidProfile`] if the profile is rejected; see
    /// [`ClayConfig::from_profile`] for the validation rules. No partial state is
    /// retained on failure.
    #[tracing::instrument(level = Level::DEBUG, err(level = Level::WARN), skip(profile))]
    pub fn from_profile(profile: &Profile) -> Result<Self, ClayError> {
        let config = ClayConfig::from_profile(profile)?;
        let mds = VandermondeMds::new(config.k + config.nu, config.m)?;
        let pft = CouplingEngine::new()?;
        Ok(Self {
            config,
            mds,
            pft,
            u_buf: Vec::new(),
        })
    }

    /// The validated configuration of this instance.
    #[inline]
    pub fn config(&self) -> &ClayConfig {
        &self.config
    }

    /// The number of data chunks `k`.
    #[inline]
    pub fn data_chunk_count(&self) -> usize {
        self.config.data_chunk_count()
    }

    /// The number of parity chunks `m`.
    #[inline]
    pub fn parity_chunk_count(&self) -> usize {
        self.config.parity_chunk_count()
    }

    /// The total number of chunks `k + m`.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.config.chunk_count()
    }

    /// The number of helpers `d` contacted during single-node repair.
    #[inline]
    pub fn helper_count(&self) -> usize {
        self.config.helper_count()
    }

    /// The number of sub-chunks per chunk, `α`.
    #[inline]
    pub fn sub_chunk_count(&self) -> usize {
        self.config.sub_chunk_count()
    }

    /// The chunk size used for a stripe of `stripe_width` bytes.
    #[inline]
    pub fn chunk_size(&self, stripe_width: usize) -> usize {
        self.config.chunk_size(stripe_width)
    }

    /// Whether callers must preserve the per-helper sub-chunk ranges returned by
    /// [`minimum_to_decode`][Self::minimum_to_decode]. Always true for Clay codes:
    /// stripping the ranges would turn every repair into a full-chunk read.
    #[inline]
    pub fn requires_sub_chunks(&self) -> bool {
        true
    }

    /// The repair traffic of this code relative to the size of the repaired chunk:
    /// `d / (k · q)`. Classical MDS repair has ratio 1.
    pub fn normalized_repair_bandwidth(&self) -> f64 {
        self.config.d as f64 / (self.config.k * self.config.q) as f64
    }

    /// Encodes `data` and returns the chunks selected by `want`.
    ///
    /// The data is zero-padded to `k` chunks of [`chunk_size`][Self::chunk_size] bytes.
    /// All `k + m` symbols are computed in one layered pass (the parity nodes are
    /// declared erased and solved for) and the result is projected onto `want`.
    ///
    /// # Errors
    ///
    /// Returns [`ClayError::DecodeFailed`] if a scalar solve fails; this indicates a bug
    /// rather than a property of the input.
    #[tracing::instrument(level = Level::TRACE, skip_all, fields(data_len = data.len()))]
    pub fn encode(
        &mut self,
        want: &BTreeSet<ChunkIndex>,
        data: &[u8],
    ) -> Result<BTreeMap<ChunkIndex, Vec<u8>>, ClayError> {
        self.check_indices(want.iter())?;
        let chunk_size = self.config.chunk_size(data.len());
        let sub_chunk_size = chunk_size / self.config.sub_chunk_count();

        let mut nodes = self.node_buffers(sub_chunk_size);
        for logical in 0..self.config.k {
            let start = logical * chunk_size;
            if start >= data.len() {
                break;
            }
            let end = usize::min(start + chunk_size, data.len());
            nodes[logical].as_mut_slice()[..end - start].copy_from_slice(&data[start..end]);
        }

        let parities: BTreeSet<NodeIndex> = (self.config.k + self.config.nu
            ..self.config.total_nodes())
            .map(|node| NodeIndex(node as u16))
            .collect();
        self.u_buf = self.node_buffers(sub_chunk_size);
        let result = decode_layered(
            &self.config,
            &self.mds,
            &self.pft,
            &parities,
            &mut nodes,
            &mut self.u_buf,
        );
        self.u_buf = Vec::new();
        result?;

        Ok(want
            .iter()
            .map(|&position| {
                let logical = self.config.logical_of(position.as_usize());
                let node = self.config.node_of(ChunkIndex(logical as u16));
                (position, nodes[node.as_usize()].to_vec())
            })
            .collect())
    }

    /// The minimal chunk set, with per-chunk sub-chunk ranges, needed to serve a read of
    /// `want` given the `available` chunks.
    ///
    /// If the request qualifies for single-node repair, the result is the `d` helpers
    /// each tagged with the `α/q` repair ranges; otherwise it is the wanted chunks (if
    /// all available) or any `k` available chunks, tagged with the full `[(0, α)]`
    /// range.
    ///
    /// # Errors
    ///
    /// Returns [`ClayError::InsufficientShares`] if fewer than `k` chunks are available.
    pub fn minimum_to_decode(
        &self,
        want: &BTreeSet<ChunkIndex>,
        available: &BTreeSet<ChunkIndex>,
    ) -> Result<BTreeMap<ChunkIndex, Vec<(usize, usize)>>, ClayError> {
        self.check_indices(want.iter())?;
        self.check_indices(available.iter())?;
        let want_logical = self.to_logical_set(want);
        let available_logical = self.to_logical_set(available);

        if repair::is_repair(&self.config, &want_logical, &available_logical) {
            let minimum = repair::minimum_to_repair(&self.config, &want_logical, &available_logical)?;
            return Ok(minimum
                .into_iter()
                .map(|(chunk, ranges)| (self.to_position(chunk), ranges))
                .collect());
        }

        let full_range = vec![(0, self.config.sub_chunk_count())];
        if want.iter().all(|chunk| available.contains(chunk)) {
            return Ok(want
                .iter()
                .map(|&chunk| (chunk, full_range.clone()))
                .collect());
        }
        if available.len() < self.config.k {
            return Err(ClayError::InsufficientShares);
        }
        Ok(available
            .iter()
            .take(self.config.k)
            .map(|&chunk| (chunk, full_range.clone()))
            .collect())
    }

    /// Decodes the chunks in `want` from the available `chunks`.
    ///
    /// The request is classified explicitly: a single lost chunk accompanied by exactly
    /// `d` packed helper payloads takes the bandwidth-optimal repair path; everything
    /// else goes through the layered decoder on full-size chunks. `chunk_size` is the
    /// full chunk size in both cases.
    ///
    /// # Errors
    ///
    /// - [`ClayError::InsufficientShares`] if more than `m` chunks are missing.
    /// - [`ClayError::MisalignedChunk`] if chunk lengths are unequal or not a multiple
    ///   of `α`.
    /// - [`ClayError::MisalignedInput`] if `chunk_size` disagrees with the buffers.
    /// - [`ClayError::DecodeFailed`] if a scalar solve fails.
    #[tracing::instrument(level = Level::TRACE, skip_all, fields(n_chunks = chunks.len(), chunk_size))]
    pub fn decode(
        &mut self,
        want: &BTreeSet<ChunkIndex>,
        chunks: &BTreeMap<ChunkIndex, Vec<u8>>,
        chunk_size: usize,
    ) -> Result<BTreeMap<ChunkIndex, Vec<u8>>, ClayError> {
        self.check_indices(want.iter())?;
        self.check_indices(chunks.keys())?;

        if want.iter().all(|chunk| chunks.contains_key(chunk)) {
            return Ok(want
                .iter()
                .map(|&chunk| (chunk, chunks[&chunk].clone()))
                .collect());
        }

        let logical_chunks: BTreeMap<ChunkIndex, &[u8]> = chunks
            .iter()
            .map(|(&position, bytes)| {
                let logical = self.config.logical_of(position.as_usize());
                (ChunkIndex(logical as u16), bytes.as_slice())
            })
            .collect();
        let want_logical = self.to_logical_set(want);

        match repair::classify(&self.config, &want_logical, &logical_chunks, chunk_size) {
            DecodePlan::RepairOne { lost } => {
                tracing::trace!(%lost, "serving the request through single-node repair");
                if chunk_size == 0 || chunk_size % self.config.sub_chunk_count() != 0 {
                    return Err(ClayError::MisalignedInput);
                }
                let sub_chunk_size = chunk_size / self.config.sub_chunk_count();
                self.u_buf = self.node_buffers(sub_chunk_size);
                let result = repair::repair(
                    &self.config,
                    &self.mds,
                    &self.pft,
                    lost,
                    &logical_chunks,
                    chunk_size,
                    &mut self.u_buf,
                );
                self.u_buf = Vec::new();
                let repaired = result?;
                let position = *want.iter().next().expect("classification checked |want| = 1");
                Ok(BTreeMap::from([(position, repaired)]))
            }
            DecodePlan::General { erasures } => {
                tracing::trace!(
                    n_erasures = erasures.len(),
                    "serving the request through the layered decoder"
                );
                if erasures.len() > self.config.m {
                    return Err(ClayError::InsufficientShares);
                }
                let mut lengths = logical_chunks.values().map(|bytes| bytes.len());
                if let Some(first) = lengths.next() {
                    if lengths.any(|length| length != first) {
                        return Err(ClayError::MisalignedChunk);
                    }
                    if first != chunk_size {
                        return Err(ClayError::MisalignedInput);
                    }
                }
                if chunk_size == 0 || chunk_size % self.config.sub_chunk_count() != 0 {
                    return Err(ClayError::MisalignedChunk);
                }
                let sub_chunk_size = chunk_size / self.config.sub_chunk_count();

                let mut nodes = self.node_buffers(sub_chunk_size);
                for (&chunk, &bytes) in &logical_chunks {
                    nodes[self.config.node_of(chunk).as_usize()] =
                        SubChunks::from_slice(bytes, sub_chunk_size);
                }
                self.u_buf = self.node_buffers(sub_chunk_size);
                let result = decode_layered(
                    &self.config,
                    &self.mds,
                    &self.pft,
                    &erasures,
                    &mut nodes,
                    &mut self.u_buf,
                );
                self.u_buf = Vec::new();
                result?;

                Ok(want
                    .iter()
                    .map(|&position| {
                        let logical = self.config.logical_of(position.as_usize());
                        let node = self.config.node_of(ChunkIndex(logical as u16));
                        (position, nodes[node.as_usize()].to_vec())
                    })
                    .collect())
            }
        }
    }

    /// Decodes and concatenates the `k` data chunks in data order.
    ///
    /// # Errors
    ///
    /// Returns [`ClayError::InsufficientShares`] if the chunk map is empty or too many
    /// chunks are missing; otherwise as [`decode`][Self::decode].
    pub fn decode_concat(
        &mut self,
        chunks: &BTreeMap<ChunkIndex, Vec<u8>>,
    ) -> Result<Vec<u8>, ClayError> {
        let chunk_size = chunks
            .values()
            .next()
            .map(Vec::len)
            .ok_or(ClayError::InsufficientShares)?;
        let want: BTreeSet<ChunkIndex> = (0..self.config.k)
            .map(|logical| self.to_position(ChunkIndex(logical as u16)))
            .collect();
        let mut decoded = self.decode(&want, chunks, chunk_size)?;

        let mut data = Vec::with_capacity(self.config.k * chunk_size);
        for logical in 0..self.config.k {
            let position = self.to_position(ChunkIndex(logical as u16));
            let chunk = decoded.remove(&position).ok_or_else(|| {
                ClayError::Internal(format!("decode did not return wanted chunk {position}"))
            })?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Fresh zero-filled per-node buffers of `α` sub-chunks each.
    fn node_buffers(&self, sub_chunk_size: usize) -> Vec<SubChunks> {
        (0..self.config.total_nodes())
            .map(|_| SubChunks::zeros(self.config.sub_chunk_count(), sub_chunk_size))
            .collect()
    }

    /// Rejects chunk indices outside `[0, k + m)`; passing one is a caller bug.
    fn check_indices<'a>(
        &self,
        indices: impl Iterator<Item = &'a ChunkIndex>,
    ) -> Result<(), ClayError> {
        for chunk in indices {
            if chunk.as_usize() >= self.config.chunk_count() {
                return Err(ClayError::Internal(format!(
                    "chunk index {chunk} is out of range for a ({}, {}) code",
                    self.config.k, self.config.m
                )));
            }
        }
        Ok(())
    }

    fn to_logical_set(&self, positions: &BTreeSet<ChunkIndex>) -> BTreeSet<ChunkIndex> {
        positions
            .iter()
            .map(|position| ChunkIndex(self.config.logical_of(position.as_usize()) as u16))
            .collect()
    }

    fn to_position(&self, logical: ChunkIndex) -> ChunkIndex {
        ChunkIndex(self.config.position_of(logical.as_usize()) as u16)
    }
}
