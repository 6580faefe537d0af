// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The scalar MDS collaborator.
//!
//! The coupled-layer construction treats the scalar code as a black box: a systematic
//! `(k', m')` MDS over equally sized byte buffers that can produce the parity chunks from
//! the data chunks and reconstruct up to `m'` missing chunks from the survivors. Both the
//! main `(k + ν, m)` instance and the `(2, 2)` pairwise-transform instance go through the
//! same interface, so the concrete backend remains a plug point.

use reed_solomon_erasure::galois_8::ReedSolomon;
use thiserror::Error;

use super::ClayError;

/// Error type returned by the scalar MDS backend.
#[derive(Debug, Error)]
pub(crate) enum MdsError {
    /// The backend rejected the shard set (too few shards present, inconsistent sizes).
    #[error(transparent)]
    Backend(#[from] reed_solomon_erasure::Error),
}

/// The scalar `(k', m')` MDS contract required by the coupled-layer construction.
///
/// Implementations operate on shard slices of length `data_chunks() + coding_chunks()`
/// whose entries all have equal, non-zero size.
pub(crate) trait ScalarMds {
    /// The number of data chunks `k'`.
    fn data_chunks(&self) -> usize;

    /// The number of coding chunks `m'`.
    fn coding_chunks(&self) -> usize;

    /// The total number of chunks `k' + m'`.
    fn total_chunks(&self) -> usize {
        self.data_chunks() + self.coding_chunks()
    }

    /// Computes the coding chunks from the data chunks, overwriting the trailing
    /// `coding_chunks()` entries of `shards`.
    fn encode_chunks(&self, shards: &mut [Vec<u8>]) -> Result<(), MdsError>;

    /// Reconstructs every `None` entry of `shards` (data and coding alike) from the
    /// present ones.
    ///
    /// At most `coding_chunks()` entries may be absent. On success all entries are
    /// `Some`; on failure no entry has been modified in a way the caller may observe.
    fn decode_chunks(&self, shards: &mut [Option<Vec<u8>>]) -> Result<(), MdsError>;
}

/// Scalar MDS backend: a systematic Vandermonde-derived Reed-Solomon code over GF(2^8).
///
/// This matches the word size the coupled-layer derivation assumes (`w = 8`, at most 254
/// chunks in total) and reconstructs data and coding chunks alike in a single pass.
pub(crate) struct VandermondeMds {
    rs: ReedSolomon,
    data_chunks: usize,
    coding_chunks: usize,
}

impl VandermondeMds {
    /// Creates a new `(data_chunks, coding_chunks)` instance.
    ///
    /// Parameters are validated by the profile layer beforehand; a backend rejection here
    /// is an internal error.
    pub fn new(data_chunks: usize, coding_chunks: usize) -> Result<Self, ClayError> {
        let rs = ReedSolomon::new(data_chunks, coding_chunks).map_err(|error| {
            ClayError::Internal(format!(
                "the ({data_chunks}, {coding_chunks}) MDS instance could not be created: {error}"
            ))
        })?;
        Ok(Self {
            rs,
            data_chunks,
            coding_chunks,
        })
    }
}

impl ScalarMds for VandermondeMds {
    #[inline]
    fn data_chunks(&self) -> usize {
        self.data_chunks
    }

    #[inline]
    fn coding_chunks(&self) -> usize {
        self.coding_chunks
    }

    fn encode_chunks(&self, shards: &mut [Vec<u8>]) -> Result<(), MdsError> {
        self.rs.encode(shards)?;
        Ok(())
    }

    fn decode_chunks(&self, shards: &mut [Option<Vec<u8>>]) -> Result<(), MdsError> {
        self.rs.reconstruct(shards)?;
        Ok(())
    }
}

impl std::fmt::Debug for VandermondeMds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VandermondeMds")
            .field("data_chunks", &self.data_chunks)
            .field("coding_chunks", &self.coding_chunks)
            .finish()
    }
}
