// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Error type returned by all fallible operations of the Clay code.
///
/// The first four variants are user errors: the caller supplied a profile, a chunk map, or
/// buffer sizes that violate the documented contracts. [`DecodeFailed`][Self::DecodeFailed]
/// and [`Internal`][Self::Internal] signal a logic error and should be logged at error
/// severity by the caller; neither is expected on any input that passed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClayError {
    /// The profile contains an invalid or unsupported value for the named key.
    #[error("invalid profile value for {key:?}: {reason}")]
    InvalidProfile {
        /// The profile key whose value was rejected.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Fewer chunks are available than are needed to decode, or more chunks are missing
    /// than the code can tolerate.
    #[error("not enough chunks are available to decode")]
    InsufficientShares,
    /// The declared chunk size disagrees with the supplied buffers or is not a multiple of
    /// the sub-chunk granularity.
    #[error("the input size is inconsistent with the declared chunk size")]
    MisalignedInput,
    /// The supplied chunks have unequal lengths, or a length that cannot be split into
    /// sub-chunks.
    #[error("chunk sizes are unequal or not a multiple of the sub-chunk count")]
    MisalignedChunk,
    /// The scalar MDS solve failed on the given plane.
    #[error("the MDS solve failed on plane {0}")]
    DecodeFailed(usize),
    /// An internal invariant was violated.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}
