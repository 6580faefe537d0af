// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The pairwise coupling transform.
//!
//! Every hole `(x, y)` on plane `z` is coupled with the hole `(z_y, y)` on the companion
//! plane, forming a quadruple of sub-chunks: the two *coupled* (caller-visible) symbols
//! and their two *uncoupled* (internal MDS) counterparts. The quadruple is related by a
//! `(2, 2)` scalar MDS instance, so any two of the four symbols determine the other two.
//! All conversions between the coupled and uncoupled representations are expressed as
//! erasure decodes of that instance.

use super::{
    mds::MdsError,
    ClayError, ScalarMds, VandermondeMds,
};

/// Slot order of a coupled pair within its `(2, 2)` MDS instance.
///
/// The scalar code must see the two coupled symbols at positions 0 and 1 and their
/// uncoupled counterparts at positions 2 and 3, with the lexicographically larger hole
/// first. The pair is traversed from one of its two sides; when the traversed hole's
/// column is below the dot column the slot assignment is mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairOrientation {
    /// The traversed hole has `x > z_y`; slots are `(0, 1, 2, 3)`.
    Forward,
    /// The traversed hole has `x < z_y`; slots are `(1, 0, 3, 2)`.
    Reversed,
}

impl PairOrientation {
    /// The orientation of the hole in column `x` whose row has dot column `dot_column`.
    pub fn of(x: usize, dot_column: usize) -> Self {
        debug_assert_ne!(x, dot_column, "a dot has no pair orientation");
        if x > dot_column {
            Self::Forward
        } else {
            Self::Reversed
        }
    }

    /// MDS slots `(own coupled, companion coupled, own uncoupled, companion uncoupled)`.
    fn slots(&self) -> [usize; 4] {
        match self {
            Self::Forward => [0, 1, 2, 3],
            Self::Reversed => [1, 0, 3, 2],
        }
    }
}

/// Pairwise transform engine: a `(2, 2)` scalar MDS applied to sub-chunk quadruples.
#[derive(Debug)]
pub(crate) struct CouplingEngine {
    code: VandermondeMds,
}

impl CouplingEngine {
    /// Creates the engine with its `(2, 2)` scalar code.
    pub fn new() -> Result<Self, ClayError> {
        Ok(Self {
            code: VandermondeMds::new(2, 2)?,
        })
    }

    /// Derives both uncoupled symbols of a pair from its two coupled symbols.
    ///
    /// Returns `(own uncoupled, companion uncoupled)` for the traversed hole.
    pub fn uncoupled_from_coupled(
        &self,
        coupled: &[u8],
        companion_coupled: &[u8],
        orientation: PairOrientation,
    ) -> Result<(Vec<u8>, Vec<u8>), MdsError> {
        let [s0, s1, s2, s3] = orientation.slots();
        let mut shards: [Option<&[u8]>; 4] = [None; 4];
        shards[s0] = Some(coupled);
        shards[s1] = Some(companion_coupled);
        let mut solved = self.solve(shards)?;
        Ok((take(&mut solved, s2), take(&mut solved, s3)))
    }

    /// Derives both coupled symbols of a pair from its two uncoupled symbols.
    ///
    /// Traversal is always from the `x > z_y` side, so no orientation is needed; the
    /// return order is `(own coupled, companion coupled)` for that side.
    pub fn coupled_from_uncoupled(
        &self,
        uncoupled: &[u8],
        companion_uncoupled: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), MdsError> {
        let mut shards: [Option<&[u8]>; 4] = [None; 4];
        shards[2] = Some(uncoupled);
        shards[3] = Some(companion_uncoupled);
        let mut solved = self.solve(shards)?;
        Ok((take(&mut solved, 0), take(&mut solved, 1)))
    }

    /// Completes a half-known pair: recovers the traversed hole's coupled symbol from the
    /// companion's coupled symbol and the traversed hole's own uncoupled symbol.
    pub fn coupled_from_companion(
        &self,
        companion_coupled: &[u8],
        uncoupled: &[u8],
        orientation: PairOrientation,
    ) -> Result<Vec<u8>, MdsError> {
        let [s0, s1, s2, _] = orientation.slots();
        let mut shards: [Option<&[u8]>; 4] = [None; 4];
        shards[s1] = Some(companion_coupled);
        shards[s2] = Some(uncoupled);
        let mut solved = self.solve(shards)?;
        Ok(take(&mut solved, s0))
    }

    /// Completes a half-known pair: recovers the *companion's* coupled symbol from the
    /// traversed hole's coupled and uncoupled symbols.
    pub fn companion_coupled(
        &self,
        coupled: &[u8],
        uncoupled: &[u8],
        orientation: PairOrientation,
    ) -> Result<Vec<u8>, MdsError> {
        let [s0, s1, s2, _] = orientation.slots();
        let mut shards: [Option<&[u8]>; 4] = [None; 4];
        shards[s0] = Some(coupled);
        shards[s2] = Some(uncoupled);
        let mut solved = self.solve(shards)?;
        Ok(take(&mut solved, s1))
    }

    /// Completes a half-known pair: recovers the traversed hole's uncoupled symbol from
    /// its own coupled symbol and the companion's uncoupled symbol.
    pub fn uncoupled_from_companion(
        &self,
        coupled: &[u8],
        companion_uncoupled: &[u8],
        orientation: PairOrientation,
    ) -> Result<Vec<u8>, MdsError> {
        let [s0, _, s2, s3] = orientation.slots();
        let mut shards: [Option<&[u8]>; 4] = [None; 4];
        shards[s0] = Some(coupled);
        shards[s3] = Some(companion_uncoupled);
        let mut solved = self.solve(shards)?;
        Ok(take(&mut solved, s2))
    }

    /// Reconstructs the absent slots of the quadruple; any two present slots suffice.
    fn solve(&self, shards: [Option<&[u8]>; 4]) -> Result<[Option<Vec<u8>>; 4], MdsError> {
        let mut work: Vec<Option<Vec<u8>>> = shards
            .into_iter()
            .map(|shard| shard.map(<[u8]>::to_vec))
            .collect();
        self.code.decode_chunks(&mut work)?;
        let mut iter = work.into_iter();
        Ok([
            iter.next().flatten(),
            iter.next().flatten(),
            iter.next().flatten(),
            iter.next().flatten(),
        ])
    }
}

/// Moves the reconstructed shard out of `slot`.
fn take(solved: &mut [Option<Vec<u8>>; 4], slot: usize) -> Vec<u8> {
    solved[slot]
        .take()
        .expect("reconstruct fills every absent slot")
}

#[cfg(test)]
mod tests {
    use clay_test_utils::{param_test, random_data};

    use super::*;

    fn engine() -> CouplingEngine {
        CouplingEngine::new().expect("the (2, 2) code is always valid")
    }

    fn pair(sub_chunk_size: usize) -> (Vec<u8>, Vec<u8>) {
        let data = random_data(2 * sub_chunk_size);
        (
            data[..sub_chunk_size].to_vec(),
            data[sub_chunk_size..].to_vec(),
        )
    }

    param_test! {
        transform_is_an_involution -> clay_test_utils::Result: [
            forward: (PairOrientation::Forward, 32),
            reversed: (PairOrientation::Reversed, 32),
            large_sub_chunks: (PairOrientation::Forward, 4096),
        ]
    }
    fn transform_is_an_involution(
        orientation: PairOrientation,
        sub_chunk_size: usize,
    ) -> clay_test_utils::Result {
        let engine = engine();
        let (c_own, c_companion) = pair(sub_chunk_size);

        let (u_own, u_companion) =
            engine.uncoupled_from_coupled(&c_own, &c_companion, orientation)?;
        // Re-derive the coupled pair from the forward side.
        let (fwd_u, fwd_companion_u) = match orientation {
            PairOrientation::Forward => (u_own.clone(), u_companion.clone()),
            PairOrientation::Reversed => (u_companion.clone(), u_own.clone()),
        };
        let (restored, restored_companion) =
            engine.coupled_from_uncoupled(&fwd_u, &fwd_companion_u)?;
        match orientation {
            PairOrientation::Forward => {
                assert_eq!(restored, c_own);
                assert_eq!(restored_companion, c_companion);
            }
            PairOrientation::Reversed => {
                assert_eq!(restored, c_companion);
                assert_eq!(restored_companion, c_own);
            }
        }
        Ok(())
    }

    param_test! {
        half_pair_completions_are_consistent -> clay_test_utils::Result: [
            forward: (PairOrientation::Forward),
            reversed: (PairOrientation::Reversed),
        ]
    }
    fn half_pair_completions_are_consistent(
        orientation: PairOrientation,
    ) -> clay_test_utils::Result {
        let engine = engine();
        let (c_own, c_companion) = pair(64);
        let (u_own, u_companion) =
            engine.uncoupled_from_coupled(&c_own, &c_companion, orientation)?;

        assert_eq!(
            engine.coupled_from_companion(&c_companion, &u_own, orientation)?,
            c_own
        );
        assert_eq!(
            engine.companion_coupled(&c_own, &u_own, orientation)?,
            c_companion
        );
        assert_eq!(
            engine.uncoupled_from_companion(&c_own, &u_companion, orientation)?,
            u_own
        );
        Ok(())
    }
}
