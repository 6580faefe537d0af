// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Test utilities shared between the Clay erasure code crates.

use rand::{rngs::StdRng, RngCore, SeedableRng};

/// A result type useful in tests, that wraps any error implementation.
pub type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Macro for creating parametrized *synchronous* tests.
///
/// The `param_test!` macro accepts the name of an existing function, followed by a list of case
/// names and their arguments. It expands to a module with a `#[test]` function for each of the
/// cases. Each test case calls the existing, named function with their provided arguments.
///
/// # Examples
///
/// Calling a simple test function can be done as follows:
///
/// ```
/// # use clay_test_utils::param_test;
/// #
/// param_test! {
///     test_sum: [
///         positive_sums: (10, 7, 17),
///         negative_sums: (-5, -3, -8)
///     ]
/// }
/// fn test_sum(lhs: i32, rhs: i32, sum: i32) {
///     assert_eq!(lhs + rhs, sum);
/// }
/// ```
///
/// Additionally, test functions can also have return types, such as a [`Result`]:
///
/// ```
/// # use std::error::Error;
/// # use clay_test_utils::param_test;
/// #
/// param_test! {
///     test_parses -> Result<(), Box<dyn Error>>: [
///         positive: ("21", 21),
///         negative: ("-17", -17),
///     ]
/// }
/// fn test_parses(to_parse: &str, expected: i32) -> Result<(), Box<dyn Error>> {
///     assert_eq!(expected, to_parse.parse::<i32>()?);
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! param_test {
    ($func_name:ident -> $return_ty:ty: [
        $( $(#[$outer:meta])* $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        mod $func_name {
            use super::*;

            $(
                #[test]
                $(#[$outer])*
                fn $case_name() -> $return_ty {
                    $func_name($($args),*)
                }
            )*
        }
    };
    ($func_name:ident: [
        $( $(#[$outer:meta])* $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        $crate::param_test!($func_name -> (): [ $( $(#[$outer])* $case_name: ( $($args),* ) ),+ ]);
    };
}

/// Returns a deterministically generated vector of `data_length` random bytes.
///
/// Repeated calls within the same binary return the same data. Use
/// [`random_data_from_rng`] with differently seeded [`StdRng`]s to get distinct samples.
pub fn random_data(data_length: usize) -> Vec<u8> {
    random_data_from_rng(data_length, &mut StdRng::seed_from_u64(42))
}

/// Returns a vector of `data_length` random bytes drawn from the provided `rng`.
pub fn random_data_from_rng(data_length: usize, rng: &mut impl RngCore) -> Vec<u8> {
    let mut result = vec![0u8; data_length];
    rng.fill_bytes(&mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    param_test! {
        random_data_has_requested_length: [
            empty: (0),
            one: (1),
            unaligned: (1023),
            large: (1 << 20),
        ]
    }
    fn random_data_has_requested_length(data_length: usize) {
        assert_eq!(random_data(data_length).len(), data_length);
    }

    #[test]
    fn random_data_is_deterministic() {
        assert_eq!(random_data(128), random_data(128));
    }
}
