//! Common logic for the consolidation of update vectors.
//!
//! Difference collections accumulate `(record, multiplicity)` pairs in which
//! the same record may appear many times. Consolidation reduces such a vector
//! to the point that each record occurs at most once, with the accumulated
//! multiplicity, discarding records whose accumulation is zero. These methods
//! are used internally by the multiset and the versioned index, and are public
//! for the convenience of tests and callers with their own update vectors.

use crate::Diff;

/// Sorts and consolidates `vec`.
///
/// This method will sort `vec` and then consolidate runs of more than one
/// entry with identical first elements by accumulating the multiplicities.
/// Should the final accumulation be zero, the entry is discarded.
pub fn consolidate<T: Ord>(vec: &mut Vec<(T, Diff)>) {
    let length = consolidate_slice(vec);
    vec.truncate(length);
}

/// Sorts and consolidates a slice, returning the valid prefix length.
pub fn consolidate_slice<T: Ord>(slice: &mut [(T, Diff)]) -> usize {
    if slice.len() <= 1 {
        return slice.iter().filter(|x| x.1 != 0).count();
    }

    slice.sort_by(|x, y| x.0.cmp(&y.0));

    // Counts the number of distinct known-non-zero accumulations. Indexes the
    // write location.
    let mut offset = 0;
    let mut accum = slice[0].1;

    for index in 1..slice.len() {
        if slice[index].0 == slice[index - 1].0 {
            accum += slice[index].1;
        } else {
            if accum != 0 {
                slice.swap(offset, index - 1);
                slice[offset].1 = accum;
                offset += 1;
            }
            accum = slice[index].1;
        }
    }
    if accum != 0 {
        slice.swap(offset, slice.len() - 1);
        slice[offset].1 = accum;
        offset += 1;
    }

    offset
}

/// Sorts and consolidates a vector of `(record, time, multiplicity)` updates.
///
/// Entries agreeing on both record and time have their multiplicities
/// accumulated, and entries whose accumulation is zero are discarded.
pub fn consolidate_updates<D: Ord, T: Ord>(vec: &mut Vec<(D, T, Diff)>) {
    let length = consolidate_updates_slice(vec);
    vec.truncate(length);
}

/// Sorts and consolidates a slice of updates, returning the valid prefix length.
pub fn consolidate_updates_slice<D: Ord, T: Ord>(slice: &mut [(D, T, Diff)]) -> usize {
    if slice.len() <= 1 {
        return slice.iter().filter(|x| x.2 != 0).count();
    }

    slice.sort_unstable_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));

    let mut offset = 0;
    let mut accum = slice[0].2;

    for index in 1..slice.len() {
        if slice[index].0 == slice[index - 1].0 && slice[index].1 == slice[index - 1].1 {
            accum += slice[index].2;
        } else {
            if accum != 0 {
                slice.swap(offset, index - 1);
                slice[offset].2 = accum;
                offset += 1;
            }
            accum = slice[index].2;
        }
    }
    if accum != 0 {
        slice.swap(offset, slice.len() - 1);
        slice[offset].2 = accum;
        offset += 1;
    }

    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consolidate() {
        let test_cases = vec![
            (vec![("a", -1), ("b", -2), ("a", 1)], vec![("b", -2)]),
            (vec![("a", -1), ("b", 0), ("a", 1)], vec![]),
            (vec![("a", 0)], vec![]),
            (vec![("a", 0), ("b", 0)], vec![]),
            (vec![("a", 1), ("b", 1)], vec![("a", 1), ("b", 1)]),
        ];

        for (mut input, output) in test_cases {
            consolidate(&mut input);
            assert_eq!(input, output);
        }
    }

    #[test]
    fn test_consolidate_updates() {
        let test_cases = vec![
            (vec![("a", 1, -1), ("b", 1, -2), ("a", 1, 1)], vec![("b", 1, -2)]),
            (vec![("a", 1, -1), ("b", 1, 0), ("a", 1, 1)], vec![]),
            (vec![("a", 1, 0)], vec![]),
            (vec![("a", 1, 0), ("b", 1, 0)], vec![]),
            (vec![("a", 1, 1), ("b", 2, 1)], vec![("a", 1, 1), ("b", 2, 1)]),
            (vec![("a", 2, 1), ("a", 1, 1)], vec![("a", 1, 1), ("a", 2, 1)]),
        ];

        for (mut input, output) in test_cases {
            consolidate_updates(&mut input);
            assert_eq!(input, output);
        }
    }

    #[test]
    fn consolidation_is_idempotent() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..100 {
            let mut input: Vec<(u8, Diff)> =
                (0..rng.gen_range(0..50)).map(|_| (rng.gen_range(0..10), rng.gen_range(-3..=3))).collect();
            consolidate(&mut input);
            let mut again = input.clone();
            consolidate(&mut again);
            assert_eq!(input, again);
        }
    }
}
