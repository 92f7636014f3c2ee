//! Partially ordered version timestamps.
//!
//! A [`Version`] is a point in partially ordered logical time: a vector of
//! non-negative coordinates compared under the coordinate-wise product order.
//! Every version in one graph shares the same dimension, and the
//! one-dimensional case behaves exactly like a conventional totally ordered
//! timestamp.
//!
//! The partial order lives in the [`PartialOrder`] trait rather than in
//! `PartialOrd`, because `Version` also implements `Ord`: a lexicographic
//! linear extension used to organize storage and to iterate deterministically.
//! The `Ord` implementation never contradicts `PartialOrder` — if two versions
//! are ordered by the product order they are ordered the same way
//! lexicographically.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::antichain::Antichain;

/// A type with a partial order, distinct from its `Ord` implementation.
pub trait PartialOrder: Eq {
    /// Returns true iff `self` is less than or equal to `other`.
    fn less_equal(&self, other: &Self) -> bool;

    /// Returns true iff `self` is strictly less than `other`.
    fn less_than(&self, other: &Self) -> bool {
        self.less_equal(other) && self != other
    }
}

/// A point in partially ordered logical time.
///
/// Two versions of equal dimension satisfy `v ≤ w` iff every coordinate of
/// `v` is at most the corresponding coordinate of `w`. Versions of unequal
/// dimension are incomparable; graphs reject them before they can meet.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version {
    coords: SmallVec<[u64; 2]>,
}

impl Version {
    /// Creates a version from its coordinates.
    pub fn new<I: IntoIterator<Item = u64>>(coords: I) -> Self {
        Self { coords: coords.into_iter().collect() }
    }

    /// The number of coordinates.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.coords.len()
    }

    /// The coordinates themselves.
    #[inline]
    pub fn coordinates(&self) -> &[u64] {
        &self.coords
    }

    /// The coordinate-wise maximum: the least upper bound of the two versions.
    pub fn join(&self, other: &Self) -> Self {
        assert_eq!(self.coords.len(), other.coords.len(), "version dimensions differ in join");
        Self { coords: self.coords.iter().zip(&other.coords).map(|(a, b)| std::cmp::max(*a, *b)).collect() }
    }

    /// The coordinate-wise minimum: the greatest lower bound of the two versions.
    pub fn meet(&self, other: &Self) -> Self {
        assert_eq!(self.coords.len(), other.coords.len(), "version dimensions differ in meet");
        Self { coords: self.coords.iter().zip(&other.coords).map(|(a, b)| std::cmp::min(*a, *b)).collect() }
    }

    /// Appends a coordinate, producing a version of one higher dimension.
    pub fn extend(&self, coord: u64) -> Self {
        let mut coords = self.coords.clone();
        coords.push(coord);
        Self { coords }
    }

    /// Drops the last coordinate, producing a version of one lower dimension.
    pub fn truncate(&self) -> Self {
        let mut coords = self.coords.clone();
        coords.pop();
        Self { coords }
    }

    /// Advances the version to the earliest time indistinguishable from it
    /// once `frontier` has been reached: the meet over all `f` in the
    /// frontier of `self ⊔ f`.
    ///
    /// Compaction uses this to fold versions that future readers can no
    /// longer tell apart onto a single representative. A version already
    /// covered by the frontier maps to itself; an empty frontier leaves the
    /// version unchanged.
    pub fn advance_by(&self, frontier: &Antichain) -> Self {
        let mut elements = frontier.elements().iter();
        if let Some(first) = elements.next() {
            let mut result = self.join(first);
            for f in elements {
                result = result.meet(&self.join(f));
            }
            result
        } else {
            self.clone()
        }
    }
}

impl PartialOrder for Version {
    fn less_equal(&self, other: &Self) -> bool {
        self.coords.len() == other.coords.len()
            && self.coords.iter().zip(&other.coords).all(|(a, b)| a <= b)
    }
}

impl From<u64> for Version {
    fn from(coord: u64) -> Self {
        Self { coords: SmallVec::from_slice(&[coord]) }
    }
}

impl From<Vec<u64>> for Version {
    fn from(coords: Vec<u64>) -> Self {
        Self { coords: SmallVec::from_vec(coords) }
    }
}

impl<const N: usize> From<[u64; N]> for Version {
    fn from(coords: [u64; N]) -> Self {
        Self { coords: SmallVec::from_slice(&coords) }
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.coords.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_order() {
        let v10 = Version::from([1, 0]);
        let v01 = Version::from([0, 1]);
        let v11 = Version::from([1, 1]);

        assert!(v10.less_equal(&v11));
        assert!(v01.less_equal(&v11));
        assert!(!v10.less_equal(&v01));
        assert!(!v01.less_equal(&v10));
        assert!(v10.less_than(&v11));
        assert!(!v11.less_than(&v11));
        assert!(v11.less_equal(&v11));
    }

    #[test]
    fn mismatched_dimensions_are_incomparable() {
        let v1 = Version::from(3);
        let v2 = Version::from([3, 3]);
        assert!(!v1.less_equal(&v2));
        assert!(!v2.less_equal(&v1));
    }

    #[test]
    fn join_and_meet() {
        let a = Version::from([2, 1]);
        let b = Version::from([1, 3]);
        assert_eq!(a.join(&b), Version::from([2, 3]));
        assert_eq!(a.meet(&b), Version::from([1, 1]));
    }

    #[test]
    fn extend_truncate_roundtrip() {
        let v = Version::from([4, 5]);
        assert_eq!(v.extend(0).truncate(), v);
        assert_eq!(v.extend(7).coordinates(), &[4, 5, 7]);
    }

    #[test]
    fn ord_extends_partial_order() {
        // Lexicographic comparison must agree with the product order wherever
        // the product order speaks.
        let versions =
            [[0, 0], [0, 1], [1, 0], [1, 1], [2, 0], [0, 2], [2, 2]].map(Version::from);
        for a in &versions {
            for b in &versions {
                if a.less_than(b) {
                    assert!(a < b, "{a:?} {b:?}");
                }
            }
        }
    }

    #[test]
    fn advance_by_folds_onto_frontier() {
        let frontier = Antichain::from_elem(Version::from([1, 1]));
        assert_eq!(Version::from([1, 0]).advance_by(&frontier), Version::from([1, 1]));
        assert_eq!(Version::from([0, 1]).advance_by(&frontier), Version::from([1, 1]));
        assert_eq!(Version::from([2, 1]).advance_by(&frontier), Version::from([2, 1]));

        // Meet over joins: join with [2,0] gives [2,0], join with [0,2] gives
        // [1,2], and their meet is [1,0] again.
        let two = Antichain::from(vec![Version::from([2, 0]), Version::from([0, 2])]);
        assert_eq!(Version::from([1, 0]).advance_by(&two), Version::from([1, 0]));
    }

    #[test]
    fn serialization_roundtrip() {
        let v = Version::from([1, 0]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[1,0]");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
