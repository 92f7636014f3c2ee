//! Antichains: minimal sets of mutually incomparable versions.
//!
//! An antichain describes a frontier of logical time: the lower bound of the
//! versions that may still appear on a stream. A frontier "covers" a version
//! when some element of the frontier is less than or equal to it; once a
//! frontier stops covering a version, no further data can arrive there and
//! operators may release whatever they buffered for it.

use serde::{Deserialize, Serialize};

use crate::order::{PartialOrder, Version};

/// A set of mutually incomparable versions.
///
/// Insertion maintains minimality: an element dominated by a present element
/// is discarded, and inserting an element evicts any present elements it
/// dominates. Two antichains are equal when they contain the same set of
/// elements, regardless of order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Antichain {
    elements: Vec<Version>,
}

impl Antichain {
    /// Creates an empty antichain, which covers no version at all.
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Creates an antichain holding a single version.
    pub fn from_elem(element: Version) -> Self {
        Self { elements: vec![element] }
    }

    /// Inserts an element unless it is dominated by a present element.
    ///
    /// Returns true if the element was added to the set.
    pub fn insert(&mut self, element: Version) -> bool {
        if !self.elements.iter().any(|x| x.less_equal(&element)) {
            self.elements.retain(|x| !element.less_equal(x));
            self.elements.push(element);
            true
        } else {
            false
        }
    }

    /// Reveals the minimal elements.
    #[inline]
    pub fn elements(&self) -> &[Version] {
        &self.elements
    }

    /// Returns true if the antichain has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns true if some element of the antichain is `≤ version`, that is,
    /// if the frontier still covers the version.
    #[inline]
    pub fn less_equal_version(&self, version: &Version) -> bool {
        self.elements.iter().any(|x| x.less_equal(version))
    }

    /// Returns true if some element of the antichain is strictly less than
    /// `version`.
    #[inline]
    pub fn less_than_version(&self, version: &Version) -> bool {
        self.elements.iter().any(|x| x.less_than(version))
    }

    /// The greatest lower bound of two frontiers: the minimal elements of
    /// their union.
    pub fn meet(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for element in &other.elements {
            result.insert(element.clone());
        }
        result
    }

    /// Appends a coordinate to every element.
    pub fn extend(&self, coord: u64) -> Self {
        Self { elements: self.elements.iter().map(|v| v.extend(coord)).collect() }
    }

    /// Drops the last coordinate of every element, re-normalising since
    /// previously incomparable elements may now dominate one another.
    pub fn truncate(&self) -> Self {
        let mut result = Self::new();
        for element in &self.elements {
            result.insert(element.truncate());
        }
        result
    }
}

impl PartialEq for Antichain {
    fn eq(&self, other: &Self) -> bool {
        self.elements.len() == other.elements.len()
            && self.elements.iter().all(|x| other.elements.contains(x))
    }
}

impl Eq for Antichain {}

impl PartialOrder for Antichain {
    /// `F ≤ G` when every element of `G` is at or beyond some element of `F`.
    /// An earlier frontier is "less" than a later one, and the empty
    /// antichain (nothing more can happen) is the greatest of all.
    fn less_equal(&self, other: &Self) -> bool {
        other.elements.iter().all(|g| self.elements.iter().any(|f| f.less_equal(g)))
    }
}

impl From<Vec<Version>> for Antichain {
    fn from(elements: Vec<Version>) -> Self {
        let mut result = Self::new();
        for element in elements {
            result.insert(element);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_minimal_elements() {
        let mut frontier = Antichain::new();
        assert!(frontier.insert(Version::from(2)));
        assert!(!frontier.insert(Version::from(3)));
        assert_eq!(frontier.elements(), &[Version::from(2)]);

        let mut frontier = Antichain::from_elem(Version::from([1, 2]));
        assert!(frontier.insert(Version::from([2, 1])));
        assert_eq!(frontier.elements().len(), 2);
        // Dominates both; rejected.
        assert!(!frontier.insert(Version::from([2, 2])));
        // Dominated by neither; evicts both.
        assert!(frontier.insert(Version::from([0, 0])));
        assert_eq!(frontier.elements(), &[Version::from([0, 0])]);
    }

    #[test]
    fn coverage() {
        let frontier = Antichain::from(vec![Version::from([1, 0]), Version::from([0, 2])]);
        assert!(frontier.less_equal_version(&Version::from([1, 0])));
        assert!(frontier.less_equal_version(&Version::from([5, 0])));
        assert!(frontier.less_equal_version(&Version::from([0, 3])));
        assert!(!frontier.less_equal_version(&Version::from([0, 1])));
        assert!(!frontier.less_than_version(&Version::from([1, 0])));
        assert!(frontier.less_than_version(&Version::from([1, 1])));
    }

    #[test]
    fn dominance() {
        let earlier = Antichain::from_elem(Version::from(1));
        let later = Antichain::from_elem(Version::from(3));
        assert!(earlier.less_equal(&later));
        assert!(!later.less_equal(&earlier));
        // The empty antichain is beyond every frontier.
        assert!(later.less_equal(&Antichain::new()));
        assert!(!Antichain::new().less_equal(&later));
    }

    #[test]
    fn set_equality() {
        let a = Antichain::from(vec![Version::from([1, 0]), Version::from([0, 1])]);
        let b = Antichain::from(vec![Version::from([0, 1]), Version::from([1, 0])]);
        assert_eq!(a, b);
    }

    #[test]
    fn meet_is_union_of_minimal_elements() {
        let a = Antichain::from_elem(Version::from([2, 0]));
        let b = Antichain::from_elem(Version::from([0, 2]));
        let meet = a.meet(&b);
        assert!(meet.less_equal(&a));
        assert!(meet.less_equal(&b));
        assert_eq!(meet.elements().len(), 2);

        let c = Antichain::from_elem(Version::from([1, 1]));
        let d = Antichain::from_elem(Version::from([0, 0]));
        assert_eq!(c.meet(&d), d);
    }

    #[test]
    fn dimension_shifts() {
        let frontier = Antichain::from(vec![Version::from([1, 0]), Version::from([0, 1])]);
        let extended = frontier.extend(3);
        assert_eq!(
            extended.elements(),
            &[Version::from([1, 0, 3]), Version::from([0, 1, 3])]
        );
        // Truncation may collapse previously incomparable elements.
        let squashed = Antichain::from(vec![Version::from([1, 0, 2]), Version::from([1, 1, 0])]);
        assert_eq!(squashed.elements().len(), 2);
        assert_eq!(squashed.truncate().elements(), &[Version::from([1, 0])]);
    }

    #[test]
    fn serialization_is_the_element_list() {
        let frontier = Antichain::from(vec![Version::from([1, 0]), Version::from([0, 1])]);
        let json = serde_json::to_string(&frontier).unwrap();
        assert_eq!(json, "[[1,0],[0,1]]");
        let back: Antichain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frontier);
    }
}
