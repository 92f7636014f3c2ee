//! The versioned index: per-key update histories organised by version.
//!
//! An [`Index`] stores, for each key, the `(value, multiplicity)` entries
//! contributed at each version. Reconstructing a key at a version accumulates
//! every entry at a stored version less than or equal to it, which is how
//! stateful operators recover "the collection as of `v`" from a history of
//! differences.
//!
//! Histories grow until [`compact`](Index::compact) folds versions that
//! readers can no longer distinguish — those not covered by the compaction
//! frontier — onto their representatives and cancels the entries that meet
//! there. Compaction is explicit: the engine never compacts on its own, and
//! after `compact(F)` any operation mentioning a version not covered by `F`
//! fails.

use std::collections::BTreeMap;

use fnv::{FnvHashMap, FnvHashSet};

use crate::antichain::Antichain;
use crate::consolidation;
use crate::error::{Error, Result};
use crate::multiset::MultiSet;
use crate::order::{PartialOrder, Version};
use crate::{Data, Diff};

/// A mapping `key → version → [(value, multiplicity)]`.
#[derive(Clone, Debug)]
pub struct Index<K, V> {
    entries: FnvHashMap<K, BTreeMap<Version, Vec<(V, Diff)>>>,
    /// Keys touched since the last compaction; the default compaction target.
    modified: FnvHashSet<K>,
    compaction: Option<Antichain>,
}

impl<K: Data, V: Data> Default for Index<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Data, V: Data> Index<K, V> {
    /// Creates an empty index with no compaction frontier.
    pub fn new() -> Self {
        Self { entries: FnvHashMap::default(), modified: FnvHashSet::default(), compaction: None }
    }

    /// The number of keys holding entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key holds entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The keys holding entries, in unspecified but deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// The frontier of the most recent compaction, if any.
    pub fn compaction_frontier(&self) -> Option<&Antichain> {
        self.compaction.as_ref()
    }

    /// Fails unless `version` is covered by the compaction frontier.
    fn validate(&self, version: &Version) -> Result<()> {
        if let Some(frontier) = &self.compaction {
            if !frontier.less_equal_version(version) {
                return Err(Error::InvalidVersion(format!(
                    "version {version:?} is below the compaction frontier {:?}",
                    frontier.elements()
                )));
            }
        }
        Ok(())
    }

    /// Appends one `(value, multiplicity)` entry at `(key, version)`.
    pub fn add_value(&mut self, key: K, version: Version, value: V, multiplicity: Diff) -> Result<()> {
        self.validate(&version)?;
        self.modified.insert(key.clone());
        self.entries.entry(key).or_default().entry(version).or_default().push((value, multiplicity));
        Ok(())
    }

    /// All entries stored for `key` at versions `≤ version`.
    ///
    /// Entries arrive in a deterministic order — versions ascending under the
    /// lexicographic extension of the version order, insertion order within a
    /// version — and are *not* consolidated.
    pub fn reconstruct_at(&self, key: &K, version: &Version) -> Result<Vec<(V, Diff)>> {
        self.validate(version)?;
        let mut result = Vec::new();
        if let Some(history) = self.entries.get(key) {
            for (stored, entries) in history {
                if stored.less_equal(version) {
                    result.extend(entries.iter().cloned());
                }
            }
        }
        Ok(result)
    }

    /// The distinct versions holding entries for `key`, ascending.
    pub fn versions(&self, key: &K) -> Vec<Version> {
        self.entries.get(key).map(|history| history.keys().cloned().collect()).unwrap_or_default()
    }

    /// The per-version entry lists for `key`.
    pub fn history(&self, key: &K) -> impl Iterator<Item = (&Version, &[(V, Diff)])> {
        self.entries.get(key).into_iter().flat_map(|history| {
            history.iter().map(|(version, entries)| (version, entries.as_slice()))
        })
    }

    /// Merges all entries of `other` into `self`.
    ///
    /// The two indexes must agree on their version dimension and compaction
    /// state; the engine only appends indexes it populated from the same
    /// stream pair.
    pub fn append(&mut self, other: Index<K, V>) {
        for (key, history) in other.entries {
            self.modified.insert(key.clone());
            let target = self.entries.entry(key).or_default();
            for (version, mut entries) in history {
                target.entry(version).or_default().append(&mut entries);
            }
        }
    }

    /// Joins matching keys of the two indexes.
    ///
    /// Each pairing of an entry `(v1, m1)` stored at `ver1` with an entry
    /// `(v2, m2)` stored at `ver2` under the same key contributes
    /// `((key, (v1, v2)), m1 * m2)` at version `ver1 ⊔ ver2`. Results are
    /// grouped by output version, versions ascending. The smaller side is
    /// iterated outer.
    pub fn join<V2: Data>(&self, other: &Index<K, V2>) -> Vec<(Version, MultiSet<(K, (V, V2))>)> {
        let mut output: BTreeMap<Version, MultiSet<(K, (V, V2))>> = BTreeMap::new();

        if self.entries.len() <= other.entries.len() {
            for (key, history) in &self.entries {
                let Some(other_history) = other.entries.get(key) else { continue };
                Self::join_key(key, history, other_history, &mut output, |v1, v2| (v1, v2));
            }
        } else {
            for (key, other_history) in &other.entries {
                let Some(history) = self.entries.get(key) else { continue };
                Self::join_key(key, other_history, history, &mut output, |v2, v1| (v1, v2));
            }
        }

        output.into_iter().collect()
    }

    fn join_key<A: Data, B: Data, V2: Data>(
        key: &K,
        left: &BTreeMap<Version, Vec<(A, Diff)>>,
        right: &BTreeMap<Version, Vec<(B, Diff)>>,
        output: &mut BTreeMap<Version, MultiSet<(K, (V, V2))>>,
        pair: impl Fn(A, B) -> (V, V2),
    ) {
        for (ver1, entries1) in left {
            for (ver2, entries2) in right {
                let version = ver1.join(ver2);
                let group = output.entry(version).or_default();
                for (v1, m1) in entries1 {
                    for (v2, m2) in entries2 {
                        group.push((key.clone(), pair(v1.clone(), v2.clone())), m1 * m2);
                    }
                }
            }
        }
    }

    /// Advances every stored version not covered by `frontier` onto it,
    /// cancelling entries that collide, and records `frontier` as the new
    /// compaction frontier.
    ///
    /// With `keys` absent, the keys modified since the previous compaction
    /// are compacted; untouched keys are already compact. A frontier not at
    /// or beyond the previous one fails with [`Error::InvalidFrontier`].
    pub fn compact(&mut self, frontier: Antichain, keys: Option<Vec<K>>) -> Result<()> {
        if let Some(previous) = &self.compaction {
            if !previous.less_equal(&frontier) {
                return Err(Error::InvalidFrontier(format!(
                    "compaction frontier {:?} does not dominate {:?}",
                    frontier.elements(),
                    previous.elements()
                )));
            }
        }

        let keys = match keys {
            Some(keys) => keys,
            None => {
                let mut keys: Vec<K> = self.modified.iter().cloned().collect();
                keys.sort();
                keys
            }
        };

        for key in keys {
            self.modified.remove(&key);
            let Some(history) = self.entries.remove(&key) else { continue };

            let mut updates: Vec<(V, Version, Diff)> = Vec::new();
            for (version, entries) in history {
                let advanced = version.advance_by(&frontier);
                for (value, multiplicity) in entries {
                    updates.push((value, advanced.clone(), multiplicity));
                }
            }
            consolidation::consolidate_updates(&mut updates);

            if !updates.is_empty() {
                let mut history: BTreeMap<Version, Vec<(V, Diff)>> = BTreeMap::new();
                for (value, version, multiplicity) in updates {
                    history.entry(version).or_default().push((value, multiplicity));
                }
                self.entries.insert(key, history);
            }
        }

        self.compaction = Some(frontier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(&'static str, u64, &'static str, Diff)]) -> Index<&'static str, &'static str> {
        let mut index = Index::new();
        for (key, version, value, multiplicity) in entries {
            index.add_value(*key, Version::from(*version), *value, *multiplicity).unwrap();
        }
        index
    }

    #[test]
    fn reconstruct_accumulates_covered_versions() {
        let index = index_with(&[("k", 1, "a", 1), ("k", 2, "b", 1), ("k", 3, "a", -1)]);
        assert_eq!(index.reconstruct_at(&"k", &Version::from(1)).unwrap(), vec![("a", 1)]);
        assert_eq!(
            index.reconstruct_at(&"k", &Version::from(2)).unwrap(),
            vec![("a", 1), ("b", 1)]
        );
        let mut at3 = index.reconstruct_at(&"k", &Version::from(3)).unwrap();
        consolidation::consolidate(&mut at3);
        assert_eq!(at3, vec![("b", 1)]);
        assert!(index.reconstruct_at(&"missing", &Version::from(3)).unwrap().is_empty());
    }

    #[test]
    fn versions_are_distinct_and_ascending() {
        let index = index_with(&[("k", 2, "a", 1), ("k", 1, "b", 1), ("k", 2, "c", 1)]);
        assert_eq!(index.versions(&"k"), vec![Version::from(1), Version::from(2)]);
    }

    #[test]
    fn join_pairs_matching_keys_at_joined_versions() {
        let mut left = Index::new();
        left.add_value("k", Version::from([1, 0]), "a", 1).unwrap();
        let mut right = Index::new();
        right.add_value("k", Version::from([0, 2]), "x", 3).unwrap();
        right.add_value("other", Version::from([0, 1]), "y", 1).unwrap();

        let result = left.join(&right);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, Version::from([1, 2]));
        assert_eq!(result[0].1.entries(), &[(("k", ("a", "x")), 3)]);
    }

    #[test]
    fn join_is_commutative_up_to_pair_swap() {
        let left = index_with(&[("k", 1, "a", 1), ("k", 2, "b", 2), ("j", 1, "c", 1)]);
        let mut right = Index::new();
        for (key, version, value, multiplicity) in [("k", 1u64, "x", 1), ("k", 3, "y", -1)] {
            right.add_value(key, Version::from(version), value, multiplicity).unwrap();
        }

        let forward: Vec<_> = left
            .join(&right)
            .into_iter()
            .map(|(version, data)| (version, data.consolidate().into_entries()))
            .collect();
        let swapped: Vec<_> = right
            .join(&left)
            .into_iter()
            .map(|(version, data)| {
                (version, data.map(|(k, (b, a))| (k, (a, b))).consolidate().into_entries())
            })
            .collect();
        assert_eq!(forward, swapped);
    }

    #[test]
    fn append_merges_histories() {
        let mut index = index_with(&[("k", 1, "a", 1)]);
        let other = index_with(&[("k", 1, "b", 1), ("j", 2, "c", 1)]);
        index.append(other);
        assert_eq!(
            index.reconstruct_at(&"k", &Version::from(1)).unwrap(),
            vec![("a", 1), ("b", 1)]
        );
        assert_eq!(index.reconstruct_at(&"j", &Version::from(2)).unwrap(), vec![("c", 1)]);
    }

    #[test]
    fn compaction_preserves_reconstruction() {
        let index = index_with(&[
            ("k", 1, "a", 1),
            ("k", 2, "a", -1),
            ("k", 2, "b", 1),
            ("k", 3, "c", 1),
            ("j", 1, "d", 1),
        ]);
        let frontier = Antichain::from_elem(Version::from(3));

        let mut compacted = index.clone();
        compacted.compact(frontier.clone(), None).unwrap();

        for key in ["k", "j"] {
            for version in [3u64, 4, 10] {
                let version = Version::from(version);
                let mut before = index.reconstruct_at(&key, &version).unwrap();
                let mut after = compacted.reconstruct_at(&key, &version).unwrap();
                consolidation::consolidate(&mut before);
                consolidation::consolidate(&mut after);
                assert_eq!(before, after, "key {key} at {version:?}");
            }
        }

        // Everything now lives at compacted versions covered by the frontier.
        for version in compacted.versions(&"k") {
            assert!(frontier.less_equal_version(&version));
        }
    }

    #[test]
    fn compaction_cancels_multidimensional_updates() {
        let mut index = Index::new();
        index.add_value("k", Version::from([1, 0]), 10u64, 1).unwrap();
        index.add_value("k", Version::from([0, 1]), 10u64, -1).unwrap();

        let frontier = Antichain::from_elem(Version::from([1, 1]));
        index.compact(frontier, None).unwrap();

        let mut reconstructed = index.reconstruct_at(&"k", &Version::from([1, 1])).unwrap();
        consolidation::consolidate(&mut reconstructed);
        assert!(reconstructed.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn compaction_guards_versions_and_frontiers() {
        let mut index = index_with(&[("k", 1, "a", 1), ("k", 5, "b", 1)]);
        index.compact(Antichain::from_elem(Version::from(3)), None).unwrap();

        // Reads and writes below the compaction frontier fail.
        assert!(matches!(
            index.reconstruct_at(&"k", &Version::from(2)),
            Err(Error::InvalidVersion(_))
        ));
        assert!(matches!(
            index.add_value("k", Version::from(1), "c", 1),
            Err(Error::InvalidVersion(_))
        ));
        assert_eq!(
            index.reconstruct_at(&"k", &Version::from(3)).unwrap(),
            vec![("a", 1)]
        );

        // Compaction frontiers may only advance.
        assert!(matches!(
            index.compact(Antichain::from_elem(Version::from(2)), None),
            Err(Error::InvalidFrontier(_))
        ));
        index.compact(Antichain::from_elem(Version::from(4)), None).unwrap();
    }

    #[test]
    fn explicit_keys_limit_compaction() {
        let mut index = index_with(&[("k", 1, "a", 1), ("j", 1, "b", 1)]);
        index.compact(Antichain::from_elem(Version::from(5)), Some(vec!["k"])).unwrap();
        assert_eq!(index.versions(&"k"), vec![Version::from(5)]);
        assert_eq!(index.versions(&"j"), vec![Version::from(1)]);
    }
}
