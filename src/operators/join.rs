//! Match pairs of records based on a key.
//!
//! The join operator maintains one versioned index per input. Its inner
//! component is eager: each incoming batch of changes is joined against the
//! opposite side's accumulated index and emitted immediately, at the join of
//! the two contributing versions. Multiplicities multiply, so retracting
//! either side of a previously emitted match propagates the matching
//! retraction downstream.
//!
//! The outer variants add an unmatched component, which is frontier-driven:
//! once a version is complete, each touched key's unmatched rows — rows on
//! one side of a key the other side leaves empty — are recomputed from the
//! reconstructed indexes and diffed against what was previously emitted.
//! The first match arriving for a key therefore retracts the key's
//! `(row, null)` outputs and the eager component replaces them with real
//! matches; retracting the last match does the reverse.

use std::collections::BTreeMap;

use crate::antichain::Antichain;
use crate::consolidation;
use crate::error::Result;
use crate::graph::Operator;
use crate::index::Index;
use crate::multiset::MultiSet;
use crate::operators::{apply_frontier, PendingWork};
use crate::order::Version;
use crate::stream::{Message, Stream, StreamReader, StreamWriter};
use crate::{Data, Diff};

/// Wraps a matched pair into the variant's output type; absent for anti.
type Matched<K, V1, V2, O> = Option<Box<dyn Fn(&K, &V1, &V2) -> O>>;
/// Wraps an unmatched left row; present for left, full, and anti.
type LeftNull<K, V1, O> = Option<Box<dyn Fn(&K, &V1) -> O>>;
/// Wraps an unmatched right row; present for right and full.
type RightNull<K, V2, O> = Option<Box<dyn Fn(&K, &V2) -> O>>;

struct Join<K, V1, V2, O> {
    left: StreamReader<(K, V1)>,
    right: StreamReader<(K, V2)>,
    output: StreamWriter<O>,
    left_frontier: Antichain,
    right_frontier: Antichain,
    output_frontier: Antichain,
    left_index: Index<K, V1>,
    right_index: Index<K, V2>,
    matched: Matched<K, V1, V2, O>,
    left_null: LeftNull<K, V1, O>,
    right_null: RightNull<K, V2, O>,
    /// Keys whose unmatched rows may change, by version; unused when both
    /// null wrappers are absent.
    pending: PendingWork<K>,
    /// Unmatched rows previously emitted, per side.
    emitted_left_null: Index<K, V1>,
    emitted_right_null: Index<K, V2>,
}

impl<K: Data, V1: Data, V2: Data, O: Data> Join<K, V1, V2, O> {
    fn is_outer(&self) -> bool {
        self.left_null.is_some() || self.right_null.is_some()
    }

    /// Registers `key` at `version` and at its joins with the key's other
    /// versions on either side.
    fn register(&mut self, touched: &[(K, Version)]) {
        for (key, version) in touched {
            self.pending.register(version.clone(), key.clone());
            for existing in self.left_index.versions(key) {
                self.pending.register(version.join(&existing), key.clone());
            }
            for existing in self.right_index.versions(key) {
                self.pending.register(version.join(&existing), key.clone());
            }
        }
    }

    /// Recomputes the unmatched rows of the released keys and emits the
    /// changes against what was previously emitted.
    fn release_unmatched(&mut self) -> Result<()> {
        let frontier = self.output_frontier.clone();
        for (version, keys) in self.pending.release(&frontier) {
            let mut changes: MultiSet<O> = MultiSet::new();
            for key in keys {
                let mut left = self.left_index.reconstruct_at(&key, &version)?;
                consolidation::consolidate(&mut left);
                let mut right = self.right_index.reconstruct_at(&key, &version)?;
                consolidation::consolidate(&mut right);

                if let Some(wrap) = &self.left_null {
                    let desired = if right.is_empty() { left.clone() } else { Vec::new() };
                    let delta = Self::unmatched_delta(
                        &mut self.emitted_left_null,
                        &key,
                        &version,
                        desired,
                    )?;
                    for (value, multiplicity) in delta {
                        changes.push(wrap(&key, &value), multiplicity);
                    }
                }
                if let Some(wrap) = &self.right_null {
                    let desired = if left.is_empty() { right } else { Vec::new() };
                    let delta = Self::unmatched_delta(
                        &mut self.emitted_right_null,
                        &key,
                        &version,
                        desired,
                    )?;
                    for (value, multiplicity) in delta {
                        changes.push(wrap(&key, &value), multiplicity);
                    }
                }
            }
            if !changes.is_empty() {
                self.output.send_data(version, changes);
            }
        }
        Ok(())
    }

    /// Diffs `desired` against the rows previously emitted for `key`,
    /// records the difference, and returns it.
    fn unmatched_delta<V: Data>(
        emitted: &mut Index<K, V>,
        key: &K,
        version: &Version,
        desired: Vec<(V, Diff)>,
    ) -> Result<Vec<(V, Diff)>> {
        let mut delta = desired;
        for (value, multiplicity) in emitted.reconstruct_at(key, version)? {
            delta.push((value, -multiplicity));
        }
        consolidation::consolidate(&mut delta);
        for (value, multiplicity) in &delta {
            emitted.add_value(key.clone(), version.clone(), value.clone(), *multiplicity)?;
        }
        Ok(delta)
    }
}

impl<K: Data, V1: Data, V2: Data, O: Data> Operator for Join<K, V1, V2, O> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;

        let mut delta_left: Index<K, V1> = Index::new();
        let mut delta_right: Index<K, V2> = Index::new();
        let mut touched: Vec<(K, Version)> = Vec::new();

        while let Some(message) = self.left.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    for ((key, value), multiplicity) in data {
                        touched.push((key.clone(), version.clone()));
                        delta_left.add_value(key, version.clone(), value, multiplicity)?;
                    }
                }
                Message::Frontier { frontier } => {
                    apply_frontier(&mut self.left_frontier, frontier)?;
                }
            }
        }
        while let Some(message) = self.right.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    for ((key, value), multiplicity) in data {
                        touched.push((key.clone(), version.clone()));
                        delta_right.add_value(key, version.clone(), value, multiplicity)?;
                    }
                }
                Message::Frontier { frontier } => {
                    apply_frontier(&mut self.right_frontier, frontier)?;
                }
            }
        }

        // The eager inner component: new left changes against the right
        // index as it was, then the left index including those changes
        // against the new right changes, so each pairing is counted once.
        if let Some(wrap) = &self.matched {
            let mut products: BTreeMap<Version, MultiSet<O>> = BTreeMap::new();
            for (version, data) in delta_left.join(&self.right_index) {
                let group = products.entry(version).or_default();
                for ((key, (v1, v2)), multiplicity) in data {
                    group.push(wrap(&key, &v1, &v2), multiplicity);
                }
            }
            self.left_index.append(delta_left);
            for (version, data) in self.left_index.join(&delta_right) {
                let group = products.entry(version).or_default();
                for ((key, (v1, v2)), multiplicity) in data {
                    group.push(wrap(&key, &v1, &v2), multiplicity);
                }
            }
            self.right_index.append(delta_right);

            for (version, data) in products {
                if !data.is_empty() {
                    self.output.send_data(version, data);
                }
            }
        } else {
            self.left_index.append(delta_left);
            self.right_index.append(delta_right);
        }

        // Progress: the output can promise whatever both inputs promise.
        let meet = self.left_frontier.meet(&self.right_frontier);
        if apply_frontier(&mut self.output_frontier, meet.clone())? {
            if self.is_outer() {
                self.register(&touched);
                self.release_unmatched()?;
            }
            self.output.send_frontier(meet);
        } else if self.is_outer() {
            self.register(&touched);
        }

        Ok(worked)
    }
}

impl<K: Data, V1: Data> Stream<(K, V1)> {
    fn join_core<V2: Data, O: Data>(
        &self,
        other: &Stream<(K, V2)>,
        matched: Matched<K, V1, V2, O>,
        left_null: LeftNull<K, V1, O>,
        right_null: RightNull<K, V2, O>,
    ) -> Stream<O> {
        self.expect_same_graph(other);
        let output = Stream::new(self.graph().clone());
        let initial = self.graph().borrow().initial_frontier.clone();
        let operator = Join {
            left: self.reader(),
            right: other.reader(),
            output: output.writer(),
            left_frontier: initial.clone(),
            right_frontier: initial.clone(),
            output_frontier: initial,
            left_index: Index::new(),
            right_index: Index::new(),
            matched,
            left_null,
            right_null,
            pending: PendingWork::new(),
            emitted_left_null: Index::new(),
            emitted_right_null: Index::new(),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Matches pairs `(key, val1)` and `(key, val2)` on `key`, yielding
    /// `(key, (val1, val2))` with multiplied multiplicities.
    pub fn join<V2: Data>(&self, other: &Stream<(K, V2)>) -> Stream<(K, (V1, V2))> {
        self.join_core(
            other,
            Some(Box::new(|k: &K, v1: &V1, v2: &V2| (k.clone(), (v1.clone(), v2.clone())))),
            None,
            None,
        )
    }

    /// As [`join`](Stream::join), but keys present only on the left emit
    /// `(key, (val1, None))`.
    pub fn join_left<V2: Data>(&self, other: &Stream<(K, V2)>) -> Stream<(K, (V1, Option<V2>))> {
        self.join_core(
            other,
            Some(Box::new(|k: &K, v1: &V1, v2: &V2| (k.clone(), (v1.clone(), Some(v2.clone()))))),
            Some(Box::new(|k: &K, v1: &V1| (k.clone(), (v1.clone(), None)))),
            None,
        )
    }

    /// As [`join`](Stream::join), but keys present only on the right emit
    /// `(key, (None, val2))`.
    pub fn join_right<V2: Data>(&self, other: &Stream<(K, V2)>) -> Stream<(K, (Option<V1>, V2))> {
        self.join_core(
            other,
            Some(Box::new(|k: &K, v1: &V1, v2: &V2| (k.clone(), (Some(v1.clone()), v2.clone())))),
            None,
            Some(Box::new(|k: &K, v2: &V2| (k.clone(), (None, v2.clone())))),
        )
    }

    /// The union of [`join_left`](Stream::join_left) and
    /// [`join_right`](Stream::join_right): unmatched rows of either side
    /// appear with `None` on the missing side.
    pub fn join_full<V2: Data>(
        &self,
        other: &Stream<(K, V2)>,
    ) -> Stream<(K, (Option<V1>, Option<V2>))> {
        self.join_core(
            other,
            Some(Box::new(|k: &K, v1: &V1, v2: &V2| {
                (k.clone(), (Some(v1.clone()), Some(v2.clone())))
            })),
            Some(Box::new(|k: &K, v1: &V1| (k.clone(), (Some(v1.clone()), None)))),
            Some(Box::new(|k: &K, v2: &V2| (k.clone(), (None, Some(v2.clone()))))),
        )
    }

    /// Keeps the rows whose key does not appear in `other`.
    ///
    /// A right-side change that gives a key its first match retracts the
    /// key's rows from the output; a change that removes a key's last match
    /// restores them.
    pub fn antijoin<V2: Data>(&self, other: &Stream<(K, V2)>) -> Stream<(K, V1)> {
        self.join_core::<V2, (K, V1)>(
            other,
            None,
            Some(Box::new(|k: &K, v1: &V1| (k.clone(), v1.clone()))),
            None,
        )
    }

    /// Keeps the rows whose key appears in `other`, multiplicities
    /// multiplied.
    ///
    /// When `other` carries multiplicities above one this scales up the
    /// matched rows; apply [`distinct`](Stream::distinct) to `other` first
    /// for the traditional relational semijoin.
    pub fn semijoin(&self, other: &Stream<K>) -> Stream<(K, V1)> {
        let keyed = other.map(|key| (key, ()));
        self.join_core(
            &keyed,
            Some(Box::new(|k: &K, v1: &V1, _: &()| (k.clone(), v1.clone()))),
            None,
            None,
        )
    }
}
