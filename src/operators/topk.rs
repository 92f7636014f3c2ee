//! Maintains the top K values of each key under a comparator.
//!
//! `top_k` keeps, per key, the values ranked `[offset, offset + limit)` by
//! the comparator, maintained by retraction and insertion like any other
//! reduction.
//!
//! `top_k_with_fractional_index` additionally annotates each window element
//! with a fractional index — a lexicographically sortable string — that is
//! preserved as long as the element's window rank is unchanged. A change of
//! size `n` therefore emits at most `2·min(n, limit)` rows: one retraction
//! per element leaving the window and one insertion per element entering,
//! and nothing at all for elements that merely shift around them.
//!
//! Values the comparator cannot tell apart rank by insertion order: the
//! operator notes the first arrival of each key's values as it ingests them,
//! because consolidation erases arrival order before ranking ever happens.
//!
//! `order_by` and its fractional sibling sort an unkeyed stream by keying it
//! with a singleton group first.

use std::cmp::Ordering;

use fnv::FnvHashMap;

use crate::antichain::Antichain;
use crate::consolidation;
use crate::error::{Error, Result};
use crate::fractional::key_between;
use crate::graph::Operator;
use crate::index::Index;
use crate::multiset::MultiSet;
use crate::operators::{apply_frontier, PendingWork};
use crate::order::Version;
use crate::stream::{Message, Stream, StreamReader, StreamWriter};
use crate::{Data, Diff};

/// Window bounds for the top-K operators.
#[derive(Clone, Copy, Debug)]
pub struct TopKOptions {
    /// The number of values kept per key.
    pub limit: usize,
    /// The number of leading values skipped per key.
    pub offset: usize,
}

impl Default for TopKOptions {
    fn default() -> Self {
        Self { limit: usize::MAX, offset: 0 }
    }
}

/// First-arrival ranks of each key's values.
///
/// Comparator ties order by these ranks, so the arrival of a value is noted
/// when it is ingested; a value retracted and inserted again keeps its
/// original rank. The value's own `Ord` remains a final backstop so ranking
/// is total even for values the registry has never seen.
struct ArrivalOrder<K, V> {
    seen: FnvHashMap<K, FnvHashMap<V, u64>>,
    next: u64,
}

impl<K: Data, V: Data> ArrivalOrder<K, V> {
    fn new() -> Self {
        Self { seen: FnvHashMap::default(), next: 0 }
    }

    fn note(&mut self, key: &K, value: &V) {
        let next = &mut self.next;
        self.seen.entry(key.clone()).or_default().entry(value.clone()).or_insert_with(|| {
            let rank = *next;
            *next += 1;
            rank
        });
    }

    fn rank(&self, key: &K, value: &V) -> u64 {
        self.seen.get(key).and_then(|values| values.get(value)).copied().unwrap_or(u64::MAX)
    }

    fn tie_break(&self, key: &K, a: &V, b: &V) -> Ordering {
        self.rank(key, a).cmp(&self.rank(key, b)).then_with(|| a.cmp(b))
    }
}

/// The plain window operator: slices each key's consolidated, ranked values
/// and emits the changes against the previously emitted slice.
struct TopK<K, V> {
    input: StreamReader<(K, V)>,
    output: StreamWriter<(K, V)>,
    frontier: Antichain,
    index: Index<K, V>,
    output_index: Index<K, V>,
    pending: PendingWork<K>,
    arrivals: ArrivalOrder<K, V>,
    comparator: Box<dyn Fn(&V, &V) -> Ordering>,
    options: TopKOptions,
}

impl<K: Data, V: Data> TopK<K, V> {
    fn total_cmp(&self, key: &K, a: &V, b: &V) -> Ordering {
        (self.comparator)(a, b).then_with(|| self.arrivals.tie_break(key, a, b))
    }
}

impl<K: Data, V: Data> Operator for TopK<K, V> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        let mut advanced = false;

        while let Some(message) = self.input.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    for ((key, value), multiplicity) in data {
                        self.arrivals.note(&key, &value);
                        self.pending.register(version.clone(), key.clone());
                        for existing in self.index.versions(&key) {
                            self.pending.register(version.join(&existing), key.clone());
                        }
                        self.index.add_value(key, version.clone(), value, multiplicity)?;
                    }
                }
                Message::Frontier { frontier } => {
                    advanced |= apply_frontier(&mut self.frontier, frontier)?;
                }
            }
        }

        if advanced {
            let frontier = self.frontier.clone();
            for (version, keys) in self.pending.release(&frontier) {
                let mut changes: MultiSet<(K, V)> = MultiSet::new();
                for key in keys {
                    let mut input = self.index.reconstruct_at(&key, &version)?;
                    consolidation::consolidate(&mut input);
                    input.sort_by(|(a, _), (b, _)| self.total_cmp(&key, a, b));
                    let desired: Vec<(V, Diff)> = input
                        .into_iter()
                        .skip(self.options.offset)
                        .take(self.options.limit)
                        .collect();

                    let mut delta = desired;
                    for (value, multiplicity) in self.output_index.reconstruct_at(&key, &version)? {
                        delta.push((value, -multiplicity));
                    }
                    consolidation::consolidate(&mut delta);

                    for (value, multiplicity) in delta {
                        self.output_index.add_value(
                            key.clone(),
                            version.clone(),
                            value.clone(),
                            multiplicity,
                        )?;
                        changes.push((key.clone(), value), multiplicity);
                    }
                }
                if !changes.is_empty() {
                    self.output.send_data(version, changes);
                }
            }
            self.output.send_frontier(self.frontier.clone());
        }

        Ok(worked)
    }
}

/// One key's current window: values in comparator order, each with the
/// fractional index it was announced under.
type Window<V> = Vec<(V, String)>;

struct TopKFractional<K, V> {
    input: StreamReader<(K, V)>,
    output: StreamWriter<(K, (V, String))>,
    frontier: Antichain,
    index: Index<K, V>,
    pending: PendingWork<K>,
    arrivals: ArrivalOrder<K, V>,
    windows: FnvHashMap<K, Window<V>>,
    comparator: Box<dyn Fn(&V, &V) -> Ordering>,
    options: TopKOptions,
}

impl<K: Data, V: Data> TopKFractional<K, V> {
    fn total_cmp(&self, key: &K, a: &V, b: &V) -> Ordering {
        (self.comparator)(a, b).then_with(|| self.arrivals.tie_break(key, a, b))
    }

    /// Recomputes the window of `key` as of `version` and pushes the changes
    /// against the announced window into `changes`.
    fn update_key(
        &mut self,
        key: &K,
        version: &Version,
        changes: &mut MultiSet<(K, (V, String))>,
    ) -> Result<()> {
        let mut input = self.index.reconstruct_at(key, version)?;
        consolidation::consolidate(&mut input);
        if input.iter().any(|(_, multiplicity)| *multiplicity < 0) {
            return Err(Error::InvalidAggregate("top-k over negative multiplicities"));
        }

        let mut values: Vec<V> = input.into_iter().map(|(value, _)| value).collect();
        values.sort_by(|a, b| self.total_cmp(key, a, b));
        let window: Vec<V> = values
            .into_iter()
            .skip(self.options.offset)
            .take(self.options.limit)
            .collect();

        let previous = self.windows.remove(key).unwrap_or_default();
        let mut next: Window<V> = Vec::with_capacity(window.len());

        // Both lists are sorted under the same total order, so a single merge
        // walk finds the unchanged elements; they keep their indices and emit
        // nothing. Distinct values never compare equal here: ties fall back
        // to arrival ranks, which are distinct per value.
        let mut cursor = 0;
        for value in window {
            while cursor < previous.len()
                && self.total_cmp(key, &previous[cursor].0, &value) == Ordering::Less
            {
                changes.push((key.clone(), previous[cursor].clone()), -1);
                cursor += 1;
            }
            if cursor < previous.len()
                && self.total_cmp(key, &previous[cursor].0, &value) == Ordering::Equal
            {
                next.push(previous[cursor].clone());
                cursor += 1;
            } else {
                // A new window entry: index it between the surviving
                // neighbours. The entry below is the one just settled; the
                // one above, if any, still awaits its own comparison.
                let left = next.last().map(|(_, index)| index.as_str());
                let right = previous.get(cursor).map(|(_, index)| index.as_str());
                let index = key_between(left, right)?;
                changes.push((key.clone(), (value.clone(), index.clone())), 1);
                next.push((value, index));
            }
        }
        for entry in &previous[cursor..] {
            changes.push((key.clone(), entry.clone()), -1);
        }

        if !next.is_empty() {
            self.windows.insert(key.clone(), next);
        }
        Ok(())
    }
}

impl<K: Data, V: Data> Operator for TopKFractional<K, V> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        let mut advanced = false;

        while let Some(message) = self.input.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    for ((key, value), multiplicity) in data {
                        self.arrivals.note(&key, &value);
                        self.pending.register(version.clone(), key.clone());
                        for existing in self.index.versions(&key) {
                            self.pending.register(version.join(&existing), key.clone());
                        }
                        self.index.add_value(key, version.clone(), value, multiplicity)?;
                    }
                }
                Message::Frontier { frontier } => {
                    advanced |= apply_frontier(&mut self.frontier, frontier)?;
                }
            }
        }

        if advanced {
            let frontier = self.frontier.clone();
            for (version, keys) in self.pending.release(&frontier) {
                let mut changes = MultiSet::new();
                for key in keys {
                    self.update_key(&key, &version, &mut changes)?;
                }
                if !changes.is_empty() {
                    self.output.send_data(version, changes);
                }
            }
            self.output.send_frontier(self.frontier.clone());
        }

        Ok(worked)
    }
}

impl<K: Data, V: Data> Stream<(K, V)> {
    /// Keeps, per key, the values ranked `[offset, offset + limit)` under
    /// `comparator`, with their consolidated multiplicities. Values the
    /// comparator ties rank by insertion order.
    pub fn top_k(
        &self,
        comparator: impl Fn(&V, &V) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<(K, V)> {
        let output = Stream::new(self.graph().clone());
        let operator = TopK {
            input: self.reader(),
            output: output.writer(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            index: Index::new(),
            output_index: Index::new(),
            pending: PendingWork::new(),
            arrivals: ArrivalOrder::new(),
            comparator: Box::new(comparator),
            options,
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Keeps, per key, the values ranked `[offset, offset + limit)` under
    /// `comparator`, each annotated with a fractional index string whose
    /// lexicographic order is the comparator order. Values the comparator
    /// ties rank by insertion order.
    ///
    /// Window rows carry multiplicity one; a value's index survives every
    /// update that does not change its rank among the window elements. A
    /// value whose multiplicity accumulates to a negative count fails the
    /// run with [`Error::InvalidAggregate`].
    pub fn top_k_with_fractional_index(
        &self,
        comparator: impl Fn(&V, &V) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<(K, (V, String))> {
        let output = Stream::new(self.graph().clone());
        let operator = TopKFractional {
            input: self.reader(),
            output: output.writer(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            index: Index::new(),
            pending: PendingWork::new(),
            arrivals: ArrivalOrder::new(),
            windows: FnvHashMap::default(),
            comparator: Box::new(comparator),
            options,
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }
}

impl<T: Data> Stream<T> {
    /// Keeps the values ranked `[offset, offset + limit)` under `comparator`
    /// across the whole stream.
    pub fn order_by(
        &self,
        comparator: impl Fn(&T, &T) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<T> {
        self.map(|value| ((), value)).top_k(comparator, options).unkey()
    }

    /// As [`order_by`](Stream::order_by), with each value annotated by its
    /// fractional index.
    pub fn order_by_with_fractional_index(
        &self,
        comparator: impl Fn(&T, &T) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<(T, String)> {
        self.map(|value| ((), value))
            .top_k_with_fractional_index(comparator, options)
            .unkey()
    }
}
