//! Applies a reduction function to the values of each key.
//!
//! `reduce` is the workhorse behind every keyed aggregate. It accumulates the
//! keyed input in a versioned index and, whenever the input frontier proves a
//! version complete, recomputes each affected key: the key's consolidated
//! input as of that version goes through the reduction function, and the
//! result is diffed against what was previously emitted for the key. Only the
//! difference flows downstream, so a key whose reduction is unchanged emits
//! nothing, and a changed reduction emits precisely the retractions and
//! additions that move the previous output to the new one.

use crate::antichain::Antichain;
use crate::consolidation;
use crate::error::Result;
use crate::graph::Operator;
use crate::index::Index;
use crate::multiset::MultiSet;
use crate::operators::{apply_frontier, PendingWork};
use crate::stream::{Message, Stream, StreamReader, StreamWriter};
use crate::{Data, Diff};

/// The reduction function: consolidated per-key input to desired output.
pub(crate) type ReduceLogic<V, R> = Box<dyn FnMut(&[(V, Diff)]) -> Result<Vec<(R, Diff)>>>;

struct Reduce<K, V, R> {
    input: StreamReader<(K, V)>,
    output: StreamWriter<(K, R)>,
    frontier: Antichain,
    index: Index<K, V>,
    output_index: Index<K, R>,
    pending: PendingWork<K>,
    logic: ReduceLogic<V, R>,
}

impl<K: Data, V: Data, R: Data> Operator for Reduce<K, V, R> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        let mut advanced = false;

        while let Some(message) = self.input.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    for ((key, value), multiplicity) in data {
                        // The change matters at its own version and wherever
                        // it first combines with the key's other versions.
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
            for (version, keys) in self.pending.release(&self.frontier) {
                let mut changes: MultiSet<(K, R)> = MultiSet::new();
                for key in keys {
                    let mut input = self.index.reconstruct_at(&key, &version)?;
                    consolidation::consolidate(&mut input);
                    let desired =
                        if input.is_empty() { Vec::new() } else { (self.logic)(&input)? };

                    // Emit the difference between desired and previous output.
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

impl<K: Data, V: Data> Stream<(K, V)> {
    /// Attaches a reduce operator with fallible logic; the shared core behind
    /// `reduce` and the aggregates.
    pub(crate) fn reduce_core<R: Data>(
        &self,
        logic: impl FnMut(&[(V, Diff)]) -> Result<Vec<(R, Diff)>> + 'static,
    ) -> Stream<(K, R)> {
        let output = Stream::new(self.graph().clone());
        let operator = Reduce {
            input: self.reader(),
            output: output.writer(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            index: Index::new(),
            output_index: Index::new(),
            pending: PendingWork::new(),
            logic: Box::new(logic),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Reduces the values of each key.
    ///
    /// `logic` receives the key's consolidated `(value, multiplicity)` list —
    /// sorted by value, strictly non-zero multiplicities — and returns the
    /// desired output list for the key. Downstream sees only the changes
    /// against the key's previous output. Keys whose input becomes empty
    /// produce the empty output.
    pub fn reduce<R: Data>(
        &self,
        mut logic: impl FnMut(&[(V, Diff)]) -> Vec<(R, Diff)> + 'static,
    ) -> Stream<(K, R)> {
        self.reduce_core(move |input| Ok(logic(input)))
    }
}
