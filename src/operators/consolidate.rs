//! Aggregates the changes at each version into at most one message.
//!
//! A difference stream may carry many messages for one version, and a single
//! message may mention a value several times. Consolidation holds each
//! version's changes until the input frontier proves the version complete,
//! then releases one consolidated multiset for it. A collection whose changes
//! cancel releases nothing at all, which downstream operators can exploit —
//! there is a practical difference between a collection that accumulates to
//! zero records and one that sends no message.

use std::collections::BTreeMap;

use crate::antichain::Antichain;
use crate::error::Result;
use crate::graph::Operator;
use crate::multiset::MultiSet;
use crate::operators::apply_frontier;
use crate::order::Version;
use crate::stream::{Message, Stream, StreamReader, StreamWriter};
use crate::Data;

struct Consolidate<T> {
    input: StreamReader<T>,
    output: StreamWriter<T>,
    frontier: Antichain,
    buffer: BTreeMap<Version, MultiSet<T>>,
}

impl<T: Data> Operator for Consolidate<T> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        let mut advanced = false;

        while let Some(message) = self.input.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    let buffered = self.buffer.entry(version).or_default();
                    *buffered = std::mem::take(buffered).concat(data);
                }
                Message::Frontier { frontier } => {
                    advanced |= apply_frontier(&mut self.frontier, frontier)?;
                }
            }
        }

        if advanced {
            // Versions the frontier no longer covers are complete; release
            // them, ascending, before announcing the frontier.
            let complete: Vec<Version> = self
                .buffer
                .keys()
                .filter(|version| !self.frontier.less_equal_version(version))
                .cloned()
                .collect();
            for version in complete {
                let data = self.buffer.remove(&version).unwrap_or_default().consolidate();
                if !data.is_empty() {
                    self.output.send_data(version, data);
                }
            }
            self.output.send_frontier(self.frontier.clone());
        }

        Ok(worked)
    }
}

impl<T: Data> Stream<T> {
    /// Consolidates the changes at each version into at most one message,
    /// released once the version is complete.
    pub fn consolidate(&self) -> Stream<T> {
        let output = Stream::new(self.graph().clone());
        let operator = Consolidate {
            input: self.reader(),
            output: output.writer(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            buffer: BTreeMap::new(),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }
}
