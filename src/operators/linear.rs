//! Stateless operators: per-message transforms and sinks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::antichain::Antichain;
use crate::error::Result;
use crate::graph::Operator;
use crate::multiset::MultiSet;
use crate::operators::apply_frontier;
use crate::order::Version;
use crate::stream::{Message, Stream, StreamReader, StreamWriter};
use crate::{Data, Diff};

/// A unary operator applying a multiset transform to every data message and
/// forwarding frontiers unchanged.
struct Linear<T, U> {
    input: StreamReader<T>,
    output: StreamWriter<U>,
    frontier: Antichain,
    logic: Box<dyn FnMut(&Version, MultiSet<T>) -> MultiSet<U>>,
}

impl<T: Data, U: Data> Operator for Linear<T, U> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        while let Some(message) = self.input.pop() {
            worked = true;
            match message {
                Message::Data { version, data } => {
                    let data = (self.logic)(&version, data);
                    self.output.send_data(version, data);
                }
                Message::Frontier { frontier } => {
                    if apply_frontier(&mut self.frontier, frontier.clone())? {
                        self.output.send_frontier(frontier);
                    }
                }
            }
        }
        Ok(worked)
    }
}

/// A terminal operator invoking a callback on every message.
struct Output<T> {
    input: StreamReader<T>,
    frontier: Antichain,
    callback: Box<dyn FnMut(Message<T>)>,
}

impl<T: Data> Operator for Output<T> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        while let Some(message) = self.input.pop() {
            worked = true;
            if let Message::Frontier { frontier } = &message {
                apply_frontier(&mut self.frontier, frontier.clone())?;
            }
            (self.callback)(message);
        }
        Ok(worked)
    }
}

/// A binary operator merging two streams of the same type.
struct Concat<T> {
    left: StreamReader<T>,
    right: StreamReader<T>,
    left_frontier: Antichain,
    right_frontier: Antichain,
    output_frontier: Antichain,
    output: StreamWriter<T>,
}

impl<T: Data> Operator for Concat<T> {
    fn step(&mut self) -> Result<bool> {
        let mut worked = false;
        let mut batch: BTreeMap<Version, MultiSet<T>> = BTreeMap::new();

        for (input, frontier) in [
            (&mut self.left, &mut self.left_frontier),
            (&mut self.right, &mut self.right_frontier),
        ] {
            while let Some(message) = input.pop() {
                worked = true;
                match message {
                    Message::Data { version, data } => {
                        let merged = batch.entry(version).or_default();
                        *merged = std::mem::take(merged).concat(data);
                    }
                    Message::Frontier { frontier: incoming } => {
                        apply_frontier(frontier, incoming)?;
                    }
                }
            }
        }

        for (version, data) in batch {
            self.output.send_data(version, data);
        }

        let meet = self.left_frontier.meet(&self.right_frontier);
        if apply_frontier(&mut self.output_frontier, meet.clone())? {
            self.output.send_frontier(meet);
        }

        Ok(worked)
    }
}

/// A collector for messages captured off a stream, for inspection after runs.
pub struct Capture<T> {
    messages: Rc<RefCell<Vec<Message<T>>>>,
}

impl<T: Data> Capture<T> {
    /// Removes and returns the messages captured so far.
    pub fn extract(&self) -> Vec<Message<T>> {
        self.messages.borrow_mut().drain(..).collect()
    }

    /// Removes the captured messages and returns the data ones, consolidated
    /// per version, dropping versions whose changes cancel.
    pub fn extract_data(&self) -> Vec<(Version, Vec<(T, Diff)>)> {
        let mut by_version: BTreeMap<Version, MultiSet<T>> = BTreeMap::new();
        for message in self.extract() {
            if let Message::Data { version, data } = message {
                let merged = by_version.entry(version).or_default();
                *merged = std::mem::take(merged).concat(data);
            }
        }
        by_version
            .into_iter()
            .map(|(version, data)| (version, data.consolidate().into_entries()))
            .filter(|(_, data)| !data.is_empty())
            .collect()
    }
}

impl<T: Data> Stream<T> {
    /// Attaches a unary stateless operator; the workhorse behind the public
    /// stateless combinators.
    pub(crate) fn unary<U: Data>(
        &self,
        logic: impl FnMut(&Version, MultiSet<T>) -> MultiSet<U> + 'static,
    ) -> Stream<U> {
        let output = Stream::new(self.graph().clone());
        let operator = Linear {
            input: self.reader(),
            output: output.writer(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            logic: Box::new(logic),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Applies `logic` to every value, preserving versions and
    /// multiplicities.
    pub fn map<U: Data>(&self, mut logic: impl FnMut(T) -> U + 'static) -> Stream<U> {
        self.unary(move |_, data| data.map(&mut logic))
    }

    /// Keeps the values satisfying `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(&T) -> bool + 'static) -> Stream<T> {
        self.unary(move |_, data| data.filter(&mut predicate))
    }

    /// Flips the sign of every multiplicity.
    ///
    /// Most commonly used with [`concat`](Stream::concat) to subtract one
    /// collection from another.
    pub fn negate(&self) -> Stream<T> {
        self.unary(|_, data| data.negate())
    }

    /// Merges this stream with `other`, combining data messages that share a
    /// version.
    pub fn concat(&self, other: &Stream<T>) -> Stream<T> {
        self.expect_same_graph(other);
        let output = Stream::new(self.graph().clone());
        let initial = self.graph().borrow().initial_frontier.clone();
        let operator = Concat {
            left: self.reader(),
            right: other.reader(),
            left_frontier: initial.clone(),
            right_frontier: initial.clone(),
            output_frontier: initial,
            output: output.writer(),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Invokes `inspector` on every data message, passing the stream through
    /// untouched.
    pub fn inspect(&self, mut inspector: impl FnMut(&Version, &MultiSet<T>) + 'static) -> Stream<T> {
        self.unary(move |version, data| {
            inspector(version, &data);
            data
        })
    }

    /// Logs every message under `name`, passing the stream through untouched.
    pub fn debug(&self, name: &str) -> Stream<T> {
        let name = name.to_owned();
        let output = Stream::new(self.graph().clone());
        let writer = output.writer();
        let operator = Output {
            input: self.reader(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            callback: Box::new(move |message| {
                match &message {
                    Message::Data { version, data } => {
                        log::debug!("{name}: data at {version:?}: {data:?}");
                    }
                    Message::Frontier { frontier } => {
                        log::debug!("{name}: frontier {:?}", frontier.elements());
                    }
                }
                writer.send(message);
            }),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
        output
    }

    /// Terminates the stream, invoking `callback` on every message.
    pub fn output(&self, callback: impl FnMut(Message<T>) + 'static) {
        let operator = Output {
            input: self.reader(),
            frontier: self.graph().borrow().initial_frontier.clone(),
            callback: Box::new(callback),
        };
        self.graph().borrow_mut().add_operator(Box::new(operator));
    }

    /// Terminates the stream into a [`Capture`], which accumulates every
    /// message for later extraction.
    pub fn capture(&self) -> Capture<T> {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let inner = messages.clone();
        self.output(move |message| inner.borrow_mut().push(message));
        Capture { messages }
    }
}
